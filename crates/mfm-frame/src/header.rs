//! Frame headers: the blob and standard variants behind one sum type.
//!
//! Decoding is two-phase. The primary header is read first; its blob flag
//! decides whether the standard fields and the format-specific header
//! bytes follow.

use std::io::{Read, Write};

use crate::binio::{decode_slice, encode_slice, fill_from, Endianness};
use crate::error::{FrameError, Result};
use crate::field::{Field, FieldMut};
use crate::format::{FieldLayout, FrameFormat, FrameKind};
use crate::primary::{blocks_for, PrimaryHeader, PRIMARY_HEADER_SIZE};

/// Size of a standard header without any format-specific field.
pub const STANDARD_HEADER_MIN_SIZE: usize = 16;

/// Header of a frame with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    primary: PrimaryHeader,
    image: [u8; PRIMARY_HEADER_SIZE],
}

impl BlobHeader {
    fn from_primary(primary: PrimaryHeader) -> Result<Self> {
        if primary.frame_size_b() < PRIMARY_HEADER_SIZE as u64 {
            return Err(FrameError::MalformedHeader(format!(
                "blob frame of {} bytes is shorter than its header",
                primary.frame_size_b()
            )));
        }
        Ok(Self {
            primary,
            image: primary.to_bytes(),
        })
    }

    /// Header for a blob of `format`, with the payload sized to its item size.
    pub fn create(format: &FrameFormat) -> Result<Self> {
        let mut header = Self::from_primary(PrimaryHeader::from_format(format)?)?;
        header.set_data_size_b(u64::from(format.item_size_b()))?;
        Ok(header)
    }

    pub fn primary(&self) -> &PrimaryHeader {
        &self.primary
    }

    pub fn data_size_b(&self) -> u64 {
        self.primary.frame_size_b() - PRIMARY_HEADER_SIZE as u64
    }

    pub fn set_data_size_b(&mut self, data_size_b: u64) -> Result<()> {
        let frame_size_b = PRIMARY_HEADER_SIZE as u64 + data_size_b;
        let blocks = blocks_for(frame_size_b, self.primary.blk_size_b())?;
        self.primary.set_frame_size_blk(blocks)?;
        self.sync();
        Ok(())
    }

    fn sync(&mut self) {
        self.image = self.primary.to_bytes();
    }
}

/// Header of an item-based or layered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardHeader {
    primary: PrimaryHeader,
    header_size_blk: u16,
    item_size_b: u16,
    item_count: u32,
    // Whole header, including format-specific fields; always `header_size_b` long.
    image: Vec<u8>,
}

impl StandardHeader {
    /// Empty header (no items) for `format`.
    pub fn create(format: &FrameFormat) -> Result<Self> {
        let primary = PrimaryHeader::from_format(format)?;
        let mut header = Self {
            primary,
            header_size_blk: format.header_size_blk(),
            item_size_b: format.item_size_b(),
            item_count: 0,
            image: vec![0u8; header_bytes(format.header_size_b())?],
        };
        header.sync();
        Ok(header)
    }

    fn from_image(image: Vec<u8>) -> Result<Self> {
        let primary = PrimaryHeader::decode_slice(&image)?;
        let endianness = primary.endianness();
        let header = Self {
            primary,
            header_size_blk: decode_slice(&image[8..10], endianness),
            item_size_b: decode_slice(&image[10..12], endianness),
            item_count: decode_slice(&image[12..16], endianness),
            image,
        };

        if header.kind() == FrameKind::Basic {
            let items_b = u64::from(header.item_count) * u64::from(header.item_size_b);
            if items_b > header.data_size_b() {
                return Err(FrameError::MalformedHeader(format!(
                    "{} items of {} bytes exceed the {}-byte data section",
                    header.item_count,
                    header.item_size_b,
                    header.data_size_b()
                )));
            }
        }
        Ok(header)
    }

    pub fn primary(&self) -> &PrimaryHeader {
        &self.primary
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::derive(false, self.item_size_b)
    }

    pub fn header_size_blk(&self) -> u16 {
        self.header_size_blk
    }

    pub fn header_size_b(&self) -> u64 {
        u64::from(self.header_size_blk) * u64::from(self.primary.blk_size_b())
    }

    /// Data section size, including block padding.
    pub fn data_size_b(&self) -> u64 {
        self.primary.frame_size_b() - self.header_size_b()
    }

    pub fn item_size_b(&self) -> u16 {
        self.item_size_b
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    pub fn add_item(&mut self) -> Result<()> {
        self.add_items(1)
    }

    /// Append `n` fixed-size items; not available for layered headers.
    pub fn add_items(&mut self, n: u32) -> Result<()> {
        if self.kind() == FrameKind::Layered {
            return Err(FrameError::unsupported("add_items", FrameKind::Layered));
        }
        let item_count = self.checked_count(n)?;
        let frame_size_b =
            self.header_size_b() + u64::from(item_count) * u64::from(self.item_size_b);
        self.resize(frame_size_b)?;
        self.item_count = item_count;
        self.sync();
        Ok(())
    }

    /// Append one item of `size_b` bytes.
    ///
    /// Basic headers only accept their own item size. For layered headers the
    /// data section grows by `size_b` from its current, padded, size.
    pub fn add_item_sized(&mut self, size_b: u64) -> Result<()> {
        if self.kind() == FrameKind::Basic {
            if size_b != u64::from(self.item_size_b) {
                return Err(FrameError::OutOfRange(format!(
                    "item of {size_b} bytes added to frame of {}-byte items",
                    self.item_size_b
                )));
            }
            return self.add_items(1);
        }
        self.set_layered_content(self.checked_count(1)?, self.data_size_b() + size_b)
    }

    /// Set the item count of a layered header together with its exact content size.
    pub(crate) fn set_layered_content(
        &mut self,
        item_count: u32,
        content_size_b: u64,
    ) -> Result<()> {
        self.resize(self.header_size_b() + content_size_b)?;
        self.item_count = item_count;
        self.sync();
        Ok(())
    }

    pub fn set_item_count(&mut self, item_count: u32) -> Result<()> {
        if self.kind() == FrameKind::Basic {
            let frame_size_b =
                self.header_size_b() + u64::from(item_count) * u64::from(self.item_size_b);
            self.resize(frame_size_b)?;
        }
        self.item_count = item_count;
        self.sync();
        Ok(())
    }

    pub fn set_item_size_b(&mut self, item_size_b: u16) -> Result<()> {
        if item_size_b > 0 {
            let frame_size_b =
                self.header_size_b() + u64::from(self.item_count) * u64::from(item_size_b);
            self.resize(frame_size_b)?;
        }
        self.item_size_b = item_size_b;
        self.sync();
        Ok(())
    }

    /// Resize the header, rounded up to whole blocks; the data section keeps its size.
    pub fn set_header_size_b(&mut self, header_size_b: u64) -> Result<()> {
        let blk = u64::from(self.primary.blk_size_b());
        let header_size_blk = u16::try_from(header_size_b.div_ceil(blk)).map_err(|_| {
            FrameError::OutOfRange(format!("header of {header_size_b} bytes"))
        })?;
        let new_header_b = u64::from(header_size_blk) * blk;
        if new_header_b < STANDARD_HEADER_MIN_SIZE as u64 {
            return Err(FrameError::OutOfRange(format!(
                "header of {new_header_b} bytes is shorter than {STANDARD_HEADER_MIN_SIZE}"
            )));
        }
        let image_len = header_bytes(new_header_b)?;
        self.resize(new_header_b + self.data_size_b())?;
        self.header_size_blk = header_size_blk;
        self.image.resize(image_len, 0);
        self.sync();
        Ok(())
    }

    pub fn set_data_size_b(&mut self, data_size_b: u64) -> Result<()> {
        self.resize(self.header_size_b() + data_size_b)?;
        self.sync();
        Ok(())
    }

    pub fn set_data_source(&mut self, data_source: u8) {
        self.primary.set_data_source(data_source);
        self.sync();
    }

    pub fn header_field_at<'a>(
        &'a self,
        format: Option<&'a FrameFormat>,
        offset_b: usize,
        size_b: usize,
    ) -> Result<Field<'a>> {
        let bytes = slice_field(&self.image, offset_b, size_b)?;
        Ok(Field::new(bytes, offset_b, self.primary.endianness())
            .with_layout(declared_at(format, offset_b, size_b)))
    }

    pub fn header_field<'a>(
        &'a self,
        format: Option<&'a FrameFormat>,
        name: &str,
    ) -> Result<Field<'a>> {
        let (format, layout) = resolve(format, self.primary.frame_type(), name)?;
        self.header_field_at(Some(format), layout.offset_b, layout.size_b)
    }

    /// Writable field; the 16 mandatory bytes only change through typed setters.
    pub fn header_field_at_mut<'a>(
        &'a mut self,
        format: Option<&'a FrameFormat>,
        offset_b: usize,
        size_b: usize,
    ) -> Result<FieldMut<'a>> {
        if offset_b < STANDARD_HEADER_MIN_SIZE {
            return Err(FrameError::unsupported("header_field_mut", self.kind()));
        }
        let endianness = self.primary.endianness();
        let bytes = slice_field_mut(&mut self.image, offset_b, size_b)?;
        Ok(FieldMut::new(bytes, offset_b, endianness)
            .with_layout(declared_at(format, offset_b, size_b)))
    }

    pub fn header_field_mut<'a>(
        &'a mut self,
        format: Option<&'a FrameFormat>,
        name: &str,
    ) -> Result<FieldMut<'a>> {
        let (format, layout) = resolve(format, self.primary.frame_type(), name)?;
        self.header_field_at_mut(Some(format), layout.offset_b, layout.size_b)
    }

    fn checked_count(&self, n: u32) -> Result<u32> {
        self.item_count
            .checked_add(n)
            .ok_or_else(|| FrameError::OutOfRange(format!("item count {} + {n}", self.item_count)))
    }

    /// Only fallible step of every mutator; runs before any field changes.
    fn resize(&mut self, frame_size_b: u64) -> Result<()> {
        let blocks = blocks_for(frame_size_b, self.primary.blk_size_b())?;
        self.primary.set_frame_size_blk(blocks)
    }

    fn sync(&mut self) {
        let endianness = self.primary.endianness();
        self.primary.encode_into(&mut self.image);
        encode_slice(self.header_size_blk, &mut self.image[8..10], endianness);
        encode_slice(self.item_size_b, &mut self.image[10..12], endianness);
        encode_slice(self.item_count, &mut self.image[12..16], endianness);
    }
}

/// A decoded or freshly created frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Blob(BlobHeader),
    Standard(StandardHeader),
}

impl Header {
    /// Decode a header from `reader`, consuming exactly `header_size_b` bytes.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let primary = PrimaryHeader::decode(reader)?;
        if primary.is_blob() {
            return Ok(Header::Blob(BlobHeader::from_primary(primary)?));
        }

        let mut image = vec![0u8; STANDARD_HEADER_MIN_SIZE];
        primary.encode_into(&mut image);
        read_section(
            reader,
            &mut image[PRIMARY_HEADER_SIZE..],
            STANDARD_HEADER_MIN_SIZE as u64,
            8,
        )?;

        let header_size_b = standard_header_size_b(&primary, &image)?;
        image.resize(header_size_b, 0);
        read_section(
            reader,
            &mut image[STANDARD_HEADER_MIN_SIZE..],
            header_size_b as u64,
            STANDARD_HEADER_MIN_SIZE as u64,
        )?;
        Ok(Header::Standard(StandardHeader::from_image(image)?))
    }

    /// Decode a header from the start of `bytes`.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self> {
        let primary = PrimaryHeader::decode_slice(bytes)?;
        if primary.is_blob() {
            return Ok(Header::Blob(BlobHeader::from_primary(primary)?));
        }

        require(bytes, STANDARD_HEADER_MIN_SIZE)?;
        let header_size_b = standard_header_size_b(&primary, bytes)?;
        require(bytes, header_size_b)?;
        Ok(Header::Standard(StandardHeader::from_image(bytes[..header_size_b].to_vec())?))
    }

    /// Empty header for `format`.
    pub fn create(format: &FrameFormat) -> Result<Self> {
        if format.is_blob() {
            Ok(Header::Blob(BlobHeader::create(format)?))
        } else {
            Ok(Header::Standard(StandardHeader::create(format)?))
        }
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.image())?;
        Ok(())
    }

    /// Encoded header bytes.
    pub fn image(&self) -> &[u8] {
        match self {
            Header::Blob(header) => &header.image,
            Header::Standard(header) => &header.image,
        }
    }

    pub fn primary(&self) -> &PrimaryHeader {
        match self {
            Header::Blob(header) => &header.primary,
            Header::Standard(header) => &header.primary,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Header::Blob(_) => FrameKind::Blob,
            Header::Standard(header) => header.kind(),
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Header::Blob(_))
    }

    pub fn endianness(&self) -> Endianness {
        self.primary().endianness()
    }

    pub fn blk_size_b(&self) -> u32 {
        self.primary().blk_size_b()
    }

    pub fn frame_size_blk(&self) -> u32 {
        self.primary().frame_size_blk()
    }

    pub fn frame_size_b(&self) -> u64 {
        self.primary().frame_size_b()
    }

    pub fn data_source(&self) -> u8 {
        self.primary().data_source()
    }

    pub fn frame_type(&self) -> u16 {
        self.primary().frame_type()
    }

    pub fn revision(&self) -> u8 {
        self.primary().revision()
    }

    pub fn header_size_blk(&self) -> u16 {
        match self {
            Header::Blob(header) => {
                (PRIMARY_HEADER_SIZE as u32).div_ceil(header.primary.blk_size_b()) as u16
            }
            Header::Standard(header) => header.header_size_blk(),
        }
    }

    pub fn header_size_b(&self) -> u64 {
        match self {
            Header::Blob(_) => PRIMARY_HEADER_SIZE as u64,
            Header::Standard(header) => header.header_size_b(),
        }
    }

    pub fn data_size_b(&self) -> u64 {
        match self {
            Header::Blob(header) => header.data_size_b(),
            Header::Standard(header) => header.data_size_b(),
        }
    }

    /// Item size; blob headers carry none.
    pub fn item_size_b(&self) -> Result<u16> {
        match self {
            Header::Blob(_) => Err(FrameError::unsupported("item_size_b", FrameKind::Blob)),
            Header::Standard(header) => Ok(header.item_size_b()),
        }
    }

    /// Item count; a blob counts as a single item.
    pub fn item_count(&self) -> u32 {
        match self {
            Header::Blob(_) => 1,
            Header::Standard(header) => header.item_count(),
        }
    }

    pub fn add_item(&mut self) -> Result<()> {
        self.standard_mut("add_item")?.add_item()
    }

    pub fn add_items(&mut self, n: u32) -> Result<()> {
        self.standard_mut("add_items")?.add_items(n)
    }

    pub fn add_item_sized(&mut self, size_b: u64) -> Result<()> {
        self.standard_mut("add_item_sized")?.add_item_sized(size_b)
    }

    pub fn set_item_count(&mut self, item_count: u32) -> Result<()> {
        self.standard_mut("set_item_count")?.set_item_count(item_count)
    }

    pub fn set_item_size_b(&mut self, item_size_b: u16) -> Result<()> {
        self.standard_mut("set_item_size_b")?.set_item_size_b(item_size_b)
    }

    pub fn set_header_size_b(&mut self, header_size_b: u64) -> Result<()> {
        self.standard_mut("set_header_size_b")?.set_header_size_b(header_size_b)
    }

    pub fn set_data_size_b(&mut self, data_size_b: u64) -> Result<()> {
        match self {
            Header::Blob(header) => header.set_data_size_b(data_size_b),
            Header::Standard(header) => header.set_data_size_b(data_size_b),
        }
    }

    pub fn set_data_source(&mut self, data_source: u8) {
        match self {
            Header::Blob(header) => {
                header.primary.set_data_source(data_source);
                header.sync();
            }
            Header::Standard(header) => header.set_data_source(data_source),
        }
    }

    pub fn header_field_at<'a>(
        &'a self,
        format: Option<&'a FrameFormat>,
        offset_b: usize,
        size_b: usize,
    ) -> Result<Field<'a>> {
        match self {
            Header::Blob(header) => {
                let bytes = slice_field(&header.image, offset_b, size_b)?;
                Ok(Field::new(bytes, offset_b, header.primary.endianness())
                    .with_layout(declared_at(format, offset_b, size_b)))
            }
            Header::Standard(header) => header.header_field_at(format, offset_b, size_b),
        }
    }

    pub fn header_field<'a>(
        &'a self,
        format: Option<&'a FrameFormat>,
        name: &str,
    ) -> Result<Field<'a>> {
        let (format, layout) = resolve(format, self.frame_type(), name)?;
        self.header_field_at(Some(format), layout.offset_b, layout.size_b)
    }

    pub fn header_field_at_mut<'a>(
        &'a mut self,
        format: Option<&'a FrameFormat>,
        offset_b: usize,
        size_b: usize,
    ) -> Result<FieldMut<'a>> {
        self.standard_mut("header_field_mut")?
            .header_field_at_mut(format, offset_b, size_b)
    }

    pub fn header_field_mut<'a>(
        &'a mut self,
        format: Option<&'a FrameFormat>,
        name: &str,
    ) -> Result<FieldMut<'a>> {
        self.standard_mut("header_field_mut")?
            .header_field_mut(format, name)
    }

    pub(crate) fn standard_mut(&mut self, operation: &'static str) -> Result<&mut StandardHeader> {
        match self {
            Header::Blob(_) => Err(FrameError::unsupported(operation, FrameKind::Blob)),
            Header::Standard(header) => Ok(header),
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        let primary = PrimaryHeader::default();
        Header::Blob(BlobHeader {
            primary,
            image: primary.to_bytes(),
        })
    }
}

fn standard_header_size_b(primary: &PrimaryHeader, bytes: &[u8]) -> Result<usize> {
    let header_size_blk: u16 = decode_slice(&bytes[8..10], primary.endianness());
    let header_size_b = u64::from(header_size_blk) * u64::from(primary.blk_size_b());
    if header_size_b < STANDARD_HEADER_MIN_SIZE as u64 {
        return Err(FrameError::MalformedHeader(format!(
            "header of {header_size_b} bytes is shorter than {STANDARD_HEADER_MIN_SIZE}"
        )));
    }
    if header_size_b > primary.frame_size_b() {
        return Err(FrameError::MalformedHeader(format!(
            "header of {header_size_b} bytes exceeds frame of {} bytes",
            primary.frame_size_b()
        )));
    }
    usize::try_from(header_size_b)
        .map_err(|_| FrameError::MalformedHeader(format!("header of {header_size_b} bytes")))
}

fn header_bytes(header_size_b: u64) -> Result<usize> {
    usize::try_from(header_size_b)
        .map_err(|_| FrameError::OutOfRange(format!("header of {header_size_b} bytes")))
}

fn read_section<R: Read>(reader: &mut R, buf: &mut [u8], needed: u64, already: u64) -> Result<()> {
    let filled = fill_from(reader, buf)?;
    if filled < buf.len() {
        return Err(FrameError::IncompleteFrame {
            needed,
            available: already + filled as u64,
        });
    }
    Ok(())
}

fn require(bytes: &[u8], needed: usize) -> Result<()> {
    if bytes.len() < needed {
        return Err(FrameError::IncompleteFrame {
            needed: needed as u64,
            available: bytes.len() as u64,
        });
    }
    Ok(())
}

pub(crate) fn slice_field(bytes: &[u8], offset_b: usize, size_b: usize) -> Result<&[u8]> {
    match offset_b.checked_add(size_b) {
        Some(end) if size_b > 0 && end <= bytes.len() => Ok(&bytes[offset_b..end]),
        _ => Err(FrameError::OutOfRange(format!(
            "field [{offset_b}, {offset_b}+{size_b}) outside {} bytes",
            bytes.len()
        ))),
    }
}

pub(crate) fn slice_field_mut(
    bytes: &mut [u8],
    offset_b: usize,
    size_b: usize,
) -> Result<&mut [u8]> {
    let len = bytes.len();
    match offset_b.checked_add(size_b) {
        Some(end) if size_b > 0 && end <= len => Ok(&mut bytes[offset_b..end]),
        _ => Err(FrameError::OutOfRange(format!(
            "field [{offset_b}, {offset_b}+{size_b}) outside {len} bytes"
        ))),
    }
}

fn declared_at(
    format: Option<&FrameFormat>,
    offset_b: usize,
    size_b: usize,
) -> Option<(&str, &FieldLayout)> {
    let format = format?;
    let name = format.find_header_field_at(offset_b, size_b).ok()?;
    let layout = format.find_header_field(name).ok()?;
    Some((name, layout))
}

fn resolve<'a>(
    format: Option<&'a FrameFormat>,
    frame_type: u16,
    name: &str,
) -> Result<(&'a FrameFormat, &'a FieldLayout)> {
    let format = format.ok_or(FrameError::FormatNotFound { frame_type })?;
    Ok((format, format.find_header_field(name)?))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testing::{blob_sample_format, cobo_format, layered_format};

    fn scenario_format() -> FrameFormat {
        FrameFormat::builder("scenario", 1, 1)
            .blk_size_b(64)
            .header_size_blk(2)
            .item_size_b(4)
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_standard_header() {
        let header = Header::create(&scenario_format()).unwrap();
        assert_eq!(header.kind(), FrameKind::Basic);
        assert_eq!(header.blk_size_b(), 64);
        assert_eq!(header.header_size_b(), 128);
        assert_eq!(header.frame_size_b(), 128);
        assert_eq!(header.data_size_b(), 0);
        assert_eq!(header.item_size_b().unwrap(), 4);
        assert_eq!(header.item_count(), 0);
        assert_eq!(header.image().len(), 128);
        assert_eq!(&header.image()[..16], &[0x06, 0, 0, 2, 0, 0, 1, 1, 0, 2, 0, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_roundtrip_from_stream_and_slice() {
        let mut header = Header::create(&scenario_format()).unwrap();
        header.add_items(3).unwrap();
        let bytes = header.image().to_vec();

        let from_slice = Header::decode_slice(&bytes).unwrap();
        let from_stream = Header::decode(&mut Cursor::new(bytes.clone())).unwrap();
        assert_eq!(from_slice, header);
        assert_eq!(from_stream, header);
        assert_eq!(from_slice.item_count(), 3);
        assert_eq!(from_slice.data_size_b(), 64);
        assert_eq!(from_slice.frame_size_b(), 192);
    }

    #[test]
    fn test_incomplete_at_each_phase() {
        let header = Header::create(&scenario_format()).unwrap();
        let bytes = header.image();

        for cut in [0usize, 7, 12, 20, 127] {
            let err = Header::decode_slice(&bytes[..cut]).unwrap_err();
            assert!(err.is_incomplete(), "cut at {cut}: {err}");

            let err = Header::decode(&mut Cursor::new(bytes[..cut].to_vec())).unwrap_err();
            assert!(err.is_incomplete(), "stream cut at {cut}: {err}");
        }

        let err = Header::decode(&mut Cursor::new(bytes[..20].to_vec())).unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteFrame {
                needed: 128,
                available: 20
            }
        ));
    }

    #[test]
    fn test_malformed_header_sizes() {
        // Header claims 8 bytes.
        let short = [0x00, 0, 0, 16, 0, 0, 1, 0, 0, 8, 0, 4, 0, 0, 0, 0];
        assert!(matches!(
            Header::decode_slice(&short),
            Err(FrameError::MalformedHeader(_))
        ));

        // Header larger than the frame.
        let long = [0x00, 0, 0, 16, 0, 0, 1, 0, 0, 32, 0, 4, 0, 0, 0, 0];
        assert!(matches!(
            Header::decode_slice(&long),
            Err(FrameError::MalformedHeader(_))
        ));

        // Two 4-byte items in a frame without data.
        let items = [0x00, 0, 0, 16, 0, 0, 1, 0, 0, 16, 0, 4, 0, 0, 0, 2];
        assert!(matches!(
            Header::decode_slice(&items),
            Err(FrameError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_blob_header() {
        let header = Header::create(&blob_sample_format()).unwrap();
        assert!(header.is_blob());
        assert_eq!(header.header_size_b(), 8);
        assert_eq!(header.data_size_b(), 56);
        assert_eq!(header.frame_size_b(), 64);
        assert_eq!(header.item_count(), 1);
        assert_eq!(Header::decode_slice(header.image()).unwrap(), header);
    }

    #[test]
    fn test_blob_rejects_item_mutators() {
        let mut header = Header::default();
        assert!(matches!(
            header.add_item(),
            Err(FrameError::UnsupportedOperation {
                kind: FrameKind::Blob,
                ..
            })
        ));
        assert!(header.add_items(2).is_err());
        assert!(header.add_item_sized(4).is_err());
        assert!(header.set_item_count(2).is_err());
        assert!(header.item_size_b().is_err());
        assert!(header.header_field_at_mut(None, 0, 1).is_err());
        assert_eq!(header, Header::default());
    }

    #[test]
    fn test_layered_items() {
        let mut header = Header::create(&layered_format()).unwrap();
        assert_eq!(header.kind(), FrameKind::Layered);
        assert!(matches!(
            header.add_item(),
            Err(FrameError::UnsupportedOperation {
                kind: FrameKind::Layered,
                ..
            })
        ));

        header.add_item_sized(100).unwrap();
        header.add_item_sized(28).unwrap();
        assert_eq!(header.item_count(), 2);
        assert_eq!(header.data_size_b(), 128);
        assert_eq!(header.frame_size_b(), header.header_size_b() + 128);
    }

    #[test]
    fn test_basic_sized_item_must_match() {
        let mut header = Header::create(&cobo_format()).unwrap();
        assert!(matches!(
            header.add_item_sized(2),
            Err(FrameError::OutOfRange(_))
        ));
        header.add_item_sized(4).unwrap();
        assert_eq!(header.item_count(), 1);
    }

    #[test]
    fn test_growth_law_with_unit_blocks() {
        let format = FrameFormat::builder("unit", 3, 0)
            .item_size_b(6)
            .build()
            .unwrap();
        let mut header = Header::create(&format).unwrap();
        for n in 1..=20u32 {
            header.add_item().unwrap();
            assert_eq!(header.item_count(), n);
            assert_eq!(header.data_size_b(), u64::from(n) * 6);
            assert_eq!(header.frame_size_b(), header.header_size_b() + header.data_size_b());
        }
    }

    #[test]
    fn test_failed_mutator_changes_nothing() {
        let format = FrameFormat::builder("unit", 3, 0)
            .item_size_b(0x100)
            .build()
            .unwrap();
        let mut header = Header::create(&format).unwrap();
        let before = header.clone();
        assert!(header.add_items(0x1_0000).is_err());
        assert!(header.set_data_size_b(u64::from(crate::MAX_FRAME_SIZE_BLK)).is_err());
        assert_eq!(header, before);
    }

    #[test]
    fn test_set_header_size_keeps_data() {
        let mut header = Header::create(&cobo_format()).unwrap();
        header.add_items(16).unwrap();
        header.set_header_size_b(130).unwrap();
        assert_eq!(header.header_size_blk(), 3);
        assert_eq!(header.header_size_b(), 192);
        assert_eq!(header.data_size_b(), 64);
        assert_eq!(header.image().len(), 192);
        assert!(header.set_header_size_b(8).is_err());
    }

    #[test]
    fn test_named_header_fields() {
        let format = cobo_format();
        let mut header = Header::create(&format).unwrap();

        header
            .header_field_mut(Some(&format), "eventIdx")
            .unwrap()
            .set_value(0xDEAD_BEEFu32);
        let field = header.header_field(Some(&format), "eventIdx").unwrap();
        assert_eq!(field.value::<u32>(), 0xDEAD_BEEF);
        assert_eq!((field.offset_b(), field.size_b()), (22, 4));
        assert_eq!(field.name(), Some("eventIdx"));

        let positional = header.header_field_at(Some(&format), 22, 4).unwrap();
        assert_eq!(positional.name(), Some("eventIdx"));

        let frame_type = header.header_field(Some(&format), "frameType").unwrap();
        assert_eq!(frame_type.value::<u16>(), 1);
    }

    #[test]
    fn test_header_field_errors() {
        let format = cobo_format();
        let mut header = Header::create(&format).unwrap();

        assert!(matches!(
            header.header_field(Some(&format), "missing"),
            Err(FrameError::FieldNotFound(_))
        ));
        assert!(matches!(
            header.header_field(None, "eventIdx"),
            Err(FrameError::FormatNotFound { frame_type: 1 })
        ));
        assert!(matches!(
            header.header_field_at(None, 126, 4),
            Err(FrameError::OutOfRange(_))
        ));
        assert!(matches!(
            header.header_field_mut(Some(&format), "frameType"),
            Err(FrameError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let format = cobo_format();
        let original = Header::create(&format).unwrap();
        let mut copy = original.clone();
        copy.add_items(5).unwrap();
        copy.header_field_mut(Some(&format), "coboIdx")
            .unwrap()
            .set_value(3u8);
        assert_eq!(original.item_count(), 0);
        assert_eq!(
            original
                .header_field(Some(&format), "coboIdx")
                .unwrap()
                .value::<u8>(),
            0
        );
    }
}

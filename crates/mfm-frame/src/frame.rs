//! Frames: a header plus its data section.
//!
//! Basic frames expose fixed-size items, blob frames one item spanning the
//! whole payload, and layered frames a sequence of embedded sub-frames that
//! are parsed lazily from the shared buffer.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::binio::Endianness;
use crate::error::{FrameError, Result};
use crate::field::{Field, FieldMut};
use crate::format::{FieldLayout, FormatLookup, FrameFormat, FrameKind};
use crate::header::{slice_field, slice_field_mut, Header};
use crate::primary::{PrimaryHeader, PRIMARY_HEADER_SIZE};

/// A decoded or assembled frame.
///
/// Two frames are equal when their encoded bytes are, whatever format is bound.
#[derive(Debug, Clone)]
pub struct Frame {
    header: Header,
    // Always `header.data_size_b()` bytes, padding included.
    payload: BytesMut,
    // Layered frames: bytes of the payload taken by sub-frames.
    content_len: usize,
    format: Option<Arc<FrameFormat>>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload == other.payload
    }
}

impl Eq for Frame {}

impl Frame {
    /// Read one frame from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let header = Header::decode(reader)?;
        let data_size_b = header.data_size_b();

        let mut payload = Vec::new();
        reader.by_ref().take(data_size_b).read_to_end(&mut payload)?;
        if (payload.len() as u64) < data_size_b {
            return Err(FrameError::IncompleteFrame {
                needed: header.frame_size_b(),
                available: header.header_size_b() + payload.len() as u64,
            });
        }
        Ok(Self::assemble(header, BytesMut::from(&payload[..])))
    }

    /// Read one frame and bind its format from `lookup`.
    ///
    /// Blob frames without a registered format are returned unbound.
    pub fn read_with<R: Read, L: FormatLookup>(reader: &mut R, lookup: &L) -> Result<Self> {
        let mut frame = Self::read(reader)?;
        match frame.bind_format(lookup) {
            Err(_) if frame.header.is_blob() => Ok(frame),
            Err(err) => Err(err),
            Ok(()) => Ok(frame),
        }
    }

    /// Decode the frame at the start of `bytes`; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = Header::decode_slice(bytes)?;
        let frame_size_b = header.frame_size_b();
        if (bytes.len() as u64) < frame_size_b {
            return Err(FrameError::IncompleteFrame {
                needed: frame_size_b,
                available: bytes.len() as u64,
            });
        }
        let start = header.image().len();
        let payload = BytesMut::from(&bytes[start..frame_size_b as usize]);
        Ok(Self::assemble(header, payload))
    }

    /// Empty frame of `format`.
    pub fn create(format: &Arc<FrameFormat>) -> Result<Self> {
        let header = Header::create(format)?;
        let payload = BytesMut::zeroed(header.data_size_b() as usize);
        let mut frame = Self::assemble(header, payload);
        frame.content_len = 0;
        frame.format = Some(Arc::clone(format));
        Ok(frame)
    }

    fn assemble(header: Header, payload: BytesMut) -> Self {
        let content_len = if header.kind() == FrameKind::Layered {
            layered_content_len(&payload, header.item_count())
        } else {
            payload.len()
        };
        Self {
            header,
            payload,
            content_len,
            format: None,
        }
    }

    /// Write exactly `frame_size_b()` bytes to `writer`.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode(writer)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.frame_size_b() as usize);
        dst.put_slice(self.header.image());
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.frame_size_b() as usize);
        self.encode(&mut out);
        out.freeze()
    }

    /// Bind the format registered for this frame's type and revision.
    pub fn bind_format<L: FormatLookup>(&mut self, lookup: &L) -> Result<()> {
        let format = lookup.find_format(self.frame_type(), self.revision())?;
        self.format = Some(format);
        Ok(())
    }

    /// Bind `format`, which must describe this frame's type and revision.
    pub fn set_format(&mut self, format: Arc<FrameFormat>) -> Result<()> {
        if format.frame_type() != self.frame_type() || format.revision() != self.revision() {
            return Err(FrameError::InvalidFormat(format!(
                "{format} does not describe frames of type {:#06x} revision {}",
                self.frame_type(),
                self.revision()
            )));
        }
        self.format = Some(format);
        Ok(())
    }

    pub fn format(&self) -> Option<&Arc<FrameFormat>> {
        self.format.as_ref()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn primary(&self) -> &PrimaryHeader {
        self.header.primary()
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind()
    }

    pub fn endianness(&self) -> Endianness {
        self.header.endianness()
    }

    pub fn frame_type(&self) -> u16 {
        self.header.frame_type()
    }

    pub fn revision(&self) -> u8 {
        self.header.revision()
    }

    pub fn data_source(&self) -> u8 {
        self.header.data_source()
    }

    pub fn set_data_source(&mut self, data_source: u8) {
        self.header.set_data_source(data_source);
    }

    pub fn frame_size_b(&self) -> u64 {
        self.header.frame_size_b()
    }

    pub fn header_size_b(&self) -> u64 {
        self.header.header_size_b()
    }

    pub fn data_size_b(&self) -> u64 {
        self.header.data_size_b()
    }

    pub fn item_count(&self) -> u32 {
        self.header.item_count()
    }

    /// Item size; a blob's single item spans the whole payload.
    pub fn item_size_b(&self) -> u64 {
        match self.header.item_size_b() {
            Ok(size) => u64::from(size),
            Err(_) => self.data_size_b(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn header_field(&self, name: &str) -> Result<Field<'_>> {
        self.header.header_field(self.format.as_deref(), name)
    }

    pub fn header_field_at(&self, offset_b: usize, size_b: usize) -> Result<Field<'_>> {
        self.header
            .header_field_at(self.format.as_deref(), offset_b, size_b)
    }

    pub fn header_field_mut(&mut self, name: &str) -> Result<FieldMut<'_>> {
        self.header.header_field_mut(self.format.as_deref(), name)
    }

    pub fn header_field_at_mut(&mut self, offset_b: usize, size_b: usize) -> Result<FieldMut<'_>> {
        self.header
            .header_field_at_mut(self.format.as_deref(), offset_b, size_b)
    }

    /// Append one zero-filled item to a basic frame.
    pub fn add_item(&mut self) -> Result<()> {
        self.add_items(1)
    }

    /// Append `n` zero-filled items to a basic frame.
    pub fn add_items(&mut self, n: u32) -> Result<()> {
        let used = u64::from(self.item_count()) * self.item_size_b();
        self.header.add_items(n)?;
        // Old padding may hold stale bytes; new items start zeroed.
        self.payload.truncate(used as usize);
        self.sync_payload();
        Ok(())
    }

    pub fn item_at(&self, index: u32) -> Result<Item<'_>> {
        let (start, end) = self.item_span("item_at", index)?;
        Ok(Item {
            bytes: &self.payload[start..end],
            index,
            offset_b: self.header_size_b() as usize + start,
            endianness: self.endianness(),
            frame_type: self.frame_type(),
            format: self.format.as_deref(),
        })
    }

    pub fn item_at_mut(&mut self, index: u32) -> Result<ItemMut<'_>> {
        let (start, end) = self.item_span("item_at_mut", index)?;
        Ok(ItemMut {
            offset_b: self.header.header_size_b() as usize + start,
            endianness: self.header.endianness(),
            frame_type: self.header.frame_type(),
            format: self.format.as_deref(),
            bytes: &mut self.payload[start..end],
            index,
        })
    }

    /// Every item, in order.
    pub fn items(&self) -> Result<Items<'_>> {
        if self.kind() == FrameKind::Layered {
            return Err(FrameError::unsupported("items", FrameKind::Layered));
        }
        Ok(Items {
            frame: self,
            next: 0,
        })
    }

    /// Byte offset within the frame and size of item field `name` of item `index`.
    pub fn find_item_field(&self, name: &str, index: u32) -> Result<(u64, usize)> {
        let format = self.bound_format()?;
        let layout = format.find_item_field(name)?;
        let item = self.item_at(index)?;
        if layout.end_b().is_none_or(|end_b| end_b > item.size_b()) {
            return Err(FrameError::OutOfRange(format!(
                "item field '{name}' ends past the {}-byte item",
                item.size_b()
            )));
        }
        Ok((item.offset_b() as u64 + layout.offset_b as u64, layout.size_b))
    }

    /// Embed the encoded bytes of `sub` as the next sub-frame of a layered frame.
    pub fn add_frame(&mut self, sub: &Frame) -> Result<()> {
        if self.kind() != FrameKind::Layered {
            return Err(FrameError::unsupported("add_frame", self.kind()));
        }
        let content_len = self.content_len + sub.frame_size_b() as usize;
        let standard = self.header.standard_mut("add_frame")?;
        let item_count = standard.item_count().checked_add(1).ok_or_else(|| {
            FrameError::OutOfRange(format!("item count {} + 1", standard.item_count()))
        })?;
        standard.set_layered_content(item_count, content_len as u64)?;

        self.payload.truncate(self.content_len);
        sub.encode(&mut self.payload);
        self.content_len = content_len;
        self.sync_payload();
        Ok(())
    }

    /// Lazily parsed sub-frames of a layered frame.
    pub fn frames(&self) -> Result<SubFrames<'_>> {
        if self.kind() != FrameKind::Layered {
            return Err(FrameError::unsupported("frames", self.kind()));
        }
        Ok(SubFrames {
            payload: &self.payload,
            pos: 0,
            remaining: self.item_count(),
        })
    }

    /// Owned copy of sub-frame `index`.
    pub fn frame_at(&self, index: u32) -> Result<Frame> {
        let count = self.item_count();
        if index >= count {
            return Err(FrameError::ItemNotFound {
                index: u64::from(index),
                count: u64::from(count),
            });
        }
        for (i, view) in self.frames()?.enumerate() {
            let view = view?;
            if i == index as usize {
                return view.to_frame();
            }
        }
        Err(FrameError::ItemNotFound {
            index: u64::from(index),
            count: u64::from(count),
        })
    }

    fn bound_format(&self) -> Result<&FrameFormat> {
        self.format
            .as_deref()
            .ok_or(FrameError::FormatNotFound {
                frame_type: self.frame_type(),
            })
    }

    fn item_span(&self, operation: &'static str, index: u32) -> Result<(usize, usize)> {
        let size = match self.kind() {
            FrameKind::Layered => {
                return Err(FrameError::unsupported(operation, FrameKind::Layered))
            }
            FrameKind::Blob => self.payload.len(),
            FrameKind::Basic => self.item_size_b() as usize,
        };
        let count = self.item_count();
        if index >= count {
            return Err(FrameError::ItemNotFound {
                index: u64::from(index),
                count: u64::from(count),
            });
        }
        let start = index as usize * size;
        Ok((start, start + size))
    }

    fn sync_payload(&mut self) {
        self.payload.resize(self.header.data_size_b() as usize, 0);
    }
}

/// Bytes covered by the first `count` sub-frames, or the whole payload when a
/// sub-frame header is unreadable.
fn layered_content_len(payload: &[u8], count: u32) -> usize {
    let mut pos = 0usize;
    for _ in 0..count {
        match sub_frame_len(&payload[pos..]) {
            Ok((_, size)) => pos += size,
            Err(_) => return payload.len(),
        }
    }
    pos
}

/// Primary header and size of the sub-frame at the start of `rest`.
///
/// Every sub-frame spans at least its own primary header.
fn sub_frame_len(rest: &[u8]) -> Result<(PrimaryHeader, usize)> {
    let primary = PrimaryHeader::decode_slice(rest)?;
    let size = primary.frame_size_b();
    if size < PRIMARY_HEADER_SIZE as u64 {
        return Err(FrameError::MalformedHeader(format!(
            "sub-frame declares {size} bytes, less than its {PRIMARY_HEADER_SIZE}-byte header"
        )));
    }
    if size > rest.len() as u64 {
        return Err(FrameError::MalformedHeader(format!(
            "sub-frame of {size} bytes overruns the {} bytes left in its parent",
            rest.len()
        )));
    }
    Ok((primary, size as usize))
}

/// A read-only item of a basic or blob frame.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    bytes: &'a [u8],
    index: u32,
    offset_b: usize,
    endianness: Endianness,
    frame_type: u16,
    format: Option<&'a FrameFormat>,
}

impl<'a> Item<'a> {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Offset of the item within its frame.
    pub fn offset_b(&self) -> usize {
        self.offset_b
    }

    pub fn size_b(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Field at `offset_b` within the item.
    pub fn field(&self, offset_b: usize, size_b: usize) -> Result<Field<'a>> {
        let bytes = slice_field(self.bytes, offset_b, size_b)?;
        Ok(Field::new(bytes, offset_b, self.endianness)
            .with_layout(item_layout_at(self.format, offset_b, size_b)))
    }

    pub fn field_named(&self, name: &str) -> Result<Field<'a>> {
        let layout = item_layout(self.format, self.frame_type, name)?;
        self.field(layout.offset_b, layout.size_b)
    }
}

/// A writable item of a basic or blob frame.
#[derive(Debug)]
pub struct ItemMut<'a> {
    bytes: &'a mut [u8],
    index: u32,
    offset_b: usize,
    endianness: Endianness,
    frame_type: u16,
    format: Option<&'a FrameFormat>,
}

impl ItemMut<'_> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn offset_b(&self) -> usize {
        self.offset_b
    }

    pub fn size_b(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    pub fn field(&self, offset_b: usize, size_b: usize) -> Result<Field<'_>> {
        let bytes = slice_field(&*self.bytes, offset_b, size_b)?;
        Ok(Field::new(bytes, offset_b, self.endianness)
            .with_layout(item_layout_at(self.format, offset_b, size_b)))
    }

    pub fn field_named(&self, name: &str) -> Result<Field<'_>> {
        let layout = item_layout(self.format, self.frame_type, name)?;
        self.field(layout.offset_b, layout.size_b)
    }

    pub fn field_mut(&mut self, offset_b: usize, size_b: usize) -> Result<FieldMut<'_>> {
        let layout = item_layout_at(self.format, offset_b, size_b);
        let bytes = slice_field_mut(&mut *self.bytes, offset_b, size_b)?;
        Ok(FieldMut::new(bytes, offset_b, self.endianness).with_layout(layout))
    }

    pub fn field_named_mut(&mut self, name: &str) -> Result<FieldMut<'_>> {
        let layout = item_layout(self.format, self.frame_type, name)?;
        self.field_mut(layout.offset_b, layout.size_b)
    }
}

fn item_layout<'a>(
    format: Option<&'a FrameFormat>,
    frame_type: u16,
    name: &str,
) -> Result<&'a FieldLayout> {
    format
        .ok_or(FrameError::FormatNotFound { frame_type })?
        .find_item_field(name)
}

fn item_layout_at(
    format: Option<&FrameFormat>,
    offset_b: usize,
    size_b: usize,
) -> Option<(&str, &FieldLayout)> {
    let format = format?;
    let name = format.find_item_field_at(offset_b, size_b).ok()?;
    Some((name, format.find_item_field(name).ok()?))
}

/// Iterator over the items of a frame.
#[derive(Debug)]
pub struct Items<'a> {
    frame: &'a Frame,
    next: u32,
}

impl<'a> Iterator for Items<'a> {
    type Item = Item<'a>;

    fn next(&mut self) -> Option<Item<'a>> {
        let item = self.frame.item_at(self.next).ok()?;
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.frame.item_count().saturating_sub(self.next) as usize;
        (left, Some(left))
    }
}

/// A sub-frame borrowed from its layered parent.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    primary: PrimaryHeader,
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    pub fn primary(&self) -> &PrimaryHeader {
        &self.primary
    }

    /// The complete encoded sub-frame.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Frame::decode(self.bytes)
    }
}

/// Iterator over the sub-frames of a layered frame.
#[derive(Debug)]
pub struct SubFrames<'a> {
    payload: &'a [u8],
    pos: usize,
    remaining: u32,
}

impl<'a> Iterator for SubFrames<'a> {
    type Item = Result<FrameView<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let payload: &'a [u8] = self.payload;
        let rest = &payload[self.pos..];
        let view = sub_frame_len(rest).map(|(primary, size)| FrameView {
            primary,
            bytes: &rest[..size],
        });

        match &view {
            Ok(found) => self.pos += found.bytes.len(),
            Err(_) => self.remaining = 0,
        }
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testing::{blob_sample_format, cobo_format, layered_format};

    fn scenario_format() -> Arc<FrameFormat> {
        Arc::new(
            FrameFormat::builder("scenario", 1, 1)
                .blk_size_b(64)
                .header_size_blk(2)
                .item_size_b(4)
                .build()
                .unwrap(),
        )
    }

    fn unit_layered_format() -> Arc<FrameFormat> {
        Arc::new(FrameFormat::builder("unit layered", 0xFF10, 0).build().unwrap())
    }

    struct Formats(Vec<Arc<FrameFormat>>);

    impl FormatLookup for Formats {
        fn find_format(&self, frame_type: u16, revision: u8) -> Result<Arc<FrameFormat>> {
            self.0
                .iter()
                .find(|f| f.frame_type() == frame_type && f.revision() == revision)
                .cloned()
                .ok_or(FrameError::FormatRevisionNotFound {
                    frame_type,
                    revision,
                })
        }

        fn find_latest_format(&self, frame_type: u16) -> Result<Arc<FrameFormat>> {
            self.0
                .iter()
                .filter(|f| f.frame_type() == frame_type)
                .max_by_key(|f| f.revision())
                .cloned()
                .ok_or(FrameError::FormatNotFound { frame_type })
        }
    }

    #[test]
    fn test_empty_frame_roundtrip() {
        let frame = Frame::create(&scenario_format()).unwrap();
        let mut out = Vec::new();
        frame.write(&mut out).unwrap();
        assert_eq!(out.len(), 128);

        let back = Frame::read(&mut Cursor::new(out)).unwrap();
        assert_eq!(back.item_count(), 0);
        assert_eq!(back.data_size_b(), 0);
        assert_eq!(back.header(), frame.header());
    }

    #[test]
    fn test_add_items_pads_to_block() {
        let mut frame = Frame::create(&scenario_format()).unwrap();
        frame.add_items(3).unwrap();
        assert_eq!(frame.item_count(), 3);
        assert_eq!(frame.data_size_b(), 64);
        assert_eq!(frame.frame_size_b(), 192);
        assert_eq!(frame.payload().len(), 64);

        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), 192);
        let first = Frame::decode(&bytes).unwrap();
        let second = Frame::decode(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.header(), frame.header());
        assert_eq!(first.payload(), frame.payload());
    }

    #[test]
    fn test_item_not_found_reports_count() {
        let mut frame = Frame::create(&scenario_format()).unwrap();
        frame.add_items(3).unwrap();
        let err = frame.item_at(5).unwrap_err();
        assert!(matches!(err, FrameError::ItemNotFound { index: 5, count: 3 }));
        assert!(frame.item_at(2).is_ok());
    }

    #[test]
    fn test_read_truncated_payload() {
        let mut frame = Frame::create(&scenario_format()).unwrap();
        frame.add_items(3).unwrap();
        let bytes = frame.to_bytes();

        let err = Frame::read(&mut Cursor::new(bytes[..150].to_vec())).unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteFrame {
                needed: 192,
                available: 150
            }
        ));
        assert!(Frame::decode(&bytes[..191]).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let frame = Frame::create(&scenario_format()).unwrap();
        let mut bytes = frame.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xAB; 10]);
        assert_eq!(Frame::decode(&bytes).unwrap().frame_size_b(), 128);
    }

    #[test]
    fn test_cobo_item_fields() {
        let mut frame = Frame::create(&Arc::new(cobo_format())).unwrap();
        frame.add_items(2).unwrap();

        {
            let mut item = frame.item_at_mut(1).unwrap();
            let mut field = item.field_named_mut("").unwrap();
            field.named_bit_field_mut("sample").unwrap().set_value_u128(0xFFF).unwrap();
            field.named_bit_field_mut("buckIdx").unwrap().set_value_u128(0xAA).unwrap();
            field.named_bit_field_mut("chanIdx").unwrap().set_value_u128(0x7F).unwrap();
            field.named_bit_field_mut("agetIdx").unwrap().set_value_u128(3).unwrap();
        }

        let item = frame.item_at(1).unwrap();
        assert_eq!(item.field_named("").unwrap().value::<u32>(), 0xFFAA_8FFF);
        assert_eq!(item.bytes(), &[0xFF, 0xAA, 0x8F, 0xFF]);
        assert_eq!(item.offset_b(), 132);
        assert_eq!(
            item.field(0, 4)
                .unwrap()
                .named_bit_field("chanIdx")
                .unwrap()
                .value_u128()
                .unwrap(),
            0x7F
        );
        assert!(matches!(item.field(2, 4), Err(FrameError::OutOfRange(_))));
        assert_eq!(frame.item_at(0).unwrap().field(0, 4).unwrap().value::<u32>(), 0);
    }

    #[test]
    fn test_find_item_field() {
        let mut frame = Frame::create(&Arc::new(cobo_format())).unwrap();
        frame.add_items(3).unwrap();
        assert_eq!(frame.find_item_field("", 0).unwrap(), (128, 4));
        assert_eq!(frame.find_item_field("", 2).unwrap(), (136, 4));
        assert!(matches!(
            frame.find_item_field("", 3),
            Err(FrameError::ItemNotFound { index: 3, count: 3 })
        ));
        assert!(matches!(
            frame.find_item_field("missing", 0),
            Err(FrameError::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_items_iterates_in_order() {
        let mut frame = Frame::create(&Arc::new(cobo_format())).unwrap();
        frame.add_items(4).unwrap();
        for index in 0..4 {
            frame
                .item_at_mut(index)
                .unwrap()
                .field_mut(0, 4)
                .unwrap()
                .set_value(index * 10);
        }
        let values: Vec<u32> = frame
            .items()
            .unwrap()
            .map(|item| item.field(0, 4).unwrap().value())
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_blob_single_item() {
        let mut frame = Frame::create(&Arc::new(blob_sample_format())).unwrap();
        assert_eq!(frame.frame_size_b(), 64);
        assert_eq!(frame.item_count(), 1);
        assert_eq!(frame.item_size_b(), 56);

        frame
            .item_at_mut(0)
            .unwrap()
            .field_named_mut("field3")
            .unwrap()
            .set_value(-130i16);
        let field = frame.item_at(0).unwrap().field_named("field3").unwrap();
        assert_eq!(field.value::<i16>(), -130);
        assert_eq!(frame.find_item_field("field3", 0).unwrap(), (62, 2));
        assert!(matches!(
            frame.item_at(1),
            Err(FrameError::ItemNotFound { index: 1, count: 1 })
        ));
        assert!(frame.add_item().is_err());
        assert_eq!(frame.items().unwrap().count(), 1);
    }

    #[test]
    fn test_header_fields_use_bound_format() {
        let mut frame = Frame::create(&Arc::new(cobo_format())).unwrap();
        frame.header_field_mut("eventIdx").unwrap().set_value(77u32);
        frame.header_field_mut("coboIdx").unwrap().set_value(5u8);
        assert_eq!(frame.header_field("eventIdx").unwrap().value::<u32>(), 77);
        assert_eq!(frame.header_field_at(26, 1).unwrap().name(), Some("coboIdx"));

        let decoded = Frame::decode(&frame.to_bytes()).unwrap();
        assert!(decoded.format().is_none());
        assert!(matches!(
            decoded.header_field("eventIdx"),
            Err(FrameError::FormatNotFound { frame_type: 1 })
        ));
        assert_eq!(decoded.header_field_at(22, 4).unwrap().value::<u32>(), 77);
    }

    #[test]
    fn test_read_with_binds_format() {
        let cobo = Arc::new(cobo_format());
        let formats = Formats(vec![Arc::clone(&cobo)]);
        let frame = Frame::create(&cobo).unwrap();
        let bytes = frame.to_bytes().to_vec();

        let bound = Frame::read_with(&mut Cursor::new(bytes), &formats).unwrap();
        assert_eq!(bound.format(), Some(&cobo));

        let unknown = Frame::create(&scenario_format()).unwrap().to_bytes().to_vec();
        assert!(matches!(
            Frame::read_with(&mut Cursor::new(unknown), &formats),
            Err(FrameError::FormatRevisionNotFound {
                frame_type: 1,
                revision: 1
            })
        ));

        let blob = Frame::create(&Arc::new(blob_sample_format())).unwrap().to_bytes().to_vec();
        let unbound = Frame::read_with(&mut Cursor::new(blob), &formats).unwrap();
        assert!(unbound.format().is_none());
    }

    #[test]
    fn test_set_format_checks_discriminator() {
        let created = Frame::create(&scenario_format()).unwrap();
        let mut frame = Frame::decode(&created.to_bytes()).unwrap();
        assert!(matches!(
            frame.set_format(Arc::new(cobo_format())),
            Err(FrameError::InvalidFormat(_))
        ));
        frame.set_format(scenario_format()).unwrap();
        assert!(frame.format().is_some());
    }

    #[test]
    fn test_layered_embeds_sub_frames() {
        let mut sub = Frame::create(&scenario_format()).unwrap();
        sub.add_items(3).unwrap();
        let mut parent = Frame::create(&unit_layered_format()).unwrap();
        assert_eq!(parent.frame_size_b(), 16);

        parent.add_frame(&sub).unwrap();
        parent.add_frame(&sub).unwrap();
        assert_eq!(parent.item_count(), 2);
        assert_eq!(parent.frame_size_b(), 16 + 2 * sub.frame_size_b());

        let views: Vec<FrameView<'_>> = parent.frames().unwrap().map(|v| v.unwrap()).collect();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].bytes(), &sub.to_bytes()[..]);
        assert_eq!(views[0].primary().frame_type(), 1);

        let copy = parent.frame_at(1).unwrap();
        assert_eq!(copy.header(), sub.header());
        assert!(matches!(
            parent.frame_at(2),
            Err(FrameError::ItemNotFound { index: 2, count: 2 })
        ));
        assert!(matches!(
            parent.item_at(0),
            Err(FrameError::UnsupportedOperation {
                kind: FrameKind::Layered,
                ..
            })
        ));
    }

    #[test]
    fn test_layered_padding_is_reused() {
        let format = Arc::new(layered_format().with_blk_size_b(16).unwrap());
        let sub = Frame::create(&Arc::new(blob_sample_format())).unwrap();
        let mut parent = Frame::create(&format).unwrap();
        assert_eq!(parent.header_size_b(), 32);

        parent.add_frame(&sub).unwrap();
        parent.add_frame(&sub).unwrap();
        parent.add_frame(&sub).unwrap();
        assert_eq!(parent.data_size_b(), 192);

        let mut odd = Frame::create(&Arc::new(
            FrameFormat::builder("odd", 9, 0)
                .item_size_b(4)
                .build()
                .unwrap(),
        ))
        .unwrap();
        odd.add_item().unwrap();
        assert_eq!(odd.frame_size_b(), 20);

        // 212 content bytes padded to 224.
        parent.add_frame(&odd).unwrap();
        assert_eq!(parent.data_size_b(), 224);
        assert!(parent.payload()[212..].iter().all(|b| *b == 0));

        // Re-decoded frames keep appending after the last sub-frame, not after the padding.
        let mut decoded = Frame::decode(&parent.to_bytes()).unwrap();
        decoded.add_frame(&odd).unwrap();
        assert_eq!(decoded.data_size_b(), 240);
        let sizes: Vec<u64> = decoded
            .frames()
            .unwrap()
            .map(|v| v.unwrap().primary().frame_size_b())
            .collect();
        assert_eq!(sizes, vec![64, 64, 64, 20, 20]);
    }

    #[test]
    fn test_add_frame_requires_layered() {
        let sub = Frame::create(&scenario_format()).unwrap();
        let mut basic = Frame::create(&Arc::new(cobo_format())).unwrap();
        let before = basic.clone();
        assert!(matches!(
            basic.add_frame(&sub),
            Err(FrameError::UnsupportedOperation {
                operation: "add_frame",
                kind: FrameKind::Basic
            })
        ));
        assert_eq!(basic, before);
        assert!(basic.frames().is_err());
    }

    #[test]
    fn test_overrunning_sub_frame_is_reported() {
        let sub = Frame::create(&scenario_format()).unwrap();
        let mut parent = Frame::create(&unit_layered_format()).unwrap();
        parent.add_frame(&sub).unwrap();
        let mut bytes = parent.to_bytes().to_vec();
        // Claim a 3-block sub-frame where only 2 blocks are present.
        bytes[16 + 3] = 3;

        let decoded = Frame::decode(&bytes).unwrap();
        let mut frames = decoded.frames().unwrap();
        assert!(matches!(
            frames.next(),
            Some(Err(FrameError::MalformedHeader(_)))
        ));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_zero_size_sub_frame_is_malformed() {
        // Layered frame claiming u32::MAX sub-frames, carrying one blob primary
        // header whose block count is zero.
        let mut bytes = vec![
            0x00, 0x00, 0x00, 0x18, 0x00, 0xFF, 0x10, 0x00, 0x00, 0x10, 0x00, 0x00, 0xFF, 0xFF,
            0xFF, 0xFF,
        ];
        bytes.extend_from_slice(&[0x40, 0, 0, 0, 0, 0, 0, 0]);

        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.kind(), FrameKind::Layered);
        assert_eq!(decoded.item_count(), u32::MAX);

        let mut frames = decoded.frames().unwrap();
        assert!(matches!(
            frames.next(),
            Some(Err(FrameError::MalformedHeader(_)))
        ));
        assert!(frames.next().is_none());
        assert!(matches!(
            decoded.frame_at(7),
            Err(FrameError::MalformedHeader(_))
        ));

        let mut wire = BytesMut::from(&bytes[..]);
        let built = crate::builder::decode_frame(&mut wire, 1024).unwrap().unwrap();
        assert_eq!(built, decoded);
    }

    #[test]
    fn test_redecoded_frame_equals_original() {
        let mut basic = Frame::create(&Arc::new(cobo_format())).unwrap();
        basic.add_items(5).unwrap();
        basic.header_field_mut("eventIdx").unwrap().set_value(31u32);
        let decoded = Frame::decode(&basic.to_bytes()).unwrap();
        assert!(decoded.format().is_none());
        assert_eq!(decoded, basic);
        assert_eq!(Frame::decode(&decoded.to_bytes()).unwrap(), decoded);

        let mut parent = Frame::create(&unit_layered_format()).unwrap();
        parent.add_frame(&basic).unwrap();
        assert_eq!(Frame::decode(&parent.to_bytes()).unwrap(), parent);

        basic.add_item().unwrap();
        assert_ne!(decoded, basic);
    }
}

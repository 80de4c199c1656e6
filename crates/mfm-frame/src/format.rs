//! Structural descriptions of frames, keyed by (frame type, revision).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::binio::Endianness;
use crate::error::{FrameError, Result};
use crate::header::STANDARD_HEADER_MIN_SIZE;
use crate::primary::{blk_size_exponent, PRIMARY_HEADER_SIZE};

/// Payload organisation of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Opaque payload, no item bookkeeping.
    Blob,
    /// Fixed-size items.
    Basic,
    /// Embedded complete frames of varying size.
    Layered,
}

impl FrameKind {
    pub(crate) fn derive(blob: bool, item_size_b: u16) -> Self {
        match (blob, item_size_b) {
            (true, _) => FrameKind::Blob,
            (false, 0) => FrameKind::Layered,
            (false, _) => FrameKind::Basic,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Blob => f.write_str("blob"),
            FrameKind::Basic => f.write_str("basic"),
            FrameKind::Layered => f.write_str("layered"),
        }
    }
}

/// Position of a bit field within the integer value of its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitFieldLayout {
    pub pos_b: usize,
    pub width_b: usize,
}

/// Position of a named field within a header or an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset_b: usize,
    pub size_b: usize,
    bit_fields: BTreeMap<String, BitFieldLayout>,
}

impl FieldLayout {
    pub fn new(offset_b: usize, size_b: usize) -> Self {
        Self {
            offset_b,
            size_b,
            bit_fields: BTreeMap::new(),
        }
    }

    /// Declare a named bit field within this field.
    pub fn with_bit_field(mut self, name: impl Into<String>, pos_b: usize, width_b: usize) -> Self {
        self.bit_fields
            .insert(name.into(), BitFieldLayout { pos_b, width_b });
        self
    }

    /// First byte past the field, or `None` when the bounds overflow.
    pub fn end_b(&self) -> Option<usize> {
        self.offset_b.checked_add(self.size_b)
    }

    /// Declared bit fields, ordered by position.
    pub fn bit_fields(&self) -> Vec<(&str, BitFieldLayout)> {
        let mut out: Vec<(&str, BitFieldLayout)> = self
            .bit_fields
            .iter()
            .map(|(name, layout)| (name.as_str(), *layout))
            .collect();
        out.sort_by_key(|(_, layout)| layout.pos_b);
        out
    }

    pub fn bit_field(&self, name: &str) -> Option<BitFieldLayout> {
        self.bit_fields.get(name).copied()
    }

    fn validate(&self, scope: &str, name: &str, limit_b: usize) -> Result<()> {
        let fits = self.end_b().is_some_and(|end_b| end_b <= limit_b);
        if self.size_b == 0 || !fits {
            return Err(FrameError::InvalidFormat(format!(
                "{scope} field '{name}' of {} bytes at offset {} does not fit in {limit_b} bytes",
                self.size_b, self.offset_b
            )));
        }
        for (bit_name, bits) in &self.bit_fields {
            let end_bit = bits.pos_b.checked_add(bits.width_b);
            if bits.width_b == 0 || end_bit.is_none_or(|end_bit| end_bit > self.size_b * 8) {
                return Err(FrameError::InvalidFormat(format!(
                    "bit field '{bit_name}' of {scope} field '{name}' exceeds {} bits",
                    self.size_b * 8
                )));
            }
        }
        Ok(())
    }
}

/// Description of one (frame type, revision) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFormat {
    name: String,
    frame_type: u16,
    revision: u8,
    blob: bool,
    endianness: Endianness,
    blk_size_b: u32,
    header_size_blk: u16,
    item_size_b: u16,
    header_fields: BTreeMap<String, FieldLayout>,
    item_fields: BTreeMap<String, FieldLayout>,
}

impl FrameFormat {
    pub fn builder(name: impl Into<String>, frame_type: u16, revision: u8) -> FrameFormatBuilder {
        FrameFormatBuilder {
            format: FrameFormat {
                name: name.into(),
                frame_type,
                revision,
                blob: false,
                endianness: Endianness::Big,
                blk_size_b: 1,
                header_size_blk: STANDARD_HEADER_MIN_SIZE as u16,
                item_size_b: 0,
                header_fields: BTreeMap::new(),
                item_fields: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_type(&self) -> u16 {
        self.frame_type
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn is_blob(&self) -> bool {
        self.blob
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::derive(self.blob, self.item_size_b)
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn blk_size_b(&self) -> u32 {
        self.blk_size_b
    }

    pub fn header_size_blk(&self) -> u16 {
        self.header_size_blk
    }

    /// Header size in bytes; always 8 for blob formats.
    pub fn header_size_b(&self) -> u64 {
        if self.blob {
            PRIMARY_HEADER_SIZE as u64
        } else {
            u64::from(self.header_size_blk) * u64::from(self.blk_size_b)
        }
    }

    /// Item size; for blob formats, the size of the opaque payload.
    pub fn item_size_b(&self) -> u16 {
        self.item_size_b
    }

    /// Header fields ordered by offset.
    pub fn header_fields(&self) -> Vec<(&str, &FieldLayout)> {
        sorted_fields(&self.header_fields)
    }

    /// Item fields ordered by offset.
    pub fn item_fields(&self) -> Vec<(&str, &FieldLayout)> {
        sorted_fields(&self.item_fields)
    }

    pub fn find_header_field(&self, name: &str) -> Result<&FieldLayout> {
        self.header_fields
            .get(name)
            .ok_or_else(|| FrameError::FieldNotFound(name.to_string()))
    }

    /// Name of the header field declared at exactly `(offset_b, size_b)`.
    pub fn find_header_field_at(&self, offset_b: usize, size_b: usize) -> Result<&str> {
        find_field_at(&self.header_fields, offset_b, size_b)
    }

    pub fn find_item_field(&self, name: &str) -> Result<&FieldLayout> {
        self.item_fields
            .get(name)
            .ok_or_else(|| FrameError::FieldNotFound(name.to_string()))
    }

    /// Name of the item field declared at exactly `(offset_b, size_b)`.
    pub fn find_item_field_at(&self, offset_b: usize, size_b: usize) -> Result<&str> {
        find_field_at(&self.item_fields, offset_b, size_b)
    }

    pub fn find_header_bit_field(&self, field: &str, bit_field: &str) -> Result<BitFieldLayout> {
        find_bit_field(self.find_header_field(field)?, field, bit_field)
    }

    pub fn find_item_bit_field(&self, field: &str, bit_field: &str) -> Result<BitFieldLayout> {
        find_bit_field(self.find_item_field(field)?, field, bit_field)
    }

    /// Copy of this format with another block size.
    ///
    /// The header keeps at least its former byte size:
    /// `header_size_blk = ceil(header_size_blk * old_blk / new_blk)`.
    pub fn with_blk_size_b(&self, blk_size_b: u32) -> Result<FrameFormat> {
        blk_size_exponent(blk_size_b)?;
        let header_b = u64::from(self.header_size_blk) * u64::from(self.blk_size_b);
        let header_size_blk = header_b.div_ceil(u64::from(blk_size_b));
        let header_size_blk = u16::try_from(header_size_blk).map_err(|_| {
            FrameError::OutOfRange(format!(
                "header of {header_b} bytes in {blk_size_b}-byte blocks"
            ))
        })?;
        Ok(FrameFormat {
            blk_size_b,
            header_size_blk: header_size_blk.max(1),
            ..self.clone()
        })
    }

    fn validate(&self) -> Result<()> {
        blk_size_exponent(self.blk_size_b)
            .map_err(|err| FrameError::InvalidFormat(format!("{}: {err}", self.name)))?;

        let header_limit = if self.blob {
            PRIMARY_HEADER_SIZE
        } else {
            let header_b = self.header_size_b();
            if header_b < STANDARD_HEADER_MIN_SIZE as u64 {
                return Err(FrameError::InvalidFormat(format!(
                    "{}: header of {header_b} bytes is shorter than {STANDARD_HEADER_MIN_SIZE}",
                    self.name
                )));
            }
            header_b as usize
        };

        for (name, layout) in &self.header_fields {
            layout.validate("header", name, header_limit)?;
        }
        for (name, layout) in &self.item_fields {
            layout.validate("item", name, usize::from(self.item_size_b))?;
        }
        Ok(())
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (type {:#06x}, revision {})",
            self.name, self.frame_type, self.revision
        )
    }
}

/// Incremental construction of a validated [`FrameFormat`].
#[derive(Debug, Clone)]
pub struct FrameFormatBuilder {
    format: FrameFormat,
}

impl FrameFormatBuilder {
    pub fn blob(mut self, blob: bool) -> Self {
        self.format.blob = blob;
        self
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.format.endianness = endianness;
        self
    }

    pub fn blk_size_b(mut self, blk_size_b: u32) -> Self {
        self.format.blk_size_b = blk_size_b;
        self
    }

    pub fn header_size_blk(mut self, header_size_blk: u16) -> Self {
        self.format.header_size_blk = header_size_blk;
        self
    }

    pub fn item_size_b(mut self, item_size_b: u16) -> Self {
        self.format.item_size_b = item_size_b;
        self
    }

    pub fn header_field(mut self, name: impl Into<String>, layout: FieldLayout) -> Self {
        self.format.header_fields.insert(name.into(), layout);
        self
    }

    pub fn item_field(mut self, name: impl Into<String>, layout: FieldLayout) -> Self {
        self.format.item_fields.insert(name.into(), layout);
        self
    }

    pub fn build(mut self) -> Result<FrameFormat> {
        if self.format.blob {
            let blk = u64::from(self.format.blk_size_b.max(1));
            self.format.header_size_blk = (PRIMARY_HEADER_SIZE as u64).div_ceil(blk) as u16;
        }
        self.format.validate()?;
        Ok(self.format)
    }
}

/// Source of frame formats, e.g. a format dictionary.
pub trait FormatLookup {
    /// Format registered for exactly `(frame_type, revision)`.
    fn find_format(&self, frame_type: u16, revision: u8) -> Result<Arc<FrameFormat>>;

    /// Format with the highest revision registered for `frame_type`.
    fn find_latest_format(&self, frame_type: u16) -> Result<Arc<FrameFormat>>;
}

impl<T: FormatLookup + ?Sized> FormatLookup for &T {
    fn find_format(&self, frame_type: u16, revision: u8) -> Result<Arc<FrameFormat>> {
        (**self).find_format(frame_type, revision)
    }

    fn find_latest_format(&self, frame_type: u16) -> Result<Arc<FrameFormat>> {
        (**self).find_latest_format(frame_type)
    }
}

impl<T: FormatLookup + ?Sized> FormatLookup for Arc<T> {
    fn find_format(&self, frame_type: u16, revision: u8) -> Result<Arc<FrameFormat>> {
        (**self).find_format(frame_type, revision)
    }

    fn find_latest_format(&self, frame_type: u16) -> Result<Arc<FrameFormat>> {
        (**self).find_latest_format(frame_type)
    }
}

fn sorted_fields(fields: &BTreeMap<String, FieldLayout>) -> Vec<(&str, &FieldLayout)> {
    let mut out: Vec<(&str, &FieldLayout)> = fields
        .iter()
        .map(|(name, layout)| (name.as_str(), layout))
        .collect();
    out.sort_by_key(|(_, layout)| (layout.offset_b, layout.size_b));
    out
}

fn find_field_at(
    fields: &BTreeMap<String, FieldLayout>,
    offset_b: usize,
    size_b: usize,
) -> Result<&str> {
    fields
        .iter()
        .find(|(_, layout)| layout.offset_b == offset_b && layout.size_b == size_b)
        .map(|(name, _)| name.as_str())
        .ok_or_else(|| FrameError::FieldNotFound(format!("@{offset_b}+{size_b}")))
}

fn find_bit_field(layout: &FieldLayout, field: &str, bit_field: &str) -> Result<BitFieldLayout> {
    layout
        .bit_field(bit_field)
        .ok_or_else(|| FrameError::BitFieldNotFound {
            field: field.to_string(),
            bit_field: bit_field.to_string(),
        })
}

//! Field and bit field views over header or item bytes.
//!
//! A field is a run of bytes holding one integer in the frame's byte order.
//! Field offsets are always reported relative to the start of the frame.

use crate::binio::{decode_slice, encode_slice, Endianness, Word};
use crate::bitset::{read_bits, write_bits, BitSet};
use crate::error::{FrameError, Result};
use crate::format::FieldLayout;

/// Read-only view of one field.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    bytes: &'a [u8],
    offset_b: usize,
    endianness: Endianness,
    layout: Option<(&'a str, &'a FieldLayout)>,
}

impl<'a> Field<'a> {
    pub(crate) fn new(bytes: &'a [u8], offset_b: usize, endianness: Endianness) -> Self {
        Self {
            bytes,
            offset_b,
            endianness,
            layout: None,
        }
    }

    pub(crate) fn with_layout(mut self, layout: Option<(&'a str, &'a FieldLayout)>) -> Self {
        self.layout = layout;
        self
    }

    /// Declared name, when the field is known to the frame format.
    pub fn name(&self) -> Option<&'a str> {
        self.layout.map(|(name, _)| name)
    }

    pub fn offset_b(&self) -> usize {
        self.offset_b
    }

    pub fn size_b(&self) -> usize {
        self.bytes.len()
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Integer value, extended or truncated to `W`.
    pub fn value<W: Word>(&self) -> W {
        decode_slice(self.bytes, self.endianness)
    }

    /// All bits of the field.
    pub fn bits(&self) -> BitSet {
        // The full range of a non-empty field is always valid.
        read_bits(self.bytes, self.endianness, 0, self.bytes.len() * 8)
            .unwrap_or_else(|_| BitSet::new(0))
    }

    pub fn bit(&self, pos_b: usize) -> Result<bool> {
        read_bits(self.bytes, self.endianness, pos_b, 1)?.bit(0)
    }

    pub fn bit_field(&self, pos_b: usize, width_b: usize) -> Result<BitField<'a>> {
        check_bit_range(self.bytes.len(), pos_b, width_b)?;
        Ok(BitField {
            bytes: self.bytes,
            endianness: self.endianness,
            pos_b,
            width_b,
        })
    }

    /// Bit field declared under `name` for this field.
    pub fn named_bit_field(&self, name: &str) -> Result<BitField<'a>> {
        let layout = resolve_bit_field(self.layout, self.offset_b, self.bytes.len(), name)?;
        self.bit_field(layout.0, layout.1)
    }
}

/// Writable view of one field.
#[derive(Debug)]
pub struct FieldMut<'a> {
    bytes: &'a mut [u8],
    offset_b: usize,
    endianness: Endianness,
    layout: Option<(&'a str, &'a FieldLayout)>,
}

impl<'a> FieldMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], offset_b: usize, endianness: Endianness) -> Self {
        Self {
            bytes,
            offset_b,
            endianness,
            layout: None,
        }
    }

    pub(crate) fn with_layout(mut self, layout: Option<(&'a str, &'a FieldLayout)>) -> Self {
        self.layout = layout;
        self
    }

    /// Read-only view of the same bytes.
    pub fn as_field(&self) -> Field<'_> {
        Field {
            bytes: &*self.bytes,
            offset_b: self.offset_b,
            endianness: self.endianness,
            layout: self.layout,
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        self.layout.map(|(name, _)| name)
    }

    pub fn offset_b(&self) -> usize {
        self.offset_b
    }

    pub fn size_b(&self) -> usize {
        self.bytes.len()
    }

    pub fn value<W: Word>(&self) -> W {
        decode_slice(&*self.bytes, self.endianness)
    }

    /// Store `value`, sign-extending or truncating to the field width.
    pub fn set_value<W: Word>(&mut self, value: W) {
        encode_slice(value, self.bytes, self.endianness);
    }

    pub fn bits(&self) -> BitSet {
        self.as_field().bits()
    }

    /// Overwrite the whole field; `bits` must be exactly as wide as the field.
    pub fn set_bits(&mut self, bits: &BitSet) -> Result<()> {
        check_pattern_width(self.bytes.len() * 8, bits.width())?;
        write_bits(self.bytes, self.endianness, 0, bits)
    }

    pub fn set_bit(&mut self, pos_b: usize, value: bool) -> Result<()> {
        let mut bit = BitSet::new(1);
        bit.set_bit(0, value)?;
        write_bits(self.bytes, self.endianness, pos_b, &bit)
    }

    pub fn bit_field(&self, pos_b: usize, width_b: usize) -> Result<BitField<'_>> {
        check_bit_range(self.bytes.len(), pos_b, width_b)?;
        Ok(BitField {
            bytes: &*self.bytes,
            endianness: self.endianness,
            pos_b,
            width_b,
        })
    }

    pub fn bit_field_mut(&mut self, pos_b: usize, width_b: usize) -> Result<BitFieldMut<'_>> {
        check_bit_range(self.bytes.len(), pos_b, width_b)?;
        Ok(BitFieldMut {
            bytes: &mut *self.bytes,
            endianness: self.endianness,
            pos_b,
            width_b,
        })
    }

    pub fn named_bit_field(&self, name: &str) -> Result<BitField<'_>> {
        let (pos_b, width_b) =
            resolve_bit_field(self.layout, self.offset_b, self.bytes.len(), name)?;
        self.bit_field(pos_b, width_b)
    }

    pub fn named_bit_field_mut(&mut self, name: &str) -> Result<BitFieldMut<'_>> {
        let (pos_b, width_b) =
            resolve_bit_field(self.layout, self.offset_b, self.bytes.len(), name)?;
        self.bit_field_mut(pos_b, width_b)
    }
}

/// Read-only view of bits `[pos_b, pos_b + width_b)` of a field.
#[derive(Debug, Clone, Copy)]
pub struct BitField<'a> {
    bytes: &'a [u8],
    endianness: Endianness,
    pos_b: usize,
    width_b: usize,
}

impl BitField<'_> {
    pub fn pos_b(&self) -> usize {
        self.pos_b
    }

    pub fn width_b(&self) -> usize {
        self.width_b
    }

    pub fn value(&self) -> BitSet {
        // Range checked when the view was created.
        read_bits(self.bytes, self.endianness, self.pos_b, self.width_b)
            .unwrap_or_else(|_| BitSet::new(self.width_b))
    }

    /// Numeric value; fails only for set bits above bit 127.
    pub fn value_u128(&self) -> Result<u128> {
        self.value().to_u128()
    }
}

/// Writable view of bits `[pos_b, pos_b + width_b)` of a field.
#[derive(Debug)]
pub struct BitFieldMut<'a> {
    bytes: &'a mut [u8],
    endianness: Endianness,
    pos_b: usize,
    width_b: usize,
}

impl BitFieldMut<'_> {
    pub fn pos_b(&self) -> usize {
        self.pos_b
    }

    pub fn width_b(&self) -> usize {
        self.width_b
    }

    pub fn value(&self) -> BitSet {
        read_bits(&*self.bytes, self.endianness, self.pos_b, self.width_b)
            .unwrap_or_else(|_| BitSet::new(self.width_b))
    }

    pub fn value_u128(&self) -> Result<u128> {
        self.value().to_u128()
    }

    /// Write a pattern of exactly `width_b` bits.
    pub fn set_value(&mut self, bits: &BitSet) -> Result<()> {
        check_pattern_width(self.width_b, bits.width())?;
        write_bits(self.bytes, self.endianness, self.pos_b, bits)
    }

    /// Write `value`, which must fit in `width_b` bits.
    pub fn set_value_u128(&mut self, value: u128) -> Result<()> {
        let bits = BitSet::from_u128(self.width_b, value)?;
        write_bits(self.bytes, self.endianness, self.pos_b, &bits)
    }
}

fn check_bit_range(size_b: usize, pos_b: usize, width_b: usize) -> Result<()> {
    if width_b == 0 || pos_b.checked_add(width_b).is_none_or(|end| end > size_b * 8) {
        return Err(FrameError::OutOfRange(format!(
            "bit field [{pos_b}, {pos_b}+{width_b}) outside {}-bit field",
            size_b * 8
        )));
    }
    Ok(())
}

fn check_pattern_width(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FrameError::OutOfRange(format!(
            "bit pattern of width {actual} written to {expected}-bit field"
        )));
    }
    Ok(())
}

fn resolve_bit_field(
    layout: Option<(&str, &FieldLayout)>,
    offset_b: usize,
    size_b: usize,
    bit_field: &str,
) -> Result<(usize, usize)> {
    let not_found = |field: String| FrameError::BitFieldNotFound {
        field,
        bit_field: bit_field.to_string(),
    };
    match layout {
        Some((name, layout)) => layout
            .bit_field(bit_field)
            .map(|bits| (bits.pos_b, bits.width_b))
            .ok_or_else(|| not_found(name.to_string())),
        None => Err(not_found(format!("@{offset_b}+{size_b}"))),
    }
}

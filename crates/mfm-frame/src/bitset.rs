//! Fixed-width bit sequences and bit-range access over field bytes.
//!
//! Bit 0 is always the least significant bit of the field value, whatever
//! the byte order the field is stored in.

use std::fmt;
use std::str::FromStr;

use crate::binio::Endianness;
use crate::error::{FrameError, Result};

/// An owned sequence of `width` bits.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    width: usize,
    // Little-endian storage; bits at or above `width` stay zero.
    bytes: Vec<u8>,
}

impl BitSet {
    /// All-zero bit set of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            bytes: vec![0u8; width.div_ceil(8)],
        }
    }

    /// Bit set holding `value`, which must fit within `width` bits.
    pub fn from_u128(width: usize, value: u128) -> Result<Self> {
        let significant = 128 - value.leading_zeros() as usize;
        if significant > width {
            return Err(FrameError::OutOfRange(format!(
                "value {value:#x} does not fit in {width} bits"
            )));
        }
        let mut bits = Self::new(width);
        for (index, byte) in bits.bytes.iter_mut().enumerate().take(16) {
            *byte = (value >> (index * 8)) as u8;
        }
        Ok(bits)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Value of bit `index`.
    pub fn bit(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.get_unchecked(index))
    }

    /// Set bit `index` to `value`.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<()> {
        self.check_index(index)?;
        self.set_unchecked(index, value);
        Ok(())
    }

    /// Numeric value of the bits; fails if a bit above 127 is set.
    pub fn to_u128(&self) -> Result<u128> {
        if self.bytes.iter().skip(16).any(|byte| *byte != 0) {
            return Err(FrameError::OutOfRange(format!(
                "{}-bit value does not fit in 128 bits",
                self.width
            )));
        }
        Ok(self
            .bytes
            .iter()
            .take(16)
            .enumerate()
            .fold(0u128, |acc, (index, byte)| acc | (u128::from(*byte) << (index * 8))))
    }

    /// Copy of the bits in `[pos, pos + width)`.
    pub fn extract(&self, pos: usize, width: usize) -> Result<BitSet> {
        check_range(self.width, pos, width)?;
        let mut out = BitSet::new(width);
        for index in 0..width {
            out.set_unchecked(index, self.get_unchecked(pos + index));
        }
        Ok(out)
    }

    /// Overwrite the bits in `[pos, pos + bits.width())` with `bits`.
    pub fn insert(&mut self, pos: usize, bits: &BitSet) -> Result<()> {
        check_range(self.width, pos, bits.width)?;
        for index in 0..bits.width {
            self.set_unchecked(pos + index, bits.get_unchecked(index));
        }
        Ok(())
    }

    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|byte| *byte == 0)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.width {
            return Err(FrameError::OutOfRange(format!(
                "bit {index} outside {}-bit set",
                self.width
            )));
        }
        Ok(())
    }

    fn get_unchecked(&self, index: usize) -> bool {
        (self.bytes[index / 8] >> (index % 8)) & 1 == 1
    }

    fn set_unchecked(&mut self, index: usize, value: bool) {
        let mask = 1u8 << (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }
}

impl fmt::Display for BitSet {
    /// Most significant bit first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in (0..self.width).rev() {
            f.write_str(if self.get_unchecked(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitSet({}, \"{self}\")", self.width)
    }
}

impl FromStr for BitSet {
    type Err = FrameError;

    /// Parse a most-significant-bit-first string of `0` and `1`.
    fn from_str(s: &str) -> Result<Self> {
        let width = s.len();
        let mut bits = BitSet::new(width);
        for (offset, ch) in s.chars().enumerate() {
            let index = width - 1 - offset;
            match ch {
                '0' => {}
                '1' => bits.set_unchecked(index, true),
                other => {
                    return Err(FrameError::OutOfRange(format!(
                        "invalid bit character '{other}'"
                    )))
                }
            }
        }
        Ok(bits)
    }
}

fn check_range(total: usize, pos: usize, width: usize) -> Result<()> {
    if width == 0 || pos.checked_add(width).is_none_or(|end| end > total) {
        return Err(FrameError::OutOfRange(format!(
            "bit range [{pos}, {pos}+{width}) outside {total}-bit field"
        )));
    }
    Ok(())
}

fn field_bit(bytes: &[u8], endianness: Endianness, index: usize) -> bool {
    let byte = bytes[endianness.byte_index(bytes.len(), index / 8)];
    (byte >> (index % 8)) & 1 == 1
}

fn set_field_bit(bytes: &mut [u8], endianness: Endianness, index: usize, value: bool) {
    let at = endianness.byte_index(bytes.len(), index / 8);
    let mask = 1u8 << (index % 8);
    if value {
        bytes[at] |= mask;
    } else {
        bytes[at] &= !mask;
    }
}

/// Read `width` bits starting at bit `pos` of the integer stored in `bytes`.
pub fn read_bits(bytes: &[u8], endianness: Endianness, pos: usize, width: usize) -> Result<BitSet> {
    check_range(bytes.len() * 8, pos, width)?;
    let mut out = BitSet::new(width);
    for index in 0..width {
        out.set_unchecked(index, field_bit(bytes, endianness, pos + index));
    }
    Ok(out)
}

/// Write `bits` starting at bit `pos` of the integer stored in `bytes`.
pub fn write_bits(
    bytes: &mut [u8],
    endianness: Endianness,
    pos: usize,
    bits: &BitSet,
) -> Result<()> {
    check_range(bytes.len() * 8, pos, bits.width)?;
    for index in 0..bits.width {
        set_field_bit(bytes, endianness, pos + index, bits.get_unchecked(index));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u128_and_back() {
        let bits = BitSet::from_u128(12, 0xABC).unwrap();
        assert_eq!(bits.width(), 12);
        assert_eq!(bits.to_u128().unwrap(), 0xABC);
        assert_eq!(bits.to_string(), "101010111100");
    }

    #[test]
    fn test_from_u128_rejects_overflow() {
        assert!(matches!(
            BitSet::from_u128(4, 0x10),
            Err(FrameError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_parse_msb_first() {
        let bits: BitSet = "0101".parse().unwrap();
        assert_eq!(bits.to_u128().unwrap(), 5);
        assert!(bits.bit(0).unwrap());
        assert!(!bits.bit(1).unwrap());
        assert!("01x1".parse::<BitSet>().is_err());
    }

    #[test]
    fn test_bit_out_of_range() {
        let mut bits = BitSet::new(3);
        assert!(bits.bit(3).is_err());
        assert!(bits.set_bit(3, true).is_err());
    }

    #[test]
    fn test_to_u128_on_wide_set() {
        let mut bits = BitSet::new(200);
        bits.set_bit(127, true).unwrap();
        assert_eq!(bits.to_u128().unwrap(), 1u128 << 127);
        bits.set_bit(128, true).unwrap();
        assert!(bits.to_u128().is_err());
    }

    #[test]
    fn test_extract_and_insert() {
        let mut bits = BitSet::new(16);
        let nibble: BitSet = "1011".parse().unwrap();
        bits.insert(5, &nibble).unwrap();
        assert_eq!(bits.to_u128().unwrap(), 0b1011 << 5);
        assert_eq!(bits.extract(5, 4).unwrap(), nibble);
        assert!(bits.insert(14, &nibble).is_err());
        assert!(bits.extract(0, 0).is_err());
    }

    #[test]
    fn test_read_bits_honours_field_byte_order() {
        // Value 0x1234 stored in both byte orders.
        let big = [0x12, 0x34];
        let little = [0x34, 0x12];
        let a = read_bits(&big, Endianness::Big, 4, 8).unwrap();
        let b = read_bits(&little, Endianness::Little, 4, 8).unwrap();
        assert_eq!(a.to_u128().unwrap(), 0x23);
        assert_eq!(a, b);
    }

    #[test]
    fn test_write_bits_in_wide_field() {
        let mut field = [0u8; 9];
        let bits = BitSet::from_u128(3, 0b101).unwrap();
        write_bits(&mut field, Endianness::Big, 69, &bits).unwrap();
        assert_eq!(field[0], 0b1010_0000);
        assert!(field[1..].iter().all(|byte| *byte == 0));

        let err = write_bits(&mut field, Endianness::Big, 70, &bits).unwrap_err();
        assert!(matches!(err, FrameError::OutOfRange(_)));
    }

    #[test]
    fn test_count_ones_and_zero() {
        let bits: BitSet = "1000_0001".replace('_', "").parse().unwrap();
        assert_eq!(bits.count_ones(), 2);
        assert!(!bits.is_zero());
        assert!(BitSet::new(9).is_zero());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_set_then_get_returns_pattern(
                width in 1usize..=128,
                pos in 0usize..8,
                raw in any::<u128>(),
                little in any::<bool>(),
            ) {
                let endianness = if little { Endianness::Little } else { Endianness::Big };
                let value = if width == 128 { raw } else { raw & ((1u128 << width) - 1) };
                let pattern = BitSet::from_u128(width, value).unwrap();
                let mut field = vec![0xA5u8; (pos + width).div_ceil(8) + 1];

                write_bits(&mut field, endianness, pos, &pattern).unwrap();
                let back = read_bits(&field, endianness, pos, width).unwrap();
                prop_assert_eq!(back.to_u128().unwrap(), value);
            }

            #[test]
            fn prop_write_leaves_other_bits_alone(
                width in 1usize..=32,
                pos in 0usize..32,
                raw in any::<u64>(),
            ) {
                let field_before = raw.to_be_bytes();
                let mut field = field_before;
                let pattern = BitSet::new(width);
                write_bits(&mut field, Endianness::Big, pos, &pattern).unwrap();

                for index in (0..64).filter(|i| *i < pos || *i >= pos + width) {
                    prop_assert_eq!(
                        field_bit(&field, Endianness::Big, index),
                        field_bit(&field_before, Endianness::Big, index)
                    );
                }
            }
        }
    }
}

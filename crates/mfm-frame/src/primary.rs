use std::io::{Read, Write};

use crate::binio::{decode_slice, encode_slice, fill_from, Endianness};
use crate::error::{FrameError, Result};
use crate::format::FrameFormat;

/// Size of the primary header present at the start of every frame.
pub const PRIMARY_HEADER_SIZE: usize = 8;

/// Largest frame size expressible in the 24-bit block count.
pub const MAX_FRAME_SIZE_BLK: u32 = 0x00FF_FFFF;

/// Largest block size exponent (`blkSize_B = 2^15`).
pub const MAX_BLK_SIZE_EXPONENT: u8 = 15;

const LITTLE_ENDIAN_FLAG: u8 = 0x80;
const BLOB_FLAG: u8 = 0x40;
const RESERVED_BITS: u8 = 0x30;
const BLK_EXPONENT_MASK: u8 = 0x0F;

/// The fixed 8-byte header opening every frame.
///
/// Wire layout:
/// ```text
/// ┌──────────┬────────────────┬────────────┬───────────┬──────────┐
/// │ metaType │ frameSize_blk  │ dataSource │ frameType │ revision │
/// │ (1B)     │ (3B)           │ (1B)       │ (2B)      │ (1B)     │
/// └──────────┴────────────────┴────────────┴───────────┴──────────┘
/// metaType: bit 7 little endian, bit 6 blob, bits 0-3 log2(blkSize_B)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimaryHeader {
    endianness: Endianness,
    blob: bool,
    blk_size_exponent: u8,
    frame_size_blk: u32,
    data_source: u8,
    frame_type: u16,
    revision: u8,
}

impl Default for PrimaryHeader {
    fn default() -> Self {
        Self {
            endianness: Endianness::Big,
            blob: true,
            blk_size_exponent: 0,
            frame_size_blk: PRIMARY_HEADER_SIZE as u32,
            data_source: 0,
            frame_type: 0,
            revision: 0,
        }
    }
}

impl PrimaryHeader {
    /// Read exactly [`PRIMARY_HEADER_SIZE`] bytes from `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; PRIMARY_HEADER_SIZE];
        let filled = fill_from(reader, &mut buf)?;
        if filled < PRIMARY_HEADER_SIZE {
            return Err(FrameError::IncompleteFrame {
                needed: PRIMARY_HEADER_SIZE as u64,
                available: filled as u64,
            });
        }
        Self::decode_slice(&buf)
    }

    /// Decode from the first [`PRIMARY_HEADER_SIZE`] bytes of `bytes`.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PRIMARY_HEADER_SIZE {
            return Err(FrameError::IncompleteFrame {
                needed: PRIMARY_HEADER_SIZE as u64,
                available: bytes.len() as u64,
            });
        }

        let meta_type = bytes[0];
        if meta_type & RESERVED_BITS != 0 {
            return Err(FrameError::MalformedHeader(format!(
                "reserved metaType bits set ({meta_type:#04x})"
            )));
        }
        let endianness = if meta_type & LITTLE_ENDIAN_FLAG != 0 {
            Endianness::Little
        } else {
            Endianness::Big
        };

        Ok(Self {
            endianness,
            blob: meta_type & BLOB_FLAG != 0,
            blk_size_exponent: meta_type & BLK_EXPONENT_MASK,
            frame_size_blk: decode_slice(&bytes[1..4], endianness),
            data_source: bytes[4],
            frame_type: decode_slice(&bytes[5..7], endianness),
            revision: bytes[7],
        })
    }

    pub fn to_bytes(&self) -> [u8; PRIMARY_HEADER_SIZE] {
        let mut out = [0u8; PRIMARY_HEADER_SIZE];
        self.encode_into(&mut out);
        out
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Write the header over the first eight bytes of `out`.
    pub(crate) fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.meta_type();
        encode_slice(self.frame_size_blk, &mut out[1..4], self.endianness);
        out[4] = self.data_source;
        encode_slice(self.frame_type, &mut out[5..7], self.endianness);
        out[7] = self.revision;
    }

    /// Header describing a frame of `format` that holds nothing but its header.
    pub fn from_format(format: &FrameFormat) -> Result<Self> {
        let mut header = Self {
            endianness: format.endianness(),
            blob: format.is_blob(),
            blk_size_exponent: blk_size_exponent(format.blk_size_b())?,
            frame_size_blk: 0,
            data_source: 0,
            frame_type: format.frame_type(),
            revision: format.revision(),
        };
        header.set_frame_size_b(format.header_size_b())?;
        Ok(header)
    }

    pub fn meta_type(&self) -> u8 {
        let mut meta_type = self.blk_size_exponent & BLK_EXPONENT_MASK;
        if self.endianness.is_little() {
            meta_type |= LITTLE_ENDIAN_FLAG;
        }
        if self.blob {
            meta_type |= BLOB_FLAG;
        }
        meta_type
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn is_blob(&self) -> bool {
        self.blob
    }

    pub fn blk_size_b(&self) -> u32 {
        1u32 << self.blk_size_exponent
    }

    pub fn frame_size_blk(&self) -> u32 {
        self.frame_size_blk
    }

    pub fn frame_size_b(&self) -> u64 {
        u64::from(self.frame_size_blk) * u64::from(self.blk_size_b())
    }

    pub fn data_source(&self) -> u8 {
        self.data_source
    }

    pub fn frame_type(&self) -> u16 {
        self.frame_type
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn set_blob(&mut self, blob: bool) {
        self.blob = blob;
    }

    /// Change the block unit; the block count is kept as is.
    pub fn set_blk_size_b(&mut self, blk_size_b: u32) -> Result<()> {
        self.blk_size_exponent = blk_size_exponent(blk_size_b)?;
        Ok(())
    }

    pub fn set_frame_size_blk(&mut self, frame_size_blk: u32) -> Result<()> {
        if frame_size_blk > MAX_FRAME_SIZE_BLK {
            return Err(FrameError::OutOfRange(format!(
                "frame size of {frame_size_blk} blocks exceeds {MAX_FRAME_SIZE_BLK}"
            )));
        }
        self.frame_size_blk = frame_size_blk;
        Ok(())
    }

    /// Set the frame size, rounded up to whole blocks.
    pub fn set_frame_size_b(&mut self, frame_size_b: u64) -> Result<()> {
        self.frame_size_blk = blocks_for(frame_size_b, self.blk_size_b())?;
        Ok(())
    }

    pub fn set_data_source(&mut self, data_source: u8) {
        self.data_source = data_source;
    }

    pub fn set_frame_type(&mut self, frame_type: u16) {
        self.frame_type = frame_type;
    }

    pub fn set_revision(&mut self, revision: u8) {
        self.revision = revision;
    }
}

/// Exponent of a block size; block sizes are powers of two up to 2^15.
pub fn blk_size_exponent(blk_size_b: u32) -> Result<u8> {
    if !blk_size_b.is_power_of_two()
        || blk_size_b.trailing_zeros() > u32::from(MAX_BLK_SIZE_EXPONENT)
    {
        return Err(FrameError::OutOfRange(format!(
            "block size {blk_size_b} is not a power of two up to {}",
            1u32 << MAX_BLK_SIZE_EXPONENT
        )));
    }
    Ok(blk_size_b.trailing_zeros() as u8)
}

/// Smallest block size whose 24-bit block count can represent `frame_size_b`.
pub fn minimal_blk_size_b(frame_size_b: u64) -> Result<u32> {
    (0..=MAX_BLK_SIZE_EXPONENT)
        .map(|exponent| 1u32 << exponent)
        .find(|blk| frame_size_b.div_ceil(u64::from(*blk)) <= u64::from(MAX_FRAME_SIZE_BLK))
        .ok_or_else(|| {
            FrameError::OutOfRange(format!(
                "no block size can represent a frame of {frame_size_b} bytes"
            ))
        })
}

/// Number of `blk_size_b` blocks needed to hold `size_b` bytes.
pub(crate) fn blocks_for(size_b: u64, blk_size_b: u32) -> Result<u32> {
    let blocks = size_b.div_ceil(u64::from(blk_size_b));
    if blocks > u64::from(MAX_FRAME_SIZE_BLK) {
        return Err(FrameError::OutOfRange(format!(
            "{size_b} bytes need {blocks} blocks of {blk_size_b} bytes (max {MAX_FRAME_SIZE_BLK})"
        )));
    }
    Ok(blocks as u32)
}

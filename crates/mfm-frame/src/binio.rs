//! Endianness-aware integer encoding over byte streams and byte slices.
//!
//! The on-wire width of a value is independent from the width of the Rust
//! word holding it: narrower wire values are extended (zero or sign), wider
//! ones keep their least significant bytes.

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};

/// Byte order of every multi-byte value within one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

impl Endianness {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    pub fn is_little(self) -> bool {
        self == Endianness::Little
    }

    /// Index within an `n`-byte wire value of the byte with the given significance.
    pub(crate) fn byte_index(self, n: usize, significance: usize) -> usize {
        match self {
            Endianness::Little => significance,
            Endianness::Big => n - 1 - significance,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Big => f.write_str("big-endian"),
            Endianness::Little => f.write_str("little-endian"),
        }
    }
}

const MAX_WORD_SIZE: usize = 16;

/// Integer types that can be moved to and from the wire.
pub trait Word: Copy {
    const SIZE: usize;
    const SIGNED: bool;

    fn write_le(self, out: &mut [u8; MAX_WORD_SIZE]);
    fn read_le(buf: &[u8; MAX_WORD_SIZE]) -> Self;
    fn is_negative(self) -> bool;
}

macro_rules! impl_word {
    ($($ty:ty => $signed:expr),* $(,)?) => {$(
        impl Word for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            const SIGNED: bool = $signed;

            fn write_le(self, out: &mut [u8; MAX_WORD_SIZE]) {
                out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(buf: &[u8; MAX_WORD_SIZE]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                bytes.copy_from_slice(&buf[..Self::SIZE]);
                <$ty>::from_le_bytes(bytes)
            }

            #[allow(unused_comparisons)]
            fn is_negative(self) -> bool {
                self < 0
            }
        }
    )*};
}

impl_word!(
    u8 => false, u16 => false, u32 => false, u64 => false, u128 => false,
    i8 => true, i16 => true, i32 => true, i64 => true, i128 => true,
);

/// Interpret `bytes` as one integer in the given byte order.
pub fn decode_slice<W: Word>(bytes: &[u8], endianness: Endianness) -> W {
    let n = bytes.len();
    let most_significant = match endianness {
        Endianness::Big => bytes.first(),
        Endianness::Little => bytes.last(),
    };
    let fill = match most_significant {
        Some(byte) if W::SIGNED && byte & 0x80 != 0 => 0xFF,
        _ => 0x00,
    };

    let mut le = [0u8; MAX_WORD_SIZE];
    for (significance, slot) in le.iter_mut().take(W::SIZE).enumerate() {
        *slot = if significance < n {
            bytes[endianness.byte_index(n, significance)]
        } else {
            fill
        };
    }
    W::read_le(&le)
}

/// Store `value` into all of `out` in the given byte order.
pub fn encode_slice<W: Word>(value: W, out: &mut [u8], endianness: Endianness) {
    let mut le = [0u8; MAX_WORD_SIZE];
    value.write_le(&mut le);
    let fill = if value.is_negative() { 0xFF } else { 0x00 };

    let n = out.len();
    for significance in 0..n {
        out[endianness.byte_index(n, significance)] = if significance < W::SIZE {
            le[significance]
        } else {
            fill
        };
    }
}

/// Read exactly `n_bytes` from `reader` and decode them as one word.
pub fn decode<W: Word, R: Read>(
    reader: &mut R,
    n_bytes: usize,
    endianness: Endianness,
) -> io::Result<W> {
    let mut stack = [0u8; MAX_WORD_SIZE];
    let mut heap;
    let buf: &mut [u8] = if n_bytes <= MAX_WORD_SIZE {
        &mut stack[..n_bytes]
    } else {
        heap = vec![0u8; n_bytes];
        &mut heap
    };
    reader.read_exact(buf)?;
    Ok(decode_slice(buf, endianness))
}

/// Encode `value` over exactly `n_bytes` and write them to `writer`.
pub fn encode<W: Word, T: Write>(
    writer: &mut T,
    value: W,
    n_bytes: usize,
    endianness: Endianness,
) -> io::Result<()> {
    let mut stack = [0u8; MAX_WORD_SIZE];
    let mut heap;
    let buf: &mut [u8] = if n_bytes <= MAX_WORD_SIZE {
        &mut stack[..n_bytes]
    } else {
        heap = vec![0u8; n_bytes];
        &mut heap
    };
    encode_slice(value, buf, endianness);
    writer.write_all(buf)
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
///
/// Returns the number of bytes actually stored.
pub(crate) fn fill_from<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

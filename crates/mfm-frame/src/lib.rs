//! Binary codec for MFM (MultiFrame) detector readout frames.
//!
//! Every frame opens with an 8-byte primary header carrying its byte order,
//! block size, size in blocks, data source, type and revision. What follows
//! depends on the header kind:
//! - blob frames carry an opaque payload;
//! - basic frames carry a standard header and `itemCount` fixed-size items;
//! - layered frames carry a standard header and a sequence of embedded frames.
//!
//! Named header and item fields are resolved through a [`FrameFormat`],
//! usually looked up in a format dictionary through [`FormatLookup`].

pub mod binio;
pub mod bitset;
pub mod builder;
pub mod error;
pub mod field;
pub mod format;
pub mod frame;
pub mod header;
pub mod primary;
pub mod reader;
pub mod writer;

pub use binio::{Endianness, Word};
pub use bitset::BitSet;
pub use builder::{
    decode_frame, BuildState, FrameBuilder, FrameConfig, FrameProcessor, DEFAULT_MAX_FRAME_SIZE,
};
pub use error::{FrameError, Result};
pub use field::{BitField, BitFieldMut, Field, FieldMut};
pub use format::{
    BitFieldLayout, FieldLayout, FormatLookup, FrameFormat, FrameFormatBuilder, FrameKind,
};
pub use frame::{Frame, FrameView, Item, ItemMut, Items, SubFrames};
pub use header::{BlobHeader, Header, StandardHeader, STANDARD_HEADER_MIN_SIZE};
pub use primary::{
    minimal_blk_size_b, PrimaryHeader, MAX_BLK_SIZE_EXPONENT, MAX_FRAME_SIZE_BLK,
    PRIMARY_HEADER_SIZE,
};
pub use reader::{FrameReader, WithOffsets};
pub use writer::FrameWriter;

//! Reading, writing and merging of MFM (MultiFrame) detector readout frames.
//!
//! # Crate Structure
//!
//! - [`frame`]: binary frame codec, streaming builder, reader and writer
//! - [`dictionary`]: frame formats loaded from JSON descriptions
//! - [`merge`]: grouping of frames by event index into layered frames

/// Re-export frame codec types.
pub mod frame {
    pub use mfm_frame::*;
}

/// Re-export format dictionary types.
pub mod dictionary {
    pub use mfm_dictionary::*;
}

pub mod merge;

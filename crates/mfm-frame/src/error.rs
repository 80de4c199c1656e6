use crate::format::FrameKind;

/// Errors that can occur while decoding, encoding or mutating frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes are available than the frame declares.
    ///
    /// Streaming callers treat this as "wait for more input".
    #[error("incomplete frame ({available} of {needed} bytes available)")]
    IncompleteFrame { needed: u64, available: u64 },

    /// The header bytes cannot describe a valid frame.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    /// The requested item index is beyond the frame's item count.
    #[error("item {index} not found (frame holds {count} items)")]
    ItemNotFound { index: u64, count: u64 },

    /// A named field is not declared by the frame format.
    #[error("field '{0}' not found")]
    FieldNotFound(String),

    /// A named bit field is not declared within its field.
    #[error("bit field '{bit_field}' not found in field '{field}'")]
    BitFieldNotFound { field: String, bit_field: String },

    /// No format is registered for the frame type.
    #[error("no format registered for frame type {frame_type:#06x}")]
    FormatNotFound { frame_type: u16 },

    /// The frame type is known but not with this revision.
    #[error("no revision {revision} registered for frame type {frame_type:#06x}")]
    FormatRevisionNotFound { frame_type: u16, revision: u8 },

    /// A value, width, size or position is outside its valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The operation does not apply to this kind of frame.
    #[error("unsupported operation '{operation}' on {kind} frame")]
    UnsupportedOperation {
        operation: &'static str,
        kind: FrameKind,
    },

    /// A frame format description is internally inconsistent.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly, or refused to accept more bytes.
    #[error("stream closed")]
    StreamClosed,
}

impl FrameError {
    /// True when the error only means more input is required.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::IncompleteFrame { .. })
    }

    pub(crate) fn unsupported(operation: &'static str, kind: FrameKind) -> Self {
        FrameError::UnsupportedOperation { operation, kind }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;


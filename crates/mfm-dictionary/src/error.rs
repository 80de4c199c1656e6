use mfm_frame::FrameError;

/// Errors that can occur while building or loading a format dictionary.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// A description file could not be loaded.
    #[error("failed to load formats: {0}")]
    LoadFailed(String),

    /// A description is not valid JSON, or does not match the description layout.
    #[error("invalid format description: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A described format is internally inconsistent.
    #[error("invalid format '{name}' revision {revision}: {source}")]
    InvalidFormat {
        name: String,
        revision: u8,
        #[source]
        source: FrameError,
    },

    /// The (type, revision) pair is already registered.
    #[error("format for frame type {frame_type:#06x} revision {revision} already registered")]
    DuplicateFormat { frame_type: u16, revision: u8 },
}

pub type Result<T> = std::result::Result<T, DictionaryError>;

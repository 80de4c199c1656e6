use std::fmt;
use std::io;

use mfm::dictionary::DictionaryError;
use mfm::frame::FrameError;
use mfm::merge::MergeError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::IncompleteFrame { .. }
        | FrameError::MalformedHeader(_)
        | FrameError::FrameTooLarge { .. }
        | FrameError::FormatNotFound { .. }
        | FrameError::FormatRevisionNotFound { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::StreamClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn dictionary_error(context: &str, err: DictionaryError) -> CliError {
    match err {
        DictionaryError::LoadFailed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn merge_error(err: MergeError) -> CliError {
    match err {
        MergeError::Io { path, source } => io_error(&path.display().to_string(), source),
        MergeError::Frame { path, source } => frame_error(&path.display().to_string(), source),
        MergeError::Layered { .. } => CliError::new(DATA_INVALID, err.to_string()),
    }
}

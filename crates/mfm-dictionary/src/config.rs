/// Controls how a format dictionary accepts and loads formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryConfig {
    /// When true, registering an existing (type, revision) pair returns
    /// `DictionaryError::DuplicateFormat` instead of keeping the first one.
    pub fail_on_duplicate: bool,
    /// Maximum number of description files loaded from a directory.
    pub max_formats_from_directory: usize,
    /// Maximum bytes allowed per description file.
    pub max_format_file_size: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            fail_on_duplicate: false,
            max_formats_from_directory: 256,
            max_format_file_size: 256 * 1024,
        }
    }
}

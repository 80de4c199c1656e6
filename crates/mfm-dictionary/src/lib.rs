//! Registry of MFM frame formats.
//!
//! Formats are described in `*.formats.json` files and registered under their
//! (frame type, revision) pair. The builtin GET formats ship with the crate:
//!
//! ```
//! use mfm_dictionary::FormatDictionary;
//!
//! let dictionary = FormatDictionary::builtin().unwrap();
//! let cobo = dictionary.find_latest_format(1).unwrap();
//! assert_eq!(cobo.name(), "CoBo");
//! ```

pub mod config;
pub mod description;
pub mod error;
pub mod registry;

pub use config::DictionaryConfig;
pub use description::{
    BitFieldDescription, ByteOrder, FieldDescription, FormatDescription, FormatsDescription,
    RevisionDescription,
};
pub use error::{DictionaryError, Result};
pub use registry::FormatDictionary;

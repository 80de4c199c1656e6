use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use mfm_frame::{FormatLookup, FrameError, FrameFormat};
use tracing::debug;

use crate::config::DictionaryConfig;
use crate::description::FormatsDescription;
use crate::error::{DictionaryError, Result};

const FORMATS_FILE_SUFFIX: &str = ".formats.json";
const BUILTIN_FORMATS: &str = include_str!("../formats/get.formats.json");

/// Frame formats keyed by (frame type, revision).
#[derive(Debug, Clone, Default)]
pub struct FormatDictionary {
    formats: BTreeMap<(u16, u8), Arc<FrameFormat>>,
    config: DictionaryConfig,
}

impl FormatDictionary {
    /// Create an empty dictionary with default config.
    pub fn new() -> Self {
        Self::with_config(DictionaryConfig::default())
    }

    /// Create an empty dictionary with explicit config.
    pub fn with_config(config: DictionaryConfig) -> Self {
        Self {
            formats: BTreeMap::new(),
            config,
        }
    }

    /// Dictionary holding the builtin GET formats.
    pub fn builtin() -> Result<Self> {
        Self::with_builtin_formats(DictionaryConfig::default())
    }

    /// Dictionary holding the builtin GET formats, with explicit config.
    pub fn with_builtin_formats(config: DictionaryConfig) -> Result<Self> {
        let mut dictionary = Self::with_config(config);
        dictionary.add_formats_from_str(BUILTIN_FORMATS)?;
        Ok(dictionary)
    }

    /// Register `format`.
    ///
    /// Returns false, keeping the registered format, when the pair is already
    /// taken, unless the config asks for `DuplicateFormat` instead.
    pub fn add_format(&mut self, format: FrameFormat) -> Result<bool> {
        let key = (format.frame_type(), format.revision());
        if self.formats.contains_key(&key) {
            if self.config.fail_on_duplicate {
                return Err(DictionaryError::DuplicateFormat {
                    frame_type: key.0,
                    revision: key.1,
                });
            }
            debug!(
                frame_type = key.0,
                revision = key.1,
                name = format.name(),
                "ignoring duplicate format"
            );
            return Ok(false);
        }
        self.formats.insert(key, Arc::new(format));
        Ok(true)
    }

    /// Register every format of a JSON description; returns how many were new.
    pub fn add_formats_from_str(&mut self, json: &str) -> Result<usize> {
        let formats = FormatsDescription::parse(json)?.to_formats()?;
        let mut added = 0usize;
        for format in formats {
            if self.add_format(format)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Register every format of one description file.
    pub fn add_formats_from_file(&mut self, path: &Path) -> Result<usize> {
        let path_metadata = std::fs::symlink_metadata(path)
            .map_err(|err| DictionaryError::LoadFailed(format!("{}: {err}", path.display())))?;
        if path_metadata.file_type().is_symlink() {
            return Err(DictionaryError::LoadFailed(format!(
                "refusing to load formats symlink: {}",
                path.display()
            )));
        }
        if !path_metadata.file_type().is_file() {
            return Err(DictionaryError::LoadFailed(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let content = self.read_description(path, &path_metadata)?;
        let added = self.add_formats_from_str(&content)?;
        debug!(path = %path.display(), added, "loaded format descriptions");
        Ok(added)
    }

    /// Load every `*.formats.json` file of a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, DictionaryConfig::default())
    }

    /// Load every `*.formats.json` file of a directory, with explicit config.
    pub fn from_directory_with_config(path: &Path, config: DictionaryConfig) -> Result<Self> {
        let mut dictionary = Self::with_config(config);
        dictionary.add_formats_from_directory(path)?;
        Ok(dictionary)
    }

    /// Register every `*.formats.json` file of a directory, in file name order.
    pub fn add_formats_from_directory(&mut self, path: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(path)
            .map_err(|err| DictionaryError::LoadFailed(format!("{}: {err}", path.display())))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| DictionaryError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(FORMATS_FILE_SUFFIX) {
                continue;
            }
            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| DictionaryError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                return Err(DictionaryError::LoadFailed(format!(
                    "refusing to load formats symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }
            candidates.push((file_name, entry_path, path_metadata));
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        if candidates.len() > self.config.max_formats_from_directory {
            return Err(DictionaryError::LoadFailed(format!(
                "format file count exceeds configured max ({}): {}",
                self.config.max_formats_from_directory,
                candidates.len()
            )));
        }

        let mut added = 0usize;
        for (file_name, entry_path, path_metadata) in candidates {
            let content = self.read_description(&entry_path, &path_metadata)?;
            let count = self.add_formats_from_str(&content)?;
            debug!(file = %file_name, added = count, "loaded format descriptions");
            added += count;
        }
        Ok(added)
    }

    fn read_description(&self, path: &Path, path_metadata: &std::fs::Metadata) -> Result<String> {
        let file_name = path.display();
        let file = std::fs::File::open(path).map_err(|err| {
            DictionaryError::LoadFailed(format!("failed opening formats {file_name}: {err}"))
        })?;
        let opened_metadata = file
            .metadata()
            .map_err(|err| DictionaryError::LoadFailed(err.to_string()))?;

        #[cfg(unix)]
        {
            if !same_file_identity(path_metadata, &opened_metadata) {
                return Err(DictionaryError::LoadFailed(format!(
                    "formats file changed during load: {file_name}"
                )));
            }
        }
        #[cfg(not(unix))]
        let _ = path_metadata;

        let max_bytes = self.config.max_format_file_size;
        if opened_metadata.len() > max_bytes as u64 {
            return Err(DictionaryError::LoadFailed(format!(
                "formats file too large ({} bytes): {file_name}",
                opened_metadata.len()
            )));
        }

        let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
        let mut content = String::new();
        file.take(read_limit)
            .read_to_string(&mut content)
            .map_err(|err| {
                DictionaryError::LoadFailed(format!("failed reading formats {file_name}: {err}"))
            })?;
        if content.len() > max_bytes {
            return Err(DictionaryError::LoadFailed(format!(
                "formats file too large while reading: {file_name}"
            )));
        }
        Ok(content)
    }

    /// Format registered for exactly `(frame_type, revision)`.
    pub fn find_format(
        &self,
        frame_type: u16,
        revision: u8,
    ) -> mfm_frame::Result<Arc<FrameFormat>> {
        if let Some(format) = self.formats.get(&(frame_type, revision)) {
            return Ok(Arc::clone(format));
        }
        if self.has_frame_type(frame_type) {
            return Err(FrameError::FormatRevisionNotFound {
                frame_type,
                revision,
            });
        }
        Err(FrameError::FormatNotFound { frame_type })
    }

    /// Highest registered revision of `frame_type`.
    pub fn find_latest_format(&self, frame_type: u16) -> mfm_frame::Result<Arc<FrameFormat>> {
        self.formats
            .range((frame_type, u8::MIN)..=(frame_type, u8::MAX))
            .next_back()
            .map(|(_, format)| Arc::clone(format))
            .ok_or(FrameError::FormatNotFound { frame_type })
    }

    /// Highest registered revision of the format called `name`.
    pub fn find_format_by_name(&self, name: &str) -> Option<Arc<FrameFormat>> {
        self.formats
            .values()
            .filter(|format| format.name() == name)
            .max_by_key(|format| format.revision())
            .cloned()
    }

    pub fn has_frame_type(&self, frame_type: u16) -> bool {
        self.formats
            .range((frame_type, u8::MIN)..=(frame_type, u8::MAX))
            .next()
            .is_some()
    }

    /// Every registered format, sorted by (frame type, revision).
    pub fn formats(&self) -> Vec<Arc<FrameFormat>> {
        self.formats.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Get dictionary configuration.
    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }
}

impl FormatLookup for FormatDictionary {
    fn find_format(&self, frame_type: u16, revision: u8) -> mfm_frame::Result<Arc<FrameFormat>> {
        FormatDictionary::find_format(self, frame_type, revision)
    }

    fn find_latest_format(&self, frame_type: u16) -> mfm_frame::Result<Arc<FrameFormat>> {
        FormatDictionary::find_latest_format(self, frame_type)
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use mfm_frame::{Frame, FrameKind};

    use super::*;

    const EXTRA_FORMATS: &str = r#"{
        "formats": [{
            "name": "CoBo",
            "frame_type": 1,
            "revisions": [{
                "revision": 4,
                "blk_size_b": 64,
                "header_size_blk": 2,
                "item_size_b": 4,
                "header_fields": [{ "name": "eventIdx", "offset_b": 22, "size_b": 4 }]
            }]
        }, {
            "name": "RIBF",
            "frame_type": 48,
            "revisions": [{
                "revision": 0,
                "blk_size_b": 1,
                "header_size_blk": 24,
                "item_size_b": 8
            }]
        }]
    }"#;

    #[test]
    fn builtin_formats_are_registered() {
        let dictionary = FormatDictionary::builtin().unwrap();
        assert_eq!(dictionary.len(), 5);

        let cobo = dictionary.find_format(1, 5).unwrap();
        assert_eq!(cobo.header_size_b(), 128);
        assert_eq!(cobo.find_header_field("eventIdx").unwrap().offset_b, 22);
        assert_eq!(cobo.find_item_bit_field("", "buckIdx").unwrap().pos_b, 14);

        let full = dictionary.find_format(2, 5).unwrap();
        assert_eq!(full.item_size_b(), 2);

        let merged = dictionary.find_latest_format(0xFF01).unwrap();
        assert_eq!(merged.name(), "MergedByEventIdx");
        assert_eq!(merged.kind(), FrameKind::Layered);
        assert_eq!(merged.header_size_b(), 24);

        let by_time = dictionary.find_latest_format(0xFF02).unwrap();
        assert_eq!(by_time.find_header_field("eventTime").unwrap().size_b, 6);

        let blob = dictionary.find_format_by_name("BlobSample").unwrap();
        assert!(blob.is_blob());
        assert_eq!(blob.header_size_b() + u64::from(blob.item_size_b()), 64);
    }

    #[test]
    fn builtin_cobo_composes_item_bits() {
        let dictionary = FormatDictionary::builtin().unwrap();
        let mut frame = Frame::create(&dictionary.find_format(1, 5).unwrap()).unwrap();
        frame.add_item().unwrap();
        {
            let mut item = frame.item_at_mut(0).unwrap();
            let mut field = item.field_named_mut("").unwrap();
            for (name, value) in [
                ("sample", 0xFFF),
                ("buckIdx", 0xAA),
                ("chanIdx", 0x7F),
                ("agetIdx", 3),
            ] {
                field
                    .named_bit_field_mut(name)
                    .unwrap()
                    .set_value_u128(value)
                    .unwrap();
            }
        }
        assert_eq!(
            frame.item_at(0).unwrap().field(0, 4).unwrap().value::<u32>(),
            0xFFAA_8FFF
        );
        assert_eq!(frame.find_item_field("", 0).unwrap(), (128, 4));
    }

    #[test]
    fn lookup_errors_distinguish_type_and_revision() {
        let dictionary = FormatDictionary::builtin().unwrap();
        assert!(matches!(
            dictionary.find_format(1, 9),
            Err(FrameError::FormatRevisionNotFound {
                frame_type: 1,
                revision: 9
            })
        ));
        assert!(matches!(
            dictionary.find_format(0x1234, 0),
            Err(FrameError::FormatNotFound { frame_type: 0x1234 })
        ));
        assert!(matches!(
            dictionary.find_latest_format(0x1234),
            Err(FrameError::FormatNotFound { .. })
        ));
        assert!(dictionary.find_format_by_name("nope").is_none());
    }

    #[test]
    fn latest_revision_wins() {
        let mut dictionary = FormatDictionary::builtin().unwrap();
        assert_eq!(dictionary.add_formats_from_str(EXTRA_FORMATS).unwrap(), 2);
        assert_eq!(dictionary.find_latest_format(1).unwrap().revision(), 5);
        assert_eq!(dictionary.find_format_by_name("CoBo").unwrap().revision(), 5);
        assert_eq!(dictionary.find_format(1, 4).unwrap().revision(), 4);

        let keys: Vec<(u16, u8)> = dictionary
            .formats()
            .iter()
            .map(|f| (f.frame_type(), f.revision()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn duplicates_are_ignored_or_rejected() {
        let mut permissive = FormatDictionary::builtin().unwrap();
        assert_eq!(permissive.add_formats_from_str(EXTRA_FORMATS).unwrap(), 2);
        assert_eq!(permissive.add_formats_from_str(EXTRA_FORMATS).unwrap(), 0);
        assert_eq!(permissive.len(), 7);

        let config = DictionaryConfig {
            fail_on_duplicate: true,
            ..DictionaryConfig::default()
        };
        let mut strict = FormatDictionary::with_builtin_formats(config).unwrap();
        assert_eq!(strict.config(), &config);
        strict.add_formats_from_str(EXTRA_FORMATS).unwrap();
        assert!(matches!(
            strict.add_formats_from_str(EXTRA_FORMATS),
            Err(DictionaryError::DuplicateFormat {
                frame_type: 1,
                revision: 4
            })
        ));
    }

    #[test]
    fn invalid_json_is_reported() {
        let mut dictionary = FormatDictionary::new();
        assert!(dictionary.is_empty());
        assert!(matches!(
            dictionary.add_formats_from_str("not-json"),
            Err(DictionaryError::InvalidJson(_))
        ));
    }

    #[test]
    fn overflowing_layouts_are_invalid() {
        let item = |field: &str| {
            format!(
                r#"{{ "formats": [{{ "name": "Huge", "frame_type": 64, "revisions": [{{
                    "revision": 0, "blk_size_b": 1, "header_size_blk": 16, "item_size_b": 4,
                    "item_fields": [{field}] }}] }}] }}"#
            )
        };
        let far_field = item(&format!(
            r#"{{ "name": "far", "offset_b": {}, "size_b": 4 }}"#,
            u64::MAX
        ));
        let far_bits = item(&format!(
            r#"{{ "name": "", "offset_b": 0, "size_b": 4,
                "bit_fields": [{{ "name": "far", "pos_b": {}, "width_b": 2 }}] }}"#,
            u64::MAX
        ));

        for json in [far_field, far_bits] {
            let mut dictionary = FormatDictionary::new();
            assert!(matches!(
                dictionary.add_formats_from_str(&json),
                Err(DictionaryError::InvalidFormat {
                    revision: 0,
                    source: FrameError::InvalidFormat(_),
                    ..
                })
            ));
            assert!(dictionary.is_empty());
        }
    }

    #[test]
    fn binds_frames_through_lookup() {
        let dictionary = Arc::new(FormatDictionary::builtin().unwrap());
        let cobo = dictionary.find_format(1, 5).unwrap();
        let mut frame = Frame::create(&cobo).unwrap();
        frame.header_field_mut("eventIdx").unwrap().set_value(41u32);
        let bytes = frame.to_bytes();

        let read = Frame::read_with(&mut std::io::Cursor::new(bytes), &dictionary).unwrap();
        assert_eq!(read.header_field("eventIdx").unwrap().value::<u32>(), 41);
    }

    #[test]
    fn from_directory_loads_descriptions() {
        let dir = make_temp_formats_dir("from-directory");
        write_formats(&dir, "extra.formats.json", EXTRA_FORMATS);
        write_formats(&dir, "ignored.json", "not-json");

        let dictionary = FormatDictionary::from_directory(&dir).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert!(dictionary.find_format(48, 0).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn single_file_loads_on_top_of_builtin() {
        let dir = make_temp_formats_dir("single-file");
        let path = dir.join("extra.formats.json");
        std::fs::write(&path, EXTRA_FORMATS).unwrap();

        let mut dictionary = FormatDictionary::builtin().unwrap();
        assert_eq!(dictionary.add_formats_from_file(&path).unwrap(), 2);
        assert!(dictionary.add_formats_from_file(&dir).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_layout_in_directory_fails() {
        let dir = make_temp_formats_dir("invalid-layout");
        write_formats(
            &dir,
            "bad.formats.json",
            &EXTRA_FORMATS.replace("\"offset_b\": 22", "\"offset_b\": 126"),
        );

        let result = FormatDictionary::from_directory(&dir);
        assert!(matches!(
            result,
            Err(DictionaryError::InvalidFormat { revision: 4, .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn make_temp_formats_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mfm-dictionary-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_formats(dir: &Path, file_name: &str, contents: &str) {
        let path = dir.join(file_name);
        std::fs::write(path, contents.as_bytes()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_description_is_rejected() {
        let dir = make_temp_formats_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, EXTRA_FORMATS.as_bytes()).unwrap();
        let link = dir.join("extra.formats.json");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let result = FormatDictionary::from_directory(&dir);
        assert!(matches!(result, Err(DictionaryError::LoadFailed(_))));
        assert!(FormatDictionary::new().add_formats_from_file(&link).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_count_limit_is_enforced() {
        let dir = make_temp_formats_dir("count-limit");
        write_formats(&dir, "a.formats.json", EXTRA_FORMATS);
        write_formats(&dir, "b.formats.json", EXTRA_FORMATS);

        let config = DictionaryConfig {
            max_formats_from_directory: 1,
            ..DictionaryConfig::default()
        };
        let result = FormatDictionary::from_directory_with_config(&dir, config);
        assert!(matches!(result, Err(DictionaryError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_size_limit_is_enforced() {
        let dir = make_temp_formats_dir("size-limit");
        write_formats(&dir, "a.formats.json", EXTRA_FORMATS);

        let config = DictionaryConfig {
            max_format_file_size: 8,
            ..DictionaryConfig::default()
        };
        let result = FormatDictionary::from_directory_with_config(&dir, config);
        assert!(matches!(result, Err(DictionaryError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn same_file_identity_distinguishes_replaced_file() {
        let dir = make_temp_formats_dir("identity-check");
        let first = dir.join("first.json");
        let second = dir.join("second.json");
        std::fs::write(&first, EXTRA_FORMATS).unwrap();
        std::fs::write(&second, EXTRA_FORMATS).unwrap();

        let first_meta = std::fs::symlink_metadata(&first).unwrap();
        let opened_first_meta = std::fs::File::open(&first).unwrap().metadata().unwrap();
        let opened_second_meta = std::fs::File::open(&second).unwrap().metadata().unwrap();

        assert!(same_file_identity(&first_meta, &opened_first_meta));
        assert!(!same_file_identity(&first_meta, &opened_second_meta));

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! JSON descriptions of frame formats.
//!
//! ```json
//! { "formats": [ { "name": "CoBo", "frame_type": 1, "revisions": [
//!     { "revision": 5, "endianness": "big", "blk_size_b": 64,
//!       "header_size_blk": 2, "item_size_b": 4,
//!       "header_fields": [ { "name": "eventIdx", "offset_b": 22, "size_b": 4 } ],
//!       "item_fields": [ { "name": "", "offset_b": 0, "size_b": 4,
//!           "bit_fields": [ { "name": "sample", "pos_b": 0, "width_b": 12 } ] } ] }
//! ] } ] }
//! ```

use std::collections::BTreeSet;

use mfm_frame::{Endianness, FieldLayout, FrameError, FrameFormat};
use serde::{Deserialize, Serialize};

use crate::error::{DictionaryError, Result};

/// Top level of a `*.formats.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatsDescription {
    pub formats: Vec<FormatDescription>,
}

/// Every described revision of one frame type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatDescription {
    pub name: String,
    pub frame_type: u16,
    pub revisions: Vec<RevisionDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevisionDescription {
    pub revision: u8,
    #[serde(default)]
    pub blob: bool,
    #[serde(default)]
    pub endianness: ByteOrder,
    pub blk_size_b: u32,
    pub header_size_blk: u16,
    pub item_size_b: u16,
    #[serde(default)]
    pub header_fields: Vec<FieldDescription>,
    #[serde(default)]
    pub item_fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl From<ByteOrder> for Endianness {
    fn from(order: ByteOrder) -> Self {
        match order {
            ByteOrder::Big => Endianness::Big,
            ByteOrder::Little => Endianness::Little,
        }
    }
}

impl From<Endianness> for ByteOrder {
    fn from(endianness: Endianness) -> Self {
        match endianness {
            Endianness::Big => ByteOrder::Big,
            Endianness::Little => ByteOrder::Little,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescription {
    pub name: String,
    pub offset_b: usize,
    pub size_b: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bit_fields: Vec<BitFieldDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitFieldDescription {
    pub name: String,
    pub pos_b: usize,
    pub width_b: usize,
}

impl FormatsDescription {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build and validate every described revision.
    pub fn to_formats(&self) -> Result<Vec<FrameFormat>> {
        let mut formats = Vec::new();
        for format in &self.formats {
            for revision in &format.revisions {
                formats.push(revision.to_format(&format.name, format.frame_type)?);
            }
        }
        Ok(formats)
    }

    /// Describe `formats`, grouping revisions of the same type and name.
    pub fn from_formats<'a>(formats: impl IntoIterator<Item = &'a FrameFormat>) -> Self {
        let mut out: Vec<FormatDescription> = Vec::new();
        for format in formats {
            let revision = RevisionDescription::from_format(format);
            match out
                .iter_mut()
                .find(|d| d.frame_type == format.frame_type() && d.name == format.name())
            {
                Some(description) => description.revisions.push(revision),
                None => out.push(FormatDescription {
                    name: format.name().to_string(),
                    frame_type: format.frame_type(),
                    revisions: vec![revision],
                }),
            }
        }
        Self { formats: out }
    }
}

impl RevisionDescription {
    pub fn to_format(&self, name: &str, frame_type: u16) -> Result<FrameFormat> {
        let invalid = |source: FrameError| DictionaryError::InvalidFormat {
            name: name.to_string(),
            revision: self.revision,
            source,
        };

        let mut builder = FrameFormat::builder(name, frame_type, self.revision)
            .blob(self.blob)
            .endianness(self.endianness.into())
            .blk_size_b(self.blk_size_b)
            .header_size_blk(self.header_size_blk)
            .item_size_b(self.item_size_b);

        check_unique("header", &self.header_fields).map_err(invalid)?;
        check_unique("item", &self.item_fields).map_err(invalid)?;
        for field in &self.header_fields {
            builder = builder.header_field(field.name.clone(), field.to_layout());
        }
        for field in &self.item_fields {
            builder = builder.item_field(field.name.clone(), field.to_layout());
        }
        builder.build().map_err(invalid)
    }

    pub fn from_format(format: &FrameFormat) -> Self {
        Self {
            revision: format.revision(),
            blob: format.is_blob(),
            endianness: format.endianness().into(),
            blk_size_b: format.blk_size_b(),
            header_size_blk: format.header_size_blk(),
            item_size_b: format.item_size_b(),
            header_fields: describe_fields(format.header_fields()),
            item_fields: describe_fields(format.item_fields()),
        }
    }
}

impl FieldDescription {
    fn to_layout(&self) -> FieldLayout {
        self.bit_fields
            .iter()
            .fold(FieldLayout::new(self.offset_b, self.size_b), |layout, bits| {
                layout.with_bit_field(bits.name.clone(), bits.pos_b, bits.width_b)
            })
    }
}

fn describe_fields(fields: Vec<(&str, &FieldLayout)>) -> Vec<FieldDescription> {
    fields
        .into_iter()
        .map(|(name, layout)| FieldDescription {
            name: name.to_string(),
            offset_b: layout.offset_b,
            size_b: layout.size_b,
            bit_fields: layout
                .bit_fields()
                .into_iter()
                .map(|(name, bits)| BitFieldDescription {
                    name: name.to_string(),
                    pos_b: bits.pos_b,
                    width_b: bits.width_b,
                })
                .collect(),
        })
        .collect()
}

fn check_unique(scope: &str, fields: &[FieldDescription]) -> std::result::Result<(), FrameError> {
    let mut seen = BTreeSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(FrameError::InvalidFormat(format!(
                "duplicate {scope} field '{}'",
                field.name
            )));
        }
        let mut bits_seen = BTreeSet::new();
        for bits in &field.bit_fields {
            if !bits_seen.insert(bits.name.as_str()) {
                return Err(FrameError::InvalidFormat(format!(
                    "duplicate bit field '{}' in {scope} field '{}'",
                    bits.name, field.name
                )));
            }
        }
    }
    Ok(())
}

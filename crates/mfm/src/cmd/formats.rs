use mfm::dictionary::{FormatDictionary, FormatsDescription};
use serde::Serialize;

use crate::cmd::FormatsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{frame_type_hex, new_table, print_json, OutputFormat};

#[derive(Serialize, Debug)]
struct FormatRow {
    name: String,
    frame_type: u16,
    revision: u8,
    kind: String,
    endianness: String,
    blk_size: u32,
    header_size: u64,
    item_size: u16,
    header_fields: usize,
    item_fields: usize,
}

pub fn run(
    _args: FormatsArgs,
    format: OutputFormat,
    dictionary: &FormatDictionary,
) -> CliResult<i32> {
    match format {
        // The JSON listing is itself a loadable description file.
        OutputFormat::Json => {
            let formats = dictionary.formats();
            print_json(&FormatsDescription::from_formats(
                formats.iter().map(|format| &**format),
            ));
        }
        OutputFormat::Table => {
            let mut table = new_table([
                "NAME", "TYPE", "REV", "KIND", "ORDER", "BLK", "HEADER", "ITEM", "FIELDS",
            ]);
            for row in rows(dictionary) {
                table.add_row(vec![
                    row.name,
                    frame_type_hex(row.frame_type),
                    row.revision.to_string(),
                    row.kind,
                    row.endianness,
                    row.blk_size.to_string(),
                    row.header_size.to_string(),
                    row.item_size.to_string(),
                    format!("{}/{}", row.header_fields, row.item_fields),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows(dictionary) {
                println!(
                    "{} {} rev {}: {} {}, blk {} B, header {} B, item {} B",
                    frame_type_hex(row.frame_type),
                    row.name,
                    row.revision,
                    row.kind,
                    row.endianness,
                    row.blk_size,
                    row.header_size,
                    row.item_size
                );
            }
        }
    }
    Ok(SUCCESS)
}

fn rows(dictionary: &FormatDictionary) -> Vec<FormatRow> {
    dictionary
        .formats()
        .iter()
        .map(|format| FormatRow {
            name: format.name().to_string(),
            frame_type: format.frame_type(),
            revision: format.revision(),
            kind: format.kind().to_string(),
            endianness: format.endianness().to_string(),
            blk_size: format.blk_size_b(),
            header_size: format.header_size_b(),
            item_size: format.item_size_b(),
            header_fields: format.header_fields().len(),
            item_fields: format.item_fields().len(),
        })
        .collect()
}

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use mfm::dictionary::FormatDictionary;
use mfm::frame::FrameReader;
use serde::Serialize;

use crate::cmd::InfoArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{frame_type_hex, new_table, print_json, OutputFormat};

#[derive(Serialize, Debug, PartialEq, Eq)]
struct TypeTotals {
    frame_type: u16,
    revision: u8,
    format: Option<String>,
    frames: u64,
    bytes: u64,
}

#[derive(Serialize, Debug)]
struct InfoOutput {
    file: String,
    frames: u64,
    bytes: u64,
    types: Vec<TypeTotals>,
}

pub fn run(args: InfoArgs, format: OutputFormat, dictionary: &FormatDictionary) -> CliResult<i32> {
    let context = args.file.display().to_string();
    let file = File::open(&args.file).map_err(|err| io_error(&context, err))?;

    let mut totals: BTreeMap<(u16, u8), (u64, u64)> = BTreeMap::new();
    for frame in FrameReader::new(BufReader::new(file)) {
        let frame = frame.map_err(|err| frame_error(&context, err))?;
        let entry = totals
            .entry((frame.frame_type(), frame.revision()))
            .or_default();
        entry.0 += 1;
        entry.1 += frame.frame_size_b();
    }

    let out = summarize(context, &totals, dictionary);
    print_info(&out, format);
    Ok(SUCCESS)
}

fn summarize(
    file: String,
    totals: &BTreeMap<(u16, u8), (u64, u64)>,
    dictionary: &FormatDictionary,
) -> InfoOutput {
    let types: Vec<TypeTotals> = totals
        .iter()
        .map(|(&(frame_type, revision), &(frames, bytes))| TypeTotals {
            frame_type,
            revision,
            format: dictionary
                .find_format(frame_type, revision)
                .ok()
                .map(|format| format.name().to_string()),
            frames,
            bytes,
        })
        .collect();
    InfoOutput {
        file,
        frames: types.iter().map(|t| t.frames).sum(),
        bytes: types.iter().map(|t| t.bytes).sum(),
        types,
    }
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(["TYPE", "REV", "FORMAT", "FRAMES", "BYTES"]);
            for t in &out.types {
                table.add_row(vec![
                    frame_type_hex(t.frame_type),
                    t.revision.to_string(),
                    t.format.clone().unwrap_or_else(|| "-".to_string()),
                    t.frames.to_string(),
                    t.bytes.to_string(),
                ]);
            }
            println!("{table}");
            println!("{}: {} frames, {} bytes", out.file, out.frames, out.bytes);
        }
        OutputFormat::Pretty => {
            println!("File:    {}", out.file);
            println!("Frames:  {}", out.frames);
            println!("Bytes:   {}", out.bytes);
            for t in &out.types {
                println!(
                    "  {} rev {} ({}): {} frames, {} bytes",
                    frame_type_hex(t.frame_type),
                    t.revision,
                    t.format.as_deref().unwrap_or("unknown"),
                    t.frames,
                    t.bytes
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_name_known_formats() {
        let dictionary = FormatDictionary::builtin().unwrap();
        let mut totals = BTreeMap::new();
        totals.insert((1u16, 5u8), (3u64, 576u64));
        totals.insert((0x30, 0), (1, 40));

        let out = summarize("run.graw".to_string(), &totals, &dictionary);
        assert_eq!(out.frames, 4);
        assert_eq!(out.bytes, 616);
        assert_eq!(out.types[0].format.as_deref(), Some("CoBo"));
        assert_eq!(out.types[1].format, None);

        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"frame_type\":48"));
    }
}

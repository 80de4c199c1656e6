use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use mfm::dictionary::FormatDictionary;
use mfm::frame::{Frame, FrameBuilder, FrameError, FrameProcessor};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cmd::DumpArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{frame_type_hex, new_table, print_json, OutputFormat};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
enum FieldValue {
    Int(u64),
    Hex(String),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Hex(value) => f.write_str(value),
        }
    }
}

#[derive(Serialize, Debug)]
struct FrameSummary {
    offset: u64,
    frame_type: u16,
    revision: u8,
    format: Option<String>,
    kind: String,
    frame_size: u64,
    header_size: u64,
    data_size: u64,
    item_count: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, FieldValue>,
}

struct Summarizer<'a> {
    dictionary: &'a FormatDictionary,
    fields: &'a [String],
    limit: usize,
    offset: u64,
    summaries: Vec<FrameSummary>,
}

impl Summarizer<'_> {
    fn limit_reached(&self) -> bool {
        self.summaries.len() >= self.limit
    }
}

impl FrameProcessor for Summarizer<'_> {
    fn process_frame(&mut self, mut frame: Frame) -> mfm::frame::Result<()> {
        if !self.limit_reached() {
            let summary = summarize(&mut frame, self.offset, self.fields, self.dictionary);
            self.summaries.push(summary);
        }
        self.offset += frame.frame_size_b();
        Ok(())
    }
}

pub fn run(args: DumpArgs, format: OutputFormat, dictionary: &FormatDictionary) -> CliResult<i32> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let context = args.file.display().to_string();
    let mut file = File::open(&args.file).map_err(|err| io_error(&context, err))?;

    let mut builder = FrameBuilder::new(Summarizer {
        dictionary,
        fields: &args.fields,
        limit: args.count.unwrap_or(usize::MAX),
        offset: 0,
        summaries: Vec::new(),
    });

    let mut chunk = vec![0u8; args.chunk_size];
    loop {
        if builder.processor().limit_reached() {
            break;
        }
        let read = match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error(&context, err)),
        };
        builder
            .add_data_chunk(&chunk[..read])
            .map_err(|err| frame_error(&context, err))?;
    }

    let trailing = builder.buffered_len();
    let summarizer = builder.into_processor();
    print_summaries(&summarizer.summaries, format);

    if !summarizer.limit_reached() && trailing > 0 {
        warn!(trailing, "file ends inside a frame");
        return Err(CliError::new(
            DATA_INVALID,
            format!("{context}: {trailing} trailing bytes do not form a complete frame"),
        ));
    }
    debug!(frames = summarizer.summaries.len(), "dump complete");
    Ok(SUCCESS)
}

fn summarize(
    frame: &mut Frame,
    offset: u64,
    fields: &[String],
    dictionary: &FormatDictionary,
) -> FrameSummary {
    if let Err(err) = frame.bind_format(dictionary) {
        debug!(
            frame_type = frame.frame_type(),
            revision = frame.revision(),
            %err,
            "frame left unbound"
        );
    }

    let mut values = BTreeMap::new();
    for name in fields {
        match frame.header_field(name) {
            Ok(field) => {
                let value = if field.size_b() <= 8 {
                    FieldValue::Int(field.value::<u64>())
                } else {
                    FieldValue::Hex(hex(field.bytes()))
                };
                values.insert(name.clone(), value);
            }
            Err(FrameError::FieldNotFound(_)) => {}
            Err(err) => debug!(field = %name, %err, "field unavailable"),
        }
    }

    FrameSummary {
        offset,
        frame_type: frame.frame_type(),
        revision: frame.revision(),
        format: frame.format().map(|format| format.name().to_string()),
        kind: frame.kind().to_string(),
        frame_size: frame.frame_size_b(),
        header_size: frame.header_size_b(),
        data_size: frame.data_size_b(),
        item_count: frame.item_count(),
        fields: values,
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + 2 * bytes.len());
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn print_summaries(summaries: &[FrameSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for summary in summaries {
                print_json(summary);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table([
                "OFFSET", "TYPE", "REV", "FORMAT", "KIND", "SIZE", "HEADER", "DATA", "ITEMS",
                "FIELDS",
            ]);
            for s in summaries {
                table.add_row(vec![
                    s.offset.to_string(),
                    frame_type_hex(s.frame_type),
                    s.revision.to_string(),
                    s.format.clone().unwrap_or_else(|| "-".to_string()),
                    s.kind.clone(),
                    s.frame_size.to_string(),
                    s.header_size.to_string(),
                    s.data_size.to_string(),
                    s.item_count.to_string(),
                    format_fields(&s.fields),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for s in summaries {
                println!(
                    "@{} type={} rev={} format={} kind={} size={} header={} data={} items={} {}",
                    s.offset,
                    frame_type_hex(s.frame_type),
                    s.revision,
                    s.format.as_deref().unwrap_or("-"),
                    s.kind,
                    s.frame_size,
                    s.header_size,
                    s.data_size,
                    s.item_count,
                    format_fields(&s.fields)
                );
            }
        }
    }
}

fn format_fields(fields: &BTreeMap<String, FieldValue>) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

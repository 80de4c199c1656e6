use mfm::dictionary::FormatDictionary;
use mfm::merge::{EventMerger, MergeOptions, MergeSummary};
use serde::Serialize;
use tracing::info;

use crate::cmd::MergeArgs;
use crate::exit::{merge_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{new_table, print_json, OutputFormat};

#[derive(Serialize, Debug)]
struct MergeOutput {
    inputs: Vec<String>,
    frames_indexed: usize,
    frames_merged: usize,
    layered_frames: usize,
    output_files: Vec<String>,
}

fn merge_output(inputs: Vec<String>, summary: MergeSummary) -> MergeOutput {
    MergeOutput {
        inputs,
        frames_indexed: summary.frames_indexed,
        frames_merged: summary.frames_merged,
        layered_frames: summary.layered_frames,
        output_files: summary
            .output_files
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    }
}

pub fn run(args: MergeArgs, format: OutputFormat, dictionary: FormatDictionary) -> CliResult<i32> {
    if args.min_event > args.max_event {
        return Err(CliError::new(
            USAGE,
            format!(
                "--min-event {} is larger than --max-event {}",
                args.min_event, args.max_event
            ),
        ));
    }

    let mut merger = EventMerger::new(dictionary);
    let mut inputs = Vec::new();
    for path in &args.files {
        if merger.add_file(path).map_err(merge_error)? {
            inputs.push(path.display().to_string());
        } else {
            info!(path = %path.display(), "file listed twice, indexed once");
        }
    }

    let options = MergeOptions {
        min_event: args.min_event,
        max_event: args.max_event,
        max_merged: args.max_merged,
        max_file_size_b: args.max_file_size,
    };
    let summary = merger
        .merge_by_event_idx(&args.output, options)
        .map_err(merge_error)?;

    print_merge(&merge_output(inputs, summary), format);
    Ok(SUCCESS)
}

fn print_merge(out: &MergeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(["INDEXED", "MERGED", "LAYERED", "OUTPUT"]);
            table.add_row(vec![
                out.frames_indexed.to_string(),
                out.frames_merged.to_string(),
                out.layered_frames.to_string(),
                out.output_files.join("\n"),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Inputs:          {}", out.inputs.join(", "));
            println!("Frames indexed:  {}", out.frames_indexed);
            println!("Frames merged:   {}", out.frames_merged);
            println!("Layered frames:  {}", out.layered_frames);
            println!("Output files:    {}", out.output_files.join(", "));
        }
    }
}

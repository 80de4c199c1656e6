use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use mfm::dictionary::FormatDictionary;
use tracing::debug;

use crate::exit::{dictionary_error, CliResult};
use crate::output::OutputFormat;

pub mod dump;
pub mod formats;
pub mod info;
pub mod merge;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print one summary per frame of a file.
    Dump(DumpArgs),
    /// Print frame totals per type and revision.
    Info(InfoArgs),
    /// List the known frame formats.
    Formats(FormatsArgs),
    /// Merge frames sharing an event index into layered frames.
    Merge(MergeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, formats: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Dump(args) => dump::run(args, format, &load_dictionary(formats)?),
        Command::Info(args) => info::run(args, format, &load_dictionary(formats)?),
        Command::Formats(args) => formats::run(args, format, &load_dictionary(formats)?),
        Command::Merge(args) => merge::run(args, format, load_dictionary(formats)?),
        Command::Version(args) => version::run(args),
    }
}

/// Builtin formats, plus the descriptions found at `path`.
pub fn load_dictionary(path: Option<&Path>) -> CliResult<FormatDictionary> {
    let mut dictionary =
        FormatDictionary::builtin().map_err(|err| dictionary_error("builtin formats", err))?;
    let Some(path) = path else {
        return Ok(dictionary);
    };

    let context = path.display().to_string();
    let added = if path.is_dir() {
        dictionary.add_formats_from_directory(path)
    } else {
        dictionary.add_formats_from_file(path)
    }
    .map_err(|err| dictionary_error(&context, err))?;
    debug!(path = %context, added, formats = dictionary.len(), "loaded extra formats");
    Ok(dictionary)
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Frame file to read.
    pub file: PathBuf,
    /// Bytes read per chunk.
    #[arg(long, default_value = "65536")]
    pub chunk_size: usize,
    /// Stop after N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Header field to print, when the frame format declares it (repeatable).
    #[arg(long = "field", value_name = "NAME")]
    pub fields: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Frame file to read.
    pub file: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct FormatsArgs {}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Frame files to index.
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,
    /// Output file; later files get a `.N` suffix.
    #[arg(long, short = 'o')]
    pub output: PathBuf,
    /// Smallest event index merged.
    #[arg(long, default_value = "0")]
    pub min_event: u32,
    /// Largest event index merged.
    #[arg(long, default_value_t = u32::MAX)]
    pub max_event: u32,
    /// Stop after N layered frames (0 merges every event).
    #[arg(long, default_value = "0")]
    pub max_merged: usize,
    /// Start a new output file once the current one exceeds BYTES (0 disables).
    #[arg(long, value_name = "BYTES", default_value = "0")]
    pub max_file_size: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

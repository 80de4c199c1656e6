//! Grouping of frames that share an event index into layered frames.
//!
//! Files are indexed first, recording where each frame starts and how large it
//! is. Merging then walks events in ascending order, re-reads the member frames
//! and writes one `MergedByEventIdx` frame per event.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mfm_frame::{minimal_blk_size_b, FormatLookup, Frame, FrameError, FrameReader};
use tracing::{debug, info, warn};

/// Frame type of layered frames merged by event index.
pub const MERGED_BY_EVENT_IDX: u16 = 0xFF01;

const COBO_FRAME_TYPE: u16 = 0x1;
const COBO_FULL_READOUT_FRAME_TYPE: u16 = 0x2;
const RIBF_FRAME_TYPE: u16 = 0x30;
// RIBF frames carry their event number at a fixed header position.
const RIBF_EVENT_IDX_OFFSET_B: usize = 14;

/// Errors raised while indexing or merging frames.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A file could not be opened, created, read or written.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A frame could not be decoded or assembled.
    #[error("{}: {source}", path.display())]
    Frame {
        path: PathBuf,
        #[source]
        source: FrameError,
    },

    /// The layered frame format is missing or cannot hold an event.
    #[error("layered frame for event {event_idx}: {source}")]
    Layered {
        event_idx: u32,
        #[source]
        source: FrameError,
    },
}

pub type Result<T> = std::result::Result<T, MergeError>;

/// Limits applied by [`EventMerger::merge_by_event_idx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Smallest event index merged.
    pub min_event: u32,
    /// Largest event index merged.
    pub max_event: u32,
    /// Stop after this many layered frames; 0 merges every event.
    pub max_merged: usize,
    /// Roll over to a new output file once the current one is larger; 0 disables.
    pub max_file_size_b: u64,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            min_event: 0,
            max_event: u32::MAX,
            max_merged: 0,
            max_file_size_b: 0,
        }
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub frames_indexed: usize,
    pub frames_merged: usize,
    pub layered_frames: usize,
    pub output_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct FrameRef {
    file: usize,
    pos_b: u64,
    size_b: u64,
}

struct IndexedFile {
    path: PathBuf,
    file: File,
}

/// Index of frames by event, backed by the files they were read from.
pub struct EventMerger<L> {
    lookup: L,
    files: Vec<IndexedFile>,
    events: BTreeMap<u32, Vec<FrameRef>>,
    frames_indexed: usize,
}

impl<L: FormatLookup> EventMerger<L> {
    /// Create an empty merger resolving formats through `lookup`.
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            files: Vec::new(),
            events: BTreeMap::new(),
            frames_indexed: 0,
        }
    }

    /// Index every frame of `path`.
    ///
    /// Returns false if the file was already indexed. Frames of types other
    /// than CoBo, CoBo full readout and RIBF are skipped.
    pub fn add_file(&mut self, path: &Path) -> Result<bool> {
        if self.files.iter().any(|indexed| indexed.path == path) {
            return Ok(false);
        }
        debug!(path = %path.display(), "indexing file");

        let file = File::open(path).map_err(|source| MergeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_idx = self.files.len();
        let mut refs = Vec::new();

        for entry in FrameReader::new(BufReader::new(&file)).with_offsets() {
            let (pos_b, mut frame) = entry.map_err(|source| MergeError::Frame {
                path: path.to_path_buf(),
                source,
            })?;
            let size_b = frame.frame_size_b();
            match self.event_idx(&mut frame) {
                Ok(Some(event_idx)) => refs.push((
                    event_idx,
                    FrameRef {
                        file: file_idx,
                        pos_b,
                        size_b,
                    },
                )),
                Ok(None) => debug!(frame_type = frame.frame_type(), "skipping frame"),
                Err(source) => {
                    return Err(MergeError::Frame {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }

        debug!(path = %path.display(), frames = refs.len(), "indexed file");
        self.frames_indexed += refs.len();
        for (event_idx, frame_ref) in refs {
            self.events.entry(event_idx).or_default().push(frame_ref);
        }
        self.files.push(IndexedFile {
            path: path.to_path_buf(),
            file,
        });
        Ok(true)
    }

    fn event_idx(&self, frame: &mut Frame) -> mfm_frame::Result<Option<u32>> {
        match frame.frame_type() {
            COBO_FRAME_TYPE | COBO_FULL_READOUT_FRAME_TYPE => {
                frame.bind_format(&self.lookup)?;
                Ok(Some(frame.header_field("eventIdx")?.value::<u32>()))
            }
            RIBF_FRAME_TYPE => Ok(Some(
                frame
                    .header_field_at(RIBF_EVENT_IDX_OFFSET_B, 4)?
                    .value::<u32>(),
            )),
            _ => Ok(None),
        }
    }

    /// Number of frames indexed so far.
    pub fn frames_indexed(&self) -> usize {
        self.frames_indexed
    }

    /// Distinct event indexes seen so far, ascending.
    pub fn event_indexes(&self) -> impl Iterator<Item = u32> + '_ {
        self.events.keys().copied()
    }

    /// Forget every indexed file.
    pub fn clear(&mut self) {
        self.files.clear();
        self.events.clear();
        self.frames_indexed = 0;
    }

    /// Write one layered frame per event index to `output`.
    pub fn merge_by_event_idx(
        &mut self,
        output: &Path,
        options: MergeOptions,
    ) -> Result<MergeSummary> {
        let mut summary = MergeSummary {
            frames_indexed: self.frames_indexed,
            ..MergeSummary::default()
        };
        if self.events.is_empty() {
            warn!("no frames indexed, nothing to merge");
            return Ok(summary);
        }

        let events = std::mem::take(&mut self.events);
        let merged = self.merge_events(&events, output, options, &mut summary);
        self.events = events;
        merged?;

        info!(
            frames_indexed = summary.frames_indexed,
            frames_merged = summary.frames_merged,
            layered_frames = summary.layered_frames,
            files = summary.output_files.len(),
            "merged frames by event index"
        );
        Ok(summary)
    }

    fn merge_events(
        &mut self,
        events: &BTreeMap<u32, Vec<FrameRef>>,
        output: &Path,
        options: MergeOptions,
        summary: &mut MergeSummary,
    ) -> Result<()> {
        let mut sink = OutputSink::create(output, &mut summary.output_files)?;
        let mut counts_per_event = BTreeSet::new();

        for (event_idx, refs) in events {
            if options.max_merged > 0 && summary.layered_frames >= options.max_merged {
                break;
            }
            if *event_idx < options.min_event || *event_idx > options.max_event {
                continue;
            }
            if options.max_file_size_b > 0 && sink.written_b > options.max_file_size_b {
                sink.finish()?;
                sink = OutputSink::create(output, &mut summary.output_files)?;
            }

            let merged = self.merge_event(*event_idx, refs)?;
            sink.write_frame(&merged)?;
            counts_per_event.insert(refs.len());
            summary.frames_merged += refs.len();
            summary.layered_frames += 1;
        }
        debug!(frames_per_event = ?counts_per_event, "distinct member counts");
        sink.finish()
    }

    fn merge_event(&mut self, event_idx: u32, refs: &[FrameRef]) -> Result<Frame> {
        let layered = |source| MergeError::Layered { event_idx, source };

        let base = self
            .lookup
            .find_latest_format(MERGED_BY_EVENT_IDX)
            .map_err(layered)?;
        let size_b = refs
            .iter()
            .fold(base.header_size_b(), |total, frame_ref| total + frame_ref.size_b);
        let format = minimal_blk_size_b(size_b)
            .and_then(|blk_size_b| base.with_blk_size_b(blk_size_b))
            .map_err(layered)?;
        let mut merged = Frame::create(&Arc::new(format)).map_err(layered)?;

        for frame_ref in refs {
            let member = self.read_member(*frame_ref)?;
            merged.add_frame(&member).map_err(layered)?;
        }
        merged
            .header_field_mut("eventIdx")
            .map_err(layered)?
            .set_value(event_idx);
        Ok(merged)
    }

    fn read_member(&mut self, frame_ref: FrameRef) -> Result<Frame> {
        let indexed = &mut self.files[frame_ref.file];
        let path = &indexed.path;
        indexed
            .file
            .seek(SeekFrom::Start(frame_ref.pos_b))
            .map_err(|source| MergeError::Io {
                path: path.clone(),
                source,
            })?;
        Frame::read(&mut BufReader::new(&indexed.file)).map_err(|source| MergeError::Frame {
            path: path.clone(),
            source,
        })
    }
}

struct OutputSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written_b: u64,
}

impl OutputSink {
    fn create(base: &Path, opened: &mut Vec<PathBuf>) -> Result<Self> {
        let path = output_path(base, opened.len());
        let file = File::create(&path).map_err(|source| MergeError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened merge output");
        opened.push(path.clone());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written_b: 0,
        })
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        frame
            .write(&mut self.writer)
            .map_err(|source| MergeError::Frame {
                path: self.path.clone(),
                source,
            })?;
        self.written_b += frame.frame_size_b();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(|source| MergeError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// `base` for the first output file, `<base>.<n>` for the following ones.
pub fn output_path(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

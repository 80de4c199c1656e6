use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;

use crate::builder::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::primary::{PrimaryHeader, PRIMARY_HEADER_SIZE};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Pulls whole frames out of a `Read` stream.
///
/// The reader also tracks the stream offset of every frame it returns, which
/// is what an index over a frame file needs.
pub struct FrameReader<T> {
    source: T,
    pending: BytesMut,
    config: FrameConfig,
    position_b: u64,
    // Set once iteration hit an error that retrying cannot clear.
    failed: bool,
}

impl<T: Read> FrameReader<T> {
    pub fn new(source: T) -> Self {
        Self::with_config(source, FrameConfig::default())
    }

    pub fn with_config(source: T, config: FrameConfig) -> Self {
        Self {
            source,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
            position_b: 0,
            failed: false,
        }
    }

    /// Next frame of the stream.
    ///
    /// A stream ending between frames yields `StreamClosed`; one ending inside a
    /// frame yields `IncompleteFrame`. `WouldBlock` is returned to the caller.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.read_frame_with_offset().map(|(_, frame)| frame)
    }

    /// Next frame together with the offset of its first byte.
    pub fn read_frame_with_offset(&mut self) -> Result<(u64, Frame)> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = decode_frame(&mut self.pending, self.config.max_frame_size)? {
                let offset_b = self.position_b;
                self.position_b += frame.frame_size_b();
                return Ok((offset_b, frame));
            }

            match self.source.read(&mut chunk) {
                Ok(0) => return Err(self.end_of_stream()),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn end_of_stream(&self) -> FrameError {
        if self.pending.is_empty() {
            return FrameError::StreamClosed;
        }
        let needed = PrimaryHeader::decode_slice(&self.pending)
            .map(|primary| primary.frame_size_b())
            .unwrap_or(PRIMARY_HEADER_SIZE as u64);
        debug!(
            offset = self.position_b,
            buffered = self.pending.len(),
            needed,
            "stream ended inside a frame"
        );
        FrameError::IncompleteFrame {
            needed,
            available: self.pending.len() as u64,
        }
    }

    /// Offset just past the last frame returned.
    pub fn position_b(&self) -> u64 {
        self.position_b
    }

    /// Iterate over `(offset, frame)` pairs.
    pub fn with_offsets(self) -> WithOffsets<T> {
        WithOffsets { reader: self }
    }

    pub fn get_ref(&self) -> &T {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.source
    }

    pub fn into_inner(self) -> T {
        self.source
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u64) {
        self.config.max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Read> FrameReader<T> {
    fn next_entry(&mut self) -> Option<Result<(u64, Frame)>> {
        if self.failed {
            return None;
        }
        match self.read_frame_with_offset() {
            Err(FrameError::StreamClosed) => None,
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {
                Some(Err(FrameError::Io(err)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
            Ok(entry) => Some(Ok(entry)),
        }
    }
}

/// Ends at a clean end of stream. After any other error except `WouldBlock`,
/// the error is yielded once and iteration stops.
impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|entry| entry.map(|(_, frame)| frame))
    }
}

/// Iterator returned by [`FrameReader::with_offsets`].
pub struct WithOffsets<T> {
    reader: FrameReader<T>,
}

impl<T: Read> Iterator for WithOffsets<T> {
    type Item = Result<(u64, Frame)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry()
    }
}

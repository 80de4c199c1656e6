use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::primary::{PrimaryHeader, PRIMARY_HEADER_SIZE};

/// Default maximum frame size: 256 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 256 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Configuration shared by the builder, reader and writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest accepted `frameSize_B`. Default: 256 MiB.
    pub max_frame_size: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer; on error the
/// buffer is left untouched.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: u64) -> Result<Option<Frame>> {
    let Some(frame_size_b) = pending_frame_size(src, max_frame_size)? else {
        return Ok(None);
    };
    if (src.len() as u64) < frame_size_b {
        return Ok(None); // Need more data
    }

    let frame_len = frame_size_b as usize;
    let frame = Frame::decode(&src[..frame_len]).map_err(|err| match err {
        // The whole declared frame is buffered, so a short header is a lie.
        FrameError::IncompleteFrame { needed, .. } => FrameError::MalformedHeader(format!(
            "header needs {needed} bytes but frame declares {frame_size_b}"
        )),
        other => other,
    })?;
    src.advance(frame_len);
    Ok(Some(frame))
}

/// Size of the frame at the front of `src`, once its primary header is buffered.
fn pending_frame_size(src: &[u8], max_frame_size: u64) -> Result<Option<u64>> {
    if src.len() < PRIMARY_HEADER_SIZE {
        return Ok(None); // Need more data
    }
    let primary = PrimaryHeader::decode_slice(src)?;
    let frame_size_b = primary.frame_size_b();
    if frame_size_b > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: frame_size_b,
            max: max_frame_size,
        });
    }
    if frame_size_b < PRIMARY_HEADER_SIZE as u64 {
        return Err(FrameError::MalformedHeader(format!(
            "frame of {frame_size_b} bytes is shorter than its primary header"
        )));
    }
    Ok(Some(frame_size_b))
}

/// Receives every frame a [`FrameBuilder`] completes.
pub trait FrameProcessor {
    fn process_frame(&mut self, frame: Frame) -> Result<()>;
}

impl<F> FrameProcessor for F
where
    F: FnMut(Frame) -> Result<()>,
{
    fn process_frame(&mut self, frame: Frame) -> Result<()> {
        self(frame)
    }
}

/// Where a [`FrameBuilder`] stands in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Fewer than eight bytes of the next frame are buffered.
    AwaitingHeader,
    /// The primary header is buffered; waiting for the rest of the frame.
    AwaitingBody { frame_size_b: u64 },
}

/// Reassembles frames from arbitrarily chunked data.
///
/// Chunk boundaries never matter: the same bytes fed in one piece or one
/// byte at a time yield the same frames, in the same order.
#[derive(Debug)]
pub struct FrameBuilder<P> {
    buf: BytesMut,
    state: BuildState,
    config: FrameConfig,
    processor: P,
}

impl<P: FrameProcessor> FrameBuilder<P> {
    /// Create a new frame builder with default configuration.
    pub fn new(processor: P) -> Self {
        Self::with_config(processor, FrameConfig::default())
    }

    /// Create a new frame builder with explicit configuration.
    pub fn with_config(processor: P, config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: BuildState::AwaitingHeader,
            config,
            processor,
        }
    }

    /// Append `chunk` and hand every frame it completes to the processor.
    ///
    /// Returns the number of frames emitted. Malformed and oversized frames
    /// are reported without dropping any buffered byte; call [`reset`] to
    /// discard them.
    ///
    /// [`reset`]: FrameBuilder::reset
    pub fn add_data_chunk(&mut self, chunk: &[u8]) -> Result<usize> {
        self.buf.extend_from_slice(chunk);

        let mut emitted = 0usize;
        loop {
            let pending = pending_frame_size(&self.buf, self.config.max_frame_size)?;
            self.state = match pending {
                Some(frame_size_b) => BuildState::AwaitingBody { frame_size_b },
                None => BuildState::AwaitingHeader,
            };

            let Some(frame) = decode_frame(&mut self.buf, self.config.max_frame_size)? else {
                break;
            };
            trace!(
                frame_type = frame.frame_type(),
                revision = frame.revision(),
                frame_size_b = frame.frame_size_b(),
                buffered = self.buf.len(),
                "frame complete"
            );
            self.state = BuildState::AwaitingHeader;
            emitted += 1;
            self.processor.process_frame(frame)?;
        }
        Ok(emitted)
    }

    /// Discard all buffered bytes.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            trace!(discarded = self.buf.len(), "frame builder reset");
        }
        self.buf.clear();
        self.state = BuildState::AwaitingHeader;
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Number of bytes buffered towards the next frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Current builder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Consume the builder and return its processor.
    pub fn into_processor(self) -> P {
        self.processor
    }
}

use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::builder::FrameConfig;
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Serializes frames onto a `Write` stream.
///
/// Each call encodes into an internal buffer first, so a frame rejected by the
/// size limit never leaves a partial write behind.
pub struct FrameWriter<T> {
    sink: T,
    staging: BytesMut,
    config: FrameConfig,
    frames_written: u64,
    bytes_written: u64,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(sink: T) -> Self {
        Self::with_config(sink, FrameConfig::default())
    }

    pub fn with_config(sink: T, config: FrameConfig) -> Self {
        Self {
            sink,
            staging: BytesMut::new(),
            config,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    /// Write one frame, then flush.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frames(std::iter::once(frame))
    }

    /// Write several frames with a single flush.
    ///
    /// Every frame is checked against the size limit before anything is written.
    pub fn write_frames<'f, I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = &'f Frame>,
    {
        self.staging.clear();
        let mut count = 0u64;
        for frame in frames {
            let size = frame.frame_size_b();
            if size > self.config.max_frame_size {
                self.staging.clear();
                return Err(FrameError::FrameTooLarge {
                    size,
                    max: self.config.max_frame_size,
                });
            }
            frame.encode(&mut self.staging);
            count += 1;
        }

        let staged = std::mem::take(&mut self.staging);
        let written = self.send(&staged);
        self.staging = staged;
        written?;
        self.flush()?;

        self.frames_written += count;
        self.bytes_written += self.staging.len() as u64;
        trace!(frames = count, bytes = self.staging.len(), "frames written");
        Ok(())
    }

    fn send(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            match self.sink.write(bytes) {
                Ok(0) => return Err(FrameError::StreamClosed),
                Ok(n) => bytes = &bytes[n..],
                Err(err) if retryable(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.sink.flush() {
                Ok(()) => return Ok(()),
                Err(err) if retryable(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Frames fully written and flushed so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Bytes of fully written frames so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &T {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.sink
    }

    pub fn into_inner(self) -> T {
        self.sink
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u64) {
        self.config.max_frame_size = max_frame_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn retryable(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

//! Codec capability
//!
//! The decode transform itself is a black box. The engine talks to it
//! through a buffer-index protocol: acquire an input index, fill the buffer,
//! submit the index; poll for an output index, read it, release the index.
//! Buffer contents are invalid as soon as their index is released.

use crate::buffer::{BufferFlags, BufferInfo};
use crate::error::PlaybackResult;
use crate::format::MediaFormat;
use crate::surface::Surface;
use std::sync::Arc;
use std::time::Duration;

/// Result of polling the codec for decoded output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputStatus {
    /// A decoded buffer is ready at `index`
    Buffer {
        /// Output buffer index
        index: usize,
        /// Metadata of the decoded buffer
        info: BufferInfo,
    },
    /// Nothing ready within the timeout
    TryAgainLater,
    /// The output format changed; the new format is attached
    FormatChanged(MediaFormat),
    /// Output buffer set was reallocated; previously seen indices are stale
    BuffersChanged,
}

/// Buffer-indexed decoder
pub trait Codec: Send {
    /// Codec name for logs and errors
    fn name(&self) -> &str;

    /// One-time configuration, optionally against a display surface
    fn configure(
        &mut self,
        format: &MediaFormat,
        surface: Option<Arc<dyn Surface>>,
    ) -> PlaybackResult<()>;

    /// Start accepting input
    fn start(&mut self) -> PlaybackResult<()>;

    /// Acquire a free input buffer index, waiting at most `timeout`
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> PlaybackResult<Option<usize>>;

    /// Writable view of an acquired input buffer
    fn input_buffer(&mut self, index: usize) -> PlaybackResult<&mut [u8]>;

    /// Submit a filled input buffer
    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> PlaybackResult<()>;

    /// Poll for decoded output, waiting at most `timeout`
    fn dequeue_output_buffer(&mut self, timeout: Duration) -> PlaybackResult<OutputStatus>;

    /// Read-only view of a dequeued output buffer
    fn output_buffer(&self, index: usize) -> PlaybackResult<&[u8]>;

    /// Return an output buffer; `render` presents it to the configured
    /// surface first
    fn release_output_buffer(&mut self, index: usize, render: bool) -> PlaybackResult<()>;

    /// Discard all queued input and pending output
    fn flush(&mut self) -> PlaybackResult<()>;

    /// Stop processing
    fn stop(&mut self) -> PlaybackResult<()>;

    /// Free all codec resources
    fn release(&mut self);
}

/// Creates decoders by MIME type
pub trait CodecFactory: Send + Sync {
    /// Create an unconfigured decoder for `mime`
    fn create_decoder(&self, mime: &str) -> PlaybackResult<Box<dyn Codec>>;
}

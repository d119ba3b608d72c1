//! Track strategy contract
//!
//! The engine owns the decode loop; a [`TrackDecoder`] supplies everything
//! that differs between audio and video: preconditions, extractor selection,
//! track parameters, codec configuration and how decoded bytes are rendered.

use crate::buffer::BufferInfo;
use crate::codec::Codec;
use crate::engine::control::Control;
use crate::error::PlaybackResult;
use crate::extractor::Extractor;
use crate::format::{MediaFormat, TrackKind};
use std::path::Path;
use std::sync::Arc;

/// Track parameters derived from the format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackParams {
    /// Frame width in pixels, 0 for audio
    pub width: u32,
    /// Frame height in pixels, 0 for audio
    pub height: u32,
    /// Clockwise display rotation in degrees
    pub rotation: u32,
}

/// Outcome of [`TrackDecoder::configure_codec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecSetup {
    /// The codec is configured and may be started
    Configured,
    /// A resource is not available yet; the engine waits for
    /// [`ResourceSignal::notify`] and calls `configure_codec` again
    Deferred,
}

/// Wakes a session blocked on a deferred codec configuration
#[derive(Clone)]
pub struct ResourceSignal {
    control: Arc<Control>,
}

impl ResourceSignal {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    /// Announce that a missing resource became available
    pub fn notify(&self) {
        self.control.signal_resource();
    }
}

impl std::fmt::Debug for ResourceSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSignal")
            .field("epoch", &self.control.resource_epoch())
            .finish()
    }
}

/// Track specific half of a decode session
///
/// All methods run on the session's worker thread, in this order: `check`,
/// `init_extractor`, `init_spec_params`, `init_render`, `configure_codec`
/// (possibly repeated), then `render` per frame and `done_decode` once at
/// teardown.
pub trait TrackDecoder: Send {
    /// Kind of track this strategy decodes
    fn track_kind(&self) -> TrackKind;

    /// Verify strategy preconditions
    fn check(&mut self) -> PlaybackResult<()>;

    /// Open the extractor for this track of `path`
    fn init_extractor(&mut self, path: &Path) -> PlaybackResult<Box<dyn Extractor>>;

    /// Read track parameters out of the format
    fn init_spec_params(&mut self, format: &MediaFormat) -> PlaybackResult<TrackParams>;

    /// Configure `codec`, or defer until `signal` fires
    fn configure_codec(
        &mut self,
        codec: &mut dyn Codec,
        format: &MediaFormat,
        signal: &ResourceSignal,
    ) -> PlaybackResult<CodecSetup>;

    /// Prepare the output sink
    fn init_render(&mut self) -> PlaybackResult<()>;

    /// Consume one decoded buffer
    fn render(&mut self, buffer: &[u8], info: &BufferInfo) -> PlaybackResult<()>;

    /// Tear down the output sink
    fn done_decode(&mut self);
}

//! Observer interfaces
//!
//! Listeners are invoked on the session's worker thread and never while the
//! session's control lock is held, so a callback may call back into the
//! [`DecoderHandle`] (for example to pause after the first frame).

use crate::buffer::Frame;
use crate::engine::DecoderHandle;
use std::sync::Arc;

/// Lifecycle callbacks of a decode session
#[allow(unused_variables)]
pub trait DecoderStateListener: Send + Sync {
    /// Run loop entered, before initialization
    fn on_prepare(&self, decoder: &DecoderHandle) {}

    /// Initialization succeeded; the loop is about to start
    fn on_ready(&self, decoder: &DecoderHandle) {}

    /// Decoding resumed
    fn on_running(&self, decoder: &DecoderHandle) {}

    /// Worker is about to hold in the paused state
    fn on_pause(&self, decoder: &DecoderHandle) {}

    /// A decoded frame; only valid for the duration of the call
    fn on_frame(&self, decoder: &DecoderHandle, frame: &Frame<'_>) {}

    /// The codec reported end of stream
    fn on_finish(&self, decoder: &DecoderHandle) {}

    /// Codec and extractor have been released
    fn on_destroy(&self, decoder: &DecoderHandle) {}

    /// The session failed
    fn on_error(&self, decoder: &DecoderHandle, message: &str) {}
}

/// Size and position callbacks
#[allow(unused_variables)]
pub trait ProgressListener: Send + Sync {
    /// Video dimensions are known
    fn on_size_changed(&self, width: u32, height: u32, rotation: u32) {}

    /// Playback position advanced
    fn on_progress(&self, position_ms: i64) {}
}

/// Fan-out of several state listeners
#[derive(Default, Clone)]
pub struct ListenerSet {
    listeners: Vec<Arc<dyn DecoderStateListener>>,
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener
    pub fn with(mut self, listener: Arc<dyn DecoderStateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Add a listener in place
    pub fn push(&mut self, listener: Arc<dyn DecoderStateListener>) {
        self.listeners.push(listener);
    }

    /// Number of listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl DecoderStateListener for ListenerSet {
    fn on_prepare(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_prepare(decoder));
    }

    fn on_ready(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_ready(decoder));
    }

    fn on_running(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_running(decoder));
    }

    fn on_pause(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_pause(decoder));
    }

    fn on_frame(&self, decoder: &DecoderHandle, frame: &Frame<'_>) {
        self.listeners
            .iter()
            .for_each(|l| l.on_frame(decoder, frame));
    }

    fn on_finish(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_finish(decoder));
    }

    fn on_destroy(&self, decoder: &DecoderHandle) {
        self.listeners.iter().for_each(|l| l.on_destroy(decoder));
    }

    fn on_error(&self, decoder: &DecoderHandle, message: &str) {
        self.listeners
            .iter()
            .for_each(|l| l.on_error(decoder, message));
    }
}

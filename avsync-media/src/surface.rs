//! Display surfaces
//!
//! [`MemorySurface`] records every presented frame. [`DeferredSurfaceProvider`]
//! stands in for a window that is created after playback was requested: the
//! video track registers a creation callback and the embedding UI calls
//! [`DeferredSurfaceProvider::set_surface`] once the surface exists.

use avsync_core::{Surface, SurfaceCallback, SurfaceProvider};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One frame presented to a [`MemorySurface`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedFrame {
    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,
    /// Size of the frame in bytes
    pub size: usize,
    /// Frame bytes, when the surface keeps them
    pub data: Option<Vec<u8>>,
}

/// Surface that records presented frames
#[derive(Debug)]
pub struct MemorySurface {
    name: String,
    keep_data: bool,
    frames: Mutex<Vec<PresentedFrame>>,
}

impl MemorySurface {
    /// Surface recording frame metadata only
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keep_data: false,
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Surface that also copies every frame's bytes
    pub fn keeping_data(name: impl Into<String>) -> Self {
        Self {
            keep_data: true,
            ..Self::new(name)
        }
    }

    /// Frames presented so far
    pub fn frames(&self) -> Vec<PresentedFrame> {
        self.frames.lock().clone()
    }

    /// Number of frames presented so far
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Timestamp of the most recent frame
    pub fn last_timestamp_us(&self) -> Option<i64> {
        self.frames.lock().last().map(|f| f.presentation_time_us)
    }
}

impl Surface for MemorySurface {
    fn present(&self, data: &[u8], presentation_time_us: i64) {
        self.frames.lock().push(PresentedFrame {
            presentation_time_us,
            size: data.len(),
            data: self.keep_data.then(|| data.to_vec()),
        });
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
struct ProviderState {
    surface: Option<Arc<dyn Surface>>,
    callbacks: Vec<SurfaceCallback>,
}

/// Surface provider whose surface arrives later
#[derive(Default)]
pub struct DeferredSurfaceProvider {
    state: Mutex<ProviderState>,
}

impl DeferredSurfaceProvider {
    /// Provider without a surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose surface already exists
    pub fn with_surface(surface: Arc<dyn Surface>) -> Self {
        let provider = Self::new();
        provider.state.lock().surface = Some(surface);
        provider
    }

    /// Publish the surface and fire every pending creation callback
    pub fn set_surface(&self, surface: Arc<dyn Surface>) {
        let callbacks = {
            let mut state = self.state.lock();
            state.surface = Some(surface.clone());
            std::mem::take(&mut state.callbacks)
        };
        debug!(
            "Surface {} created, {} waiting callbacks",
            surface.name(),
            callbacks.len()
        );
        for callback in callbacks {
            callback(surface.clone());
        }
    }

    /// Number of callbacks waiting for the surface
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }
}

impl SurfaceProvider for DeferredSurfaceProvider {
    fn surface(&self) -> Option<Arc<dyn Surface>> {
        self.state.lock().surface.clone()
    }

    fn on_surface_created(&self, callback: SurfaceCallback) {
        let surface = {
            let mut state = self.state.lock();
            match &state.surface {
                Some(surface) => surface.clone(),
                None => {
                    state.callbacks.push(callback);
                    return;
                }
            }
        };
        callback(surface);
    }
}

impl std::fmt::Debug for DeferredSurfaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredSurfaceProvider")
            .field("has_surface", &state.surface.is_some())
            .field("pending_callbacks", &state.callbacks.len())
            .finish()
    }
}

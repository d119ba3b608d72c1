//! Display surfaces
//!
//! Video frames are never copied out by the engine: a codec configured
//! against a [`Surface`] presents a frame when its output buffer is released
//! with `render == true`.

use std::sync::Arc;

/// Output target for decoded video
pub trait Surface: Send + Sync {
    /// Present one decoded frame
    fn present(&self, data: &[u8], presentation_time_us: i64);

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "surface"
    }
}

/// Callback fired once a surface becomes available
pub type SurfaceCallback = Box<dyn FnOnce(Arc<dyn Surface>) + Send>;

/// Supplies a surface that may not exist yet (for example a window that has
/// not been mapped)
pub trait SurfaceProvider: Send + Sync {
    /// Current surface, if already created
    fn surface(&self) -> Option<Arc<dyn Surface>>;

    /// Register a callback for surface creation.
    ///
    /// Implementations fire the callback immediately when the surface already
    /// exists, so a registration racing with creation is never lost.
    fn on_surface_created(&self, callback: SurfaceCallback);
}

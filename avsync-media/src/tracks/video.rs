use super::normalize_rotation;
use avsync_core::{
    keys, BufferInfo, Codec, CodecSetup, Extractor, ExtractorSource, MediaFormat, PlaybackError,
    PlaybackResult, ResourceSignal, Surface, SurfaceProvider, TrackDecoder, TrackKind,
    TrackParams,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Video track strategy: the codec presents frames to a display surface
///
/// Frames reach the surface when the engine releases each output buffer with
/// rendering enabled, so [`TrackDecoder::render`] does nothing here. When only
/// a [`SurfaceProvider`] is given and its surface does not exist yet, codec
/// configuration is deferred until the provider announces the surface.
pub struct VideoTrackDecoder {
    source: Arc<dyn ExtractorSource>,
    surface: Option<Arc<dyn Surface>>,
    provider: Option<Arc<dyn SurfaceProvider>>,
    announced: Arc<Mutex<Option<Arc<dyn Surface>>>>,
    waiting: bool,
}

impl VideoTrackDecoder {
    /// Strategy reading from `source`; a surface or provider must be added
    pub fn new(source: Arc<dyn ExtractorSource>) -> Self {
        Self {
            source,
            surface: None,
            provider: None,
            announced: Arc::new(Mutex::new(None)),
            waiting: false,
        }
    }

    /// Render to an existing surface
    pub fn with_surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Render to the provider's surface, once it exists
    pub fn with_provider(mut self, provider: Arc<dyn SurfaceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn available_surface(&self) -> Option<Arc<dyn Surface>> {
        self.surface
            .clone()
            .or_else(|| self.announced.lock().clone())
            .or_else(|| self.provider.as_ref().and_then(|p| p.surface()))
    }
}

impl TrackDecoder for VideoTrackDecoder {
    fn track_kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn check(&mut self) -> PlaybackResult<()> {
        if self.surface.is_none() && self.provider.is_none() {
            return Err(PlaybackError::MissingConfiguration {
                field: "display surface or surface provider".to_string(),
            });
        }
        Ok(())
    }

    fn init_extractor(&mut self, path: &Path) -> PlaybackResult<Box<dyn Extractor>> {
        self.source.open(path, TrackKind::Video)
    }

    fn init_spec_params(&mut self, format: &MediaFormat) -> PlaybackResult<TrackParams> {
        let width = format.get_u32(keys::WIDTH)?;
        let height = format.get_u32(keys::HEIGHT)?;
        let rotation = format
            .get_i64(keys::ROTATION)
            .map(normalize_rotation)
            .unwrap_or(0);
        Ok(TrackParams {
            width,
            height,
            rotation,
        })
    }

    fn configure_codec(
        &mut self,
        codec: &mut dyn Codec,
        format: &MediaFormat,
        signal: &ResourceSignal,
    ) -> PlaybackResult<CodecSetup> {
        if let Some(surface) = self.available_surface() {
            codec.configure(format, Some(surface.clone()))?;
            info!("Video codec configured against surface {}", surface.name());
            self.surface = Some(surface);
            return Ok(CodecSetup::Configured);
        }

        let Some(provider) = self.provider.clone() else {
            return Err(PlaybackError::MissingConfiguration {
                field: "display surface or surface provider".to_string(),
            });
        };

        if !self.waiting {
            self.waiting = true;
            let slot = self.announced.clone();
            let signal = signal.clone();
            provider.on_surface_created(Box::new(move |surface| {
                *slot.lock() = Some(surface);
                signal.notify();
            }));
            debug!("Video surface not created yet, waiting for provider");
        }
        Ok(CodecSetup::Deferred)
    }

    fn init_render(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn render(&mut self, _buffer: &[u8], _info: &BufferInfo) -> PlaybackResult<()> {
        Ok(())
    }

    fn done_decode(&mut self) {
        self.announced.lock().take();
    }
}

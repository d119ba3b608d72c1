//! # avsync - Synchronized Media Decoding
//!
//! avsync decodes the audio and video tracks of a media file on one worker
//! thread per track. Each worker paces decoded frames against a shared
//! wall-clock reference, so independently decoded tracks stay aligned while
//! playback is paused, resumed and seeked.
//!
//! ## Key Features
//!
//! - **Per-track decode loop**: explicit START / DECODING / PAUSE / SEEKING /
//!   FINISH / STOP state machine
//! - **Wall-clock pacing**: frames are released when their presentation time
//!   comes due, and pauses never cause a burst on resume
//! - **Pluggable collaborators**: extractors, codecs, audio outputs and
//!   display surfaces are traits
//! - **Async events**: follow a player through a `futures::Stream`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avsync::{AvSync, MemorySource, MemoryTrack};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let avsync = AvSync::init()?;
//!
//!     let source = Arc::new(MemorySource::new());
//!     source.register("tone.raw", MemoryTrack::pcm_tone(48_000, 2, 440.0, 2_000, 20));
//!
//!     let mut player = avsync.player("tone.raw").source(source).start()?;
//!     let mut events = player.events().expect("first call");
//!     player.play();
//!
//!     while let Some(event) = events.next().await {
//!         println!("Player event: {:?}", event);
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use avsync_core::{
    keys, BufferFlags, BufferInfo, Codec, CodecFactory, DecodeEngine, DecodeState, DecoderHandle,
    DecoderStateListener, EngineConfig, Extractor, ExtractorSource, Frame, ListenerSet,
    MediaFormat, PlaybackError, PlaybackResult, ProgressListener, Surface, SurfaceProvider,
    TrackDecoder, TrackKind,
};

pub use avsync_media::{
    AudioOutput, AudioOutputConfig, AudioTrackDecoder, CodecRegistry, CpalAudioOutput,
    DeferredSurfaceProvider, MemoryAudioOutput, MemoryExtractor, MemorySample, MemorySource,
    MemorySurface, MemoryTrack, VideoTrackDecoder,
};

#[cfg(feature = "diagnostics")]
pub use avsync_diagnostics::{DebugLogger, PacingProfiler, PacingStats, SessionReport};

// Public API modules
pub mod config;
pub mod event;
pub mod player;

// Re-export main API types
pub use config::{GlobalConfig, PlayerConfig};
pub use event::{ChannelListener, Event, EventStream};
pub use player::{Player, PlayerBuilder};

use player::PlayerSlot;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Main entry point for avsync
#[derive(Debug, Clone)]
pub struct AvSync {
    inner: Arc<AvSyncInner>,
}

#[derive(Debug)]
struct AvSyncInner {
    config: GlobalConfig,
    active_players: AtomicUsize,
}

impl AvSync {
    /// Initialize avsync with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use avsync::AvSync;
    ///
    /// let avsync = AvSync::init()?;
    /// # Ok::<(), avsync::PlaybackError>(())
    /// ```
    pub fn init() -> PlaybackResult<Self> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration
    pub fn init_with(config: GlobalConfig) -> PlaybackResult<Self> {
        if config.max_players == 0 {
            return Err(PlaybackError::Initialization {
                reason: "max_players must be at least 1".to_string(),
            });
        }

        if config.debug_logging {
            #[cfg(feature = "diagnostics")]
            DebugLogger::init_with_filter(&config.log_filter)?;
            #[cfg(not(feature = "diagnostics"))]
            warn!("debug_logging requested without the diagnostics feature");
        }

        debug!("avsync initialized, up to {} players", config.max_players);
        Ok(Self {
            inner: Arc::new(AvSyncInner {
                config,
                active_players: AtomicUsize::new(0),
            }),
        })
    }

    /// Global configuration this instance was initialized with
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Number of players currently alive
    pub fn active_players(&self) -> usize {
        self.inner.active_players.load(Ordering::SeqCst)
    }

    /// Create a player builder for the media at `path`
    ///
    /// # Example
    /// ```rust,no_run
    /// use avsync::{AvSync, MemorySource, MemorySurface};
    /// use std::sync::Arc;
    ///
    /// let avsync = AvSync::init()?;
    /// let player = avsync
    ///     .player("movie.bin")
    ///     .source(Arc::new(MemorySource::new()))
    ///     .surface(Arc::new(MemorySurface::new("window")))
    ///     .start()?;
    /// player.play();
    /// # Ok::<(), avsync::PlaybackError>(())
    /// ```
    pub fn player(&self, path: impl Into<PathBuf>) -> PlayerBuilder {
        PlayerBuilder::new(self, path)
    }

    pub(crate) fn acquire_player_slot(&self) -> PlaybackResult<PlayerSlot> {
        let max = self.inner.config.max_players;
        let acquired = self
            .inner
            .active_players
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                (active < max).then_some(active + 1)
            });
        match acquired {
            Ok(_) => Ok(PlayerSlot::new(self.clone())),
            Err(active) => {
                warn!("Player limit reached ({} of {})", active, max);
                Err(PlaybackError::Initialization {
                    reason: format!("player limit of {} reached", max),
                })
            }
        }
    }

    pub(crate) fn release_player_slot(&self) {
        let _ = self
            .inner
            .active_players
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |active| {
                active.checked_sub(1)
            });
    }
}

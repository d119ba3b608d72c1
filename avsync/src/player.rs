//! Player management and API

use crate::event::{ChannelListener, EventStream};
use crate::{AvSync, PlayerConfig};
use avsync_core::{
    CodecFactory, DecodeEngine, DecodeState, DecoderHandle, DecoderStateListener, ExtractorSource,
    ListenerSet, PlaybackError, PlaybackResult, ProgressListener, Surface, SurfaceProvider,
    TrackDecoder, TrackKind,
};
use avsync_media::{AudioOutput, AudioTrackDecoder, CodecRegistry, CpalAudioOutput, VideoTrackDecoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Fluent builder for player configuration and startup
pub struct PlayerBuilder {
    avsync: AvSync,
    path: PathBuf,
    source: Option<Arc<dyn ExtractorSource>>,
    codecs: Option<Arc<dyn CodecFactory>>,
    audio_output: Option<Box<dyn AudioOutput>>,
    surface: Option<Arc<dyn Surface>>,
    provider: Option<Arc<dyn SurfaceProvider>>,
    config: PlayerConfig,
    listeners: ListenerSet,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl PlayerBuilder {
    pub(crate) fn new(avsync: &AvSync, path: impl Into<PathBuf>) -> Self {
        Self {
            avsync: avsync.clone(),
            path: path.into(),
            source: None,
            codecs: None,
            audio_output: None,
            surface: None,
            provider: None,
            config: PlayerConfig::default(),
            listeners: ListenerSet::new(),
            progress: None,
        }
    }

    /// Demultiplexer for the media file (required)
    pub fn source(mut self, source: Arc<dyn ExtractorSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Decoder factory; defaults to [`CodecRegistry::with_defaults`]
    pub fn codecs(mut self, codecs: Arc<dyn CodecFactory>) -> Self {
        self.codecs = Some(codecs);
        self
    }

    /// Audio sink; defaults to the system output device
    pub fn audio_output(mut self, output: Box<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    /// Display surface for the video track
    pub fn surface(mut self, surface: Arc<dyn Surface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Provider of a display surface that may be created later
    pub fn surface_provider(mut self, provider: Arc<dyn SurfaceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Decode as fast as possible without pacing or rendering
    pub fn without_sync(mut self) -> Self {
        self.config.engine.sync_enabled = false;
        self
    }

    /// Replace the player configuration
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a state listener; every track reports to it
    pub fn listener(mut self, listener: Arc<dyn DecoderStateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Size and position listener
    pub fn progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    /// Spawn one worker per enabled track
    pub fn start(self) -> PlaybackResult<Player> {
        self.config.validate()?;
        let source = self
            .source
            .ok_or_else(|| PlaybackError::MissingConfiguration {
                field: "extractor source".to_string(),
            })?;

        let mut strategies: Vec<Box<dyn TrackDecoder>> = Vec::new();
        if self.config.video_enabled {
            if self.surface.is_some() || self.provider.is_some() {
                let mut video = VideoTrackDecoder::new(source.clone());
                if let Some(surface) = self.surface {
                    video = video.with_surface(surface);
                }
                if let Some(provider) = self.provider {
                    video = video.with_provider(provider);
                }
                strategies.push(Box::new(video));
            } else {
                debug!("No display surface configured, video track skipped");
            }
        }
        if self.config.audio_enabled {
            let output: Box<dyn AudioOutput> = match self.audio_output {
                Some(output) => output,
                None => Box::new(CpalAudioOutput::new()),
            };
            strategies.push(Box::new(AudioTrackDecoder::new(source, output)));
        }
        if strategies.is_empty() {
            return Err(PlaybackError::MissingConfiguration {
                field: "audio output or display surface".to_string(),
            });
        }

        let slot = self.avsync.acquire_player_slot()?;
        let codecs = self
            .codecs
            .unwrap_or_else(|| Arc::new(CodecRegistry::with_defaults()));
        let (channel, events) = ChannelListener::channel();
        let listeners: Arc<dyn DecoderStateListener> =
            Arc::new(self.listeners.with(Arc::new(channel)));

        let mut sessions = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let (engine, handle) = DecodeEngine::new(
                self.path.clone(),
                strategy,
                codecs.clone(),
                self.config.engine.clone(),
            );
            handle.set_state_listener(Some(listeners.clone()));
            handle.set_progress_listener(self.progress.clone());
            if !self.config.start_paused {
                handle.resume();
            }
            sessions.push((engine, handle));
        }

        let mut handles = Vec::with_capacity(sessions.len());
        let mut workers = Vec::with_capacity(sessions.len());
        for (engine, handle) in sessions {
            let name = format!("{}-{}", self.config.worker_name_prefix, handle.track());
            match engine.spawn(name) {
                Ok(worker) => {
                    handles.push(handle);
                    workers.push(worker);
                }
                Err(e) => {
                    // Do not leave already running tracks behind
                    handles.iter().for_each(DecoderHandle::stop);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "Player started for {} with {} track(s)",
            self.path.display(),
            handles.len()
        );
        Ok(Player {
            path: self.path,
            handles,
            workers,
            events: Some(events),
            _slot: slot,
        })
    }
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Releases a player slot when the player goes away
#[derive(Debug)]
pub(crate) struct PlayerSlot {
    avsync: AvSync,
}

impl PlayerSlot {
    pub(crate) fn new(avsync: AvSync) -> Self {
        Self { avsync }
    }
}

impl Drop for PlayerSlot {
    fn drop(&mut self) {
        self.avsync.release_player_slot();
    }
}

/// A running player: one decode session per track, controlled together
#[derive(Debug)]
pub struct Player {
    path: PathBuf,
    handles: Vec<DecoderHandle>,
    workers: Vec<JoinHandle<()>>,
    events: Option<EventStream>,
    _slot: PlayerSlot,
}

impl Player {
    /// Media file being played
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Continue every track
    pub fn play(&self) {
        self.handles.iter().for_each(DecoderHandle::resume);
    }

    /// Hold every track
    pub fn pause(&self) {
        self.handles.iter().for_each(DecoderHandle::pause);
    }

    /// Stop every track; workers tear down and exit
    pub fn stop(&self) {
        self.handles.iter().for_each(DecoderHandle::stop);
    }

    /// Seek every track, then show that frame and hold
    ///
    /// The video track seeks first and the audio track follows to the sync
    /// sample the video landed on, so both resume from the same instant.
    pub fn seek_to(&self, position_ms: i64) -> PlaybackResult<i64> {
        self.seek(position_ms, false)
    }

    /// Seek every track and keep playing
    pub fn seek_and_play(&self, position_ms: i64) -> PlaybackResult<i64> {
        self.seek(position_ms, true)
    }

    fn seek(&self, position_ms: i64, play: bool) -> PlaybackResult<i64> {
        let mut target = position_ms;
        let mut landed = None;
        for handle in &self.handles {
            let actual = if play {
                handle.seek_and_play(target)?
            } else {
                handle.seek_to(target)?
            };
            if landed.is_none() {
                landed = Some(actual);
                target = actual;
            }
        }
        debug!("Player seek to {} ms landed at {:?}", position_ms, landed);
        landed.ok_or(PlaybackError::SessionStopped)
    }

    /// Audio session, when the player decodes audio
    pub fn audio(&self) -> Option<&DecoderHandle> {
        self.track(TrackKind::Audio)
    }

    /// Video session, when the player decodes video
    pub fn video(&self) -> Option<&DecoderHandle> {
        self.track(TrackKind::Video)
    }

    fn track(&self, kind: TrackKind) -> Option<&DecoderHandle> {
        self.handles.iter().find(|handle| handle.track() == kind)
    }

    /// Every session of this player
    pub fn handles(&self) -> &[DecoderHandle] {
        &self.handles
    }

    /// Event stream of all tracks; only the first call gets it
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Whether every track reached its end
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(DecoderHandle::is_finished)
    }

    /// Whether every track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.handles.iter().all(DecoderHandle::is_stopped)
    }

    /// Engine state of each track
    pub fn states(&self) -> Vec<(TrackKind, DecodeState)> {
        self.handles
            .iter()
            .map(|handle| (handle.track(), handle.state()))
            .collect()
    }

    /// Wait for every worker to exit; sessions only exit once stopped
    pub fn join(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Decode worker for {} panicked", self.path.display());
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.stop();
        self.join_workers();
        debug!("Player for {} dropped", self.path.display());
    }
}

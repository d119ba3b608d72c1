//! Decode engine
//!
//! One [`DecodeEngine`] drives one track of one file on a dedicated worker
//! thread. The loop alternates between feeding encoded samples into the codec
//! and pulling decoded buffers out, pacing each buffer against a wall-clock
//! reference so independent audio and video sessions stay aligned.
//!
//! ```text
//!   STOP ──run──▶ START ──first frame──▶ PAUSE ◀──pause── DECODING
//!                   ▲                      │ resume           │
//!                   │ seek_to              └────────▶─────────┘
//!                SEEKING ◀── seek_to / seek_and_play (any state)
//!   DECODING ──end of stream──▶ FINISH ── stop ──▶ STOP
//! ```

pub(crate) mod control;
mod handle;
mod session;

pub use handle::DecoderHandle;
pub use session::SessionInfo;

use crate::buffer::{BufferFlags, BufferInfo, Frame};
use crate::codec::{Codec, CodecFactory, OutputStatus};
use crate::contract::{CodecSetup, ResourceSignal, TrackDecoder};
use crate::error::{PlaybackError, PlaybackResult};
use crate::extractor::Extractor;
use crate::format::{keys, MediaFormat, TrackKind};
use crate::state::DecodeState;
use control::SeekRequest;
use handle::Shared;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long to wait for a free codec input buffer
    #[serde(with = "crate::serde_duration::micros")]
    pub input_timeout: Duration,
    /// How long to wait for decoded output
    #[serde(with = "crate::serde_duration::micros")]
    pub output_timeout: Duration,
    /// How long `seek_to` waits for the worker to reposition
    #[serde(with = "crate::serde_duration::millis")]
    pub seek_timeout: Duration,
    /// Pace output against the wall clock and render it
    pub sync_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_micros(1000),
            output_timeout: Duration::from_micros(1000),
            seek_timeout: Duration::from_secs(2),
            sync_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> PlaybackResult<()> {
        if self.seek_timeout.is_zero() {
            return Err(PlaybackError::InvalidConfiguration {
                reason: "seek_timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Decode loop of a single track
pub struct DecodeEngine {
    shared: Arc<Shared>,
    handle: DecoderHandle,
    kind: TrackKind,
    strategy: Box<dyn TrackDecoder>,
    codecs: Arc<dyn CodecFactory>,
    config: EngineConfig,
    extractor: Option<Box<dyn Extractor>>,
    codec: Option<Box<dyn Codec>>,
    input_eos: bool,
    sync_start: Option<Instant>,
    current_ts_ms: i64,
    observed: DecodeState,
    acquired: bool,
    render_ready: bool,
    released: bool,
}

impl DecodeEngine {
    /// Create a session for `path`; nothing is opened until [`run`](Self::run)
    pub fn new(
        path: impl Into<PathBuf>,
        strategy: Box<dyn TrackDecoder>,
        codecs: Arc<dyn CodecFactory>,
        config: EngineConfig,
    ) -> (Self, DecoderHandle) {
        let kind = strategy.track_kind();
        let shared = Arc::new(Shared::new(
            path.into(),
            kind,
            config.sync_enabled,
            config.seek_timeout,
        ));
        let handle = DecoderHandle::new(shared.clone());
        let engine = Self {
            shared,
            handle: handle.clone(),
            kind,
            strategy,
            codecs,
            config,
            extractor: None,
            codec: None,
            input_eos: false,
            sync_start: None,
            current_ts_ms: 0,
            observed: DecodeState::Stop,
            acquired: false,
            render_ready: false,
            released: false,
        };
        (engine, handle)
    }

    /// Handle controlling this session
    pub fn handle(&self) -> &DecoderHandle {
        &self.handle
    }

    /// Run the session on a new named thread
    pub fn spawn(self, name: impl Into<String>) -> PlaybackResult<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Run the session on the calling thread until it is stopped or fails
    pub fn run(mut self) {
        *self.shared.worker.write() = Some(thread::current().id());

        {
            let mut control = self.shared.control.lock();
            if !control.running {
                info!("{} decoder stopped before start", self.kind);
                return;
            }
            // resume() may already have asked for continuous decoding
            if control.state == DecodeState::Stop {
                control.state = DecodeState::Start;
            }
        }

        if let Some(listener) = self.shared.listener() {
            listener.on_prepare(&self.handle);
        }

        info!(
            "Starting {} decode session for {}",
            self.kind,
            self.handle.file_path().display()
        );

        match self.init() {
            Ok(true) => {}
            Ok(false) => {
                info!("{} decoder stopped during initialization", self.kind);
                self.release();
                return;
            }
            Err(e) => {
                self.report_error(&e);
                self.release();
                return;
            }
        }

        if let Some(listener) = self.shared.listener() {
            listener.on_ready(&self.handle);
        }

        if let Err(e) = self.decode_loop() {
            self.report_error(&e);
        }
        self.release();
    }

    /// Open and configure everything; `Ok(false)` when stopped meanwhile
    fn init(&mut self) -> PlaybackResult<bool> {
        let path = self.handle.file_path();
        if path.as_os_str().is_empty() || !path.exists() {
            return Err(PlaybackError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        self.strategy.check()?;

        let extractor = self.strategy.init_extractor(&path)?;
        self.acquired = true;
        let format = extractor
            .format()
            .cloned()
            .ok_or_else(|| PlaybackError::UnsupportedFormat {
                mime: format!("no {} track in {}", self.kind, path.display()),
            })?;
        self.extractor = Some(extractor);

        self.init_params(&format)?;

        self.strategy.init_render()?;
        self.render_ready = true;

        self.init_codec(&format)
    }

    fn init_params(&mut self, format: &MediaFormat) -> PlaybackResult<()> {
        let duration_ms = format.duration_ms()?;
        let params = self.strategy.init_spec_params(format)?;

        let start_ms = {
            let mut info = self.shared.info.write();
            info.duration_ms = duration_ms;
            if info.end_position_ms == 0 {
                info.end_position_ms = duration_ms;
            }
            info.width = params.width;
            info.height = params.height;
            info.rotation = params.rotation;
            info.format = Some(format.clone());
            info.start_position_ms
        };

        if start_ms > 0 {
            let extractor = self.extractor.as_mut().ok_or_else(codec_missing)?;
            let landed_ms = extractor.set_start_position(start_ms.saturating_mul(1000))? / 1000;
            if landed_ms != start_ms {
                debug!(
                    "{} start position {} ms moved to sync sample at {} ms",
                    self.kind, start_ms, landed_ms
                );
            }
            self.current_ts_ms = landed_ms;
            self.shared.info.write().current_timestamp_ms = landed_ms;
        }

        debug!(
            "{} track: duration {} ms, {}x{} rotation {}",
            self.kind, duration_ms, params.width, params.height, params.rotation
        );

        if self.kind == TrackKind::Video {
            if let Some(progress) = self.shared.progress() {
                progress.on_size_changed(params.width, params.height, params.rotation);
            }
        }
        Ok(())
    }

    fn init_codec(&mut self, format: &MediaFormat) -> PlaybackResult<bool> {
        let mime = format.mime()?;
        self.codec = Some(self.codecs.create_decoder(mime)?);
        let signal = ResourceSignal::new(self.shared.control.clone());

        loop {
            let epoch = self.shared.control.resource_epoch();
            let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
            match self
                .strategy
                .configure_codec(codec.as_mut(), format, &signal)?
            {
                CodecSetup::Configured => break,
                CodecSetup::Deferred => {
                    info!("{} codec configuration deferred, waiting", self.kind);
                    if !self.shared.control.wait_for_resource(epoch) {
                        return Ok(false);
                    }
                    debug!("{} codec resource available, configuring", self.kind);
                }
            }
        }

        let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
        codec.start()?;
        info!("{} codec {} started", self.kind, codec.name());
        Ok(true)
    }

    fn decode_loop(&mut self) -> PlaybackResult<()> {
        loop {
            let (state, running, sync_enabled) = self.shared.control.snapshot();
            if !running {
                break;
            }

            if let Some(request) = self.shared.control.take_seek() {
                self.perform_seek(request)?;
                continue;
            }

            if state != self.observed {
                if state == DecodeState::Decoding {
                    if let Some(listener) = self.shared.listener() {
                        listener.on_running(&self.handle);
                    }
                }
                self.observed = state;
            }

            if !state.is_active() {
                if state == DecodeState::Pause {
                    if let Some(listener) = self.shared.listener() {
                        listener.on_pause(&self.handle);
                    }
                }
                debug!("{} decoder waiting in {}", self.kind, state);
                if !self.shared.control.wait_for_activity() {
                    break;
                }
                self.resync();
                debug!(
                    "{} decoder woke, sync reference at {} ms",
                    self.kind, self.current_ts_ms
                );
                continue;
            }

            if self.sync_start.is_none() {
                self.resync();
            }

            if !self.input_eos {
                self.input_eos = self.push_buffer_to_decoder()?;
            }

            if let Some((index, info)) = self.pull_buffer_from_decoder()? {
                self.handle_output(index, info, state, sync_enabled)?;
            }
        }
        Ok(())
    }

    /// Feed one sample; returns true once end of stream has been queued
    fn push_buffer_to_decoder(&mut self) -> PlaybackResult<bool> {
        let (Some(codec), Some(extractor)) = (self.codec.as_mut(), self.extractor.as_mut()) else {
            return Err(codec_missing());
        };

        let Some(index) = codec.dequeue_input_buffer(self.config.input_timeout)? else {
            return Ok(false);
        };

        let buffer = codec.input_buffer(index)?;
        match extractor.read_sample(buffer)? {
            Some(size) => {
                let flags = extractor.sample_flags();
                let flags = BufferFlags::from_bits(flags.bits() & !BufferFlags::END_OF_STREAM.bits());
                codec.queue_input_buffer(index, 0, size, extractor.current_timestamp(), flags)?;
                Ok(false)
            }
            None => {
                codec.queue_input_buffer(index, 0, 0, 0, BufferFlags::END_OF_STREAM)?;
                debug!("{} input reached end of stream", self.kind);
                Ok(true)
            }
        }
    }

    fn pull_buffer_from_decoder(&mut self) -> PlaybackResult<Option<(usize, BufferInfo)>> {
        let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
        match codec.dequeue_output_buffer(self.config.output_timeout)? {
            OutputStatus::Buffer { index, info } => Ok(Some((index, info))),
            OutputStatus::TryAgainLater => Ok(None),
            OutputStatus::BuffersChanged => {
                debug!("{} output buffers changed", self.kind);
                Ok(None)
            }
            OutputStatus::FormatChanged(format) => {
                debug!("{} output format changed", self.kind);
                self.apply_output_format(&format);
                Ok(None)
            }
        }
    }

    fn apply_output_format(&mut self, format: &MediaFormat) {
        if self.kind != TrackKind::Video {
            return;
        }
        let (Ok(width), Ok(height)) = (format.get_u32(keys::WIDTH), format.get_u32(keys::HEIGHT)) else {
            return;
        };
        let rotation = {
            let mut info = self.shared.info.write();
            if info.width == width && info.height == height {
                return;
            }
            info.width = width;
            info.height = height;
            info.rotation
        };
        if let Some(progress) = self.shared.progress() {
            progress.on_size_changed(width, height, rotation);
        }
    }

    fn handle_output(
        &mut self,
        index: usize,
        info: BufferInfo,
        state: DecodeState,
        sync_enabled: bool,
    ) -> PlaybackResult<()> {
        if info.is_end_of_stream() && info.size == 0 {
            let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
            codec.release_output_buffer(index, false)?;
            self.finish();
            return Ok(());
        }

        let pts_ms = info.presentation_time_ms();
        self.current_ts_ms = pts_ms;
        let past_end = {
            let mut session = self.shared.info.write();
            session.current_timestamp_ms = pts_ms;
            session.is_trimmed() && pts_ms >= session.end_position_ms
        };

        if sync_enabled && state == DecodeState::Decoding && !self.hold_until_due(pts_ms) {
            let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
            codec.release_output_buffer(index, false)?;
            trace!("{} frame at {} ms dropped before presentation", self.kind, pts_ms);
            return Ok(());
        }

        let codec = self.codec.as_mut().ok_or_else(codec_missing)?;
        {
            let buffer = codec.output_buffer(index)?;
            if sync_enabled {
                self.strategy.render(buffer, &info)?;
            }
            if let Some(listener) = self.shared.listener() {
                listener.on_frame(&self.handle, &Frame::new(buffer, info));
            }
        }
        codec.release_output_buffer(index, true)?;
        trace!("{} frame at {} ms delivered", self.kind, pts_ms);

        if let Some(progress) = self.shared.progress() {
            progress.on_progress(pts_ms);
        }

        if self
            .shared
            .control
            .transition(DecodeState::Start, DecodeState::Pause)
        {
            debug!("{} decoder primed first frame", self.kind);
        }

        if info.is_end_of_stream() || past_end {
            self.finish();
        }
        Ok(())
    }

    /// Hold the frame at `pts_ms` until it is due.
    ///
    /// A pause arriving meanwhile keeps the frame and waits for resume; the
    /// frame is presented once due again. Returns false when a seek or stop
    /// made the frame stale.
    fn hold_until_due(&mut self, pts_ms: i64) -> bool {
        loop {
            self.sleep_render(pts_ms);
            let (state, running, seek_pending) = {
                let control = self.shared.control.lock();
                (control.state, control.running, control.seek.is_some())
            };
            if !running || seek_pending {
                return false;
            }
            match state {
                DecodeState::Decoding if self.remaining(pts_ms).is_zero() => return true,
                DecodeState::Decoding => {}
                DecodeState::Pause => {
                    self.observed = DecodeState::Pause;
                    if let Some(listener) = self.shared.listener() {
                        listener.on_pause(&self.handle);
                    }
                    debug!("{} decoder paused holding frame at {} ms", self.kind, pts_ms);
                    if !self.shared.control.wait_for_activity() {
                        return false;
                    }
                    self.resync();
                }
                _ => return true,
            }
        }
    }

    /// Sleep until the wall clock catches up with `pts_ms`
    fn sleep_render(&self, pts_ms: i64) {
        let remaining = self.remaining(pts_ms);
        if !remaining.is_zero() {
            self.shared.control.pace(remaining);
        }
    }

    fn remaining(&self, pts_ms: i64) -> Duration {
        let Some(start) = self.sync_start else {
            return Duration::ZERO;
        };
        let target = Duration::from_millis(pts_ms.max(0) as u64);
        target.saturating_sub(start.elapsed())
    }

    /// Re-anchor the sync reference so the last frame shown maps to now
    fn resync(&mut self) {
        let offset = Duration::from_millis(self.current_ts_ms.max(0) as u64);
        let now = Instant::now();
        self.sync_start = Some(now.checked_sub(offset).unwrap_or(now));
    }

    fn finish(&mut self) {
        let finished = {
            let mut control = self.shared.control.lock();
            // EOS may land right after the primed frame moved START to PAUSE
            let active = control.running
                && matches!(
                    control.state,
                    DecodeState::Start | DecodeState::Decoding | DecodeState::Pause
                );
            if active {
                control.state = DecodeState::Finish;
            }
            active
        };
        if finished {
            self.shared.control.notify();
            info!("{} decoder reached end of stream", self.kind);
            if let Some(listener) = self.shared.listener() {
                listener.on_finish(&self.handle);
            }
        }
    }

    fn perform_seek(&mut self, request: SeekRequest) -> PlaybackResult<()> {
        info!("{} decoder seeking to {} ms", self.kind, request.position_ms);

        match self.reposition(request.position_ms.saturating_mul(1000)) {
            Ok(actual_us) => {
                let actual_ms = actual_us / 1000;
                self.current_ts_ms = actual_ms;
                self.shared.info.write().current_timestamp_ms = actual_ms;
                self.resync();
                self.shared
                    .control
                    .complete_seek(request.ticket, Ok(actual_ms));
                info!("{} decoder landed at {} ms", self.kind, actual_ms);
                Ok(())
            }
            Err(e) => {
                self.shared
                    .control
                    .complete_seek(request.ticket, Err(e.to_string()));
                Err(e)
            }
        }
    }

    fn reposition(&mut self, position_us: i64) -> PlaybackResult<i64> {
        let (Some(codec), Some(extractor)) = (self.codec.as_mut(), self.extractor.as_mut()) else {
            return Err(codec_missing());
        };
        codec.flush()?;
        let actual = extractor.seek(position_us)?;
        self.input_eos = false;
        Ok(actual)
    }

    fn report_error(&self, error: &PlaybackError) {
        error!("{} decoder failed: {}", self.kind, error);
        if let Some(listener) = self.shared.listener() {
            listener.on_error(&self.handle, &error.to_string());
        }
    }

    /// Tear down once, whatever path led here
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.control.stop();

        if self.render_ready {
            self.strategy.done_decode();
        }
        if let Some(mut extractor) = self.extractor.take() {
            extractor.stop();
        }
        if let Some(mut codec) = self.codec.take() {
            if let Err(e) = codec.stop() {
                warn!("{} codec stop failed: {}", self.kind, e);
            }
            codec.release();
        }

        info!("{} decode session released", self.kind);
        if self.acquired {
            if let Some(listener) = self.shared.listener() {
                listener.on_destroy(&self.handle);
            }
        }
    }
}

impl Drop for DecodeEngine {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DecodeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeEngine")
            .field("track", &self.kind)
            .field("config", &self.config)
            .field("input_eos", &self.input_eos)
            .field("released", &self.released)
            .finish()
    }
}

fn codec_missing() -> PlaybackError {
    PlaybackError::InvalidState {
        expected: "configured codec and extractor".to_string(),
        actual: "not initialized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.input_timeout, Duration::from_micros(1000));
        assert_eq!(config.output_timeout, Duration::from_micros(1000));
        assert_eq!(config.seek_timeout, Duration::from_secs(2));
        assert!(config.sync_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_rejects_zero_seek_timeout() {
        let config = EngineConfig {
            seek_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PlaybackError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_engine_config_serde_units() {
        let config = EngineConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["input_timeout"], 1000);
        assert_eq!(json["seek_timeout"], 2000);

        let parsed: EngineConfig =
            serde_json::from_str(r#"{"output_timeout": 5000, "sync_enabled": false}"#).unwrap();
        assert_eq!(parsed.output_timeout, Duration::from_millis(5));
        assert_eq!(parsed.input_timeout, Duration::from_micros(1000));
        assert!(!parsed.sync_enabled);
    }
}

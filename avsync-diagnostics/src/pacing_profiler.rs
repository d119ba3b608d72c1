//! Frame pacing analysis and profiling
//!
//! [`PacingProfiler`] is a [`DecoderStateListener`] that compares the wall
//! clock time each frame is delivered at with its presentation timestamp.
//! Measurement is split into segments: a segment starts at the first frame
//! after a pause or resume and anchors the expected delivery times of the
//! frames that follow.

use avsync_core::{DecoderHandle, DecoderStateListener, Frame, TrackKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Jitter above which a frame counts as late
pub const DEFAULT_LATE_THRESHOLD: Duration = Duration::from_millis(20);

/// Pacing statistics of one track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacingStats {
    /// Frames measured
    pub frames: u64,
    /// Segments started (one per resume or pause)
    pub segments: u64,
    /// Mean absolute deviation from the expected delivery time
    #[serde(with = "avsync_core::serde_duration::micros")]
    pub mean_jitter: Duration,
    /// Largest absolute deviation seen
    #[serde(with = "avsync_core::serde_duration::micros")]
    pub max_jitter: Duration,
    /// Frames whose deviation exceeded the late threshold
    pub late_frames: u64,
}

#[derive(Debug, Default)]
struct TrackPacing {
    anchor: Option<(Instant, i64)>,
    total_jitter: Duration,
    stats: PacingStats,
}

impl TrackPacing {
    fn record(&mut self, pts_ms: i64, at: Instant, late_threshold: Duration) {
        let Some((anchor_at, anchor_pts)) = self.anchor else {
            self.anchor = Some((at, pts_ms));
            self.stats.segments += 1;
            return;
        };

        let expected = Duration::from_millis((pts_ms - anchor_pts).max(0) as u64);
        let actual = at.saturating_duration_since(anchor_at);
        let jitter = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };

        self.stats.frames += 1;
        self.total_jitter += jitter;
        self.stats.mean_jitter = self.total_jitter / self.stats.frames as u32;
        self.stats.max_jitter = self.stats.max_jitter.max(jitter);
        if jitter > late_threshold {
            self.stats.late_frames += 1;
        }
    }
}

/// Profiler measuring frame delivery against presentation timestamps
#[derive(Debug)]
pub struct PacingProfiler {
    enabled: AtomicBool,
    late_threshold: Duration,
    tracks: Mutex<HashMap<TrackKind, TrackPacing>>,
}

impl PacingProfiler {
    /// Create new pacing profiler; profiling starts enabled
    pub fn new() -> Self {
        Self::with_late_threshold(DEFAULT_LATE_THRESHOLD)
    }

    /// Profiler counting frames off by more than `threshold` as late
    pub fn with_late_threshold(threshold: Duration) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            late_threshold: threshold,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    /// Start pacing profiling
    pub fn start_profiling(&self) {
        tracing::info!("Starting pacing profiling");
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Stop pacing profiling; collected statistics are kept
    pub fn stop_profiling(&self) {
        tracing::info!("Stopping pacing profiling");
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Whether frames are currently being measured
    pub fn is_profiling(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Record a frame of `track` delivered at `at`
    pub fn record(&self, track: TrackKind, pts_ms: i64, at: Instant) {
        if !self.is_profiling() {
            return;
        }
        self.tracks
            .lock()
            .entry(track)
            .or_default()
            .record(pts_ms, at, self.late_threshold);
    }

    /// Start a new measurement segment for `track`
    pub fn reset_segment(&self, track: TrackKind) {
        if let Some(pacing) = self.tracks.lock().get_mut(&track) {
            pacing.anchor = None;
        }
    }

    /// Statistics collected for `track`
    pub fn stats(&self, track: TrackKind) -> Option<PacingStats> {
        self.tracks.lock().get(&track).map(|pacing| pacing.stats.clone())
    }

    /// Discard everything collected so far
    pub fn clear(&self) {
        self.tracks.lock().clear();
    }
}

impl Default for PacingProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderStateListener for PacingProfiler {
    fn on_running(&self, decoder: &DecoderHandle) {
        self.reset_segment(decoder.track());
    }

    fn on_pause(&self, decoder: &DecoderHandle) {
        self.reset_segment(decoder.track());
    }

    fn on_frame(&self, decoder: &DecoderHandle, frame: &Frame<'_>) {
        self.record(decoder.track(), frame.timestamp_ms(), Instant::now());
    }

    fn on_finish(&self, decoder: &DecoderHandle) {
        if let Some(stats) = self.stats(decoder.track()) {
            tracing::debug!(
                "{} pacing: {} frames, mean jitter {:?}, max {:?}, {} late",
                decoder.track(),
                stats.frames,
                stats.mean_jitter,
                stats.max_jitter,
                stats.late_frames
            );
        }
    }
}

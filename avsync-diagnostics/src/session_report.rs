//! Decode session state analysis and reports

use crate::pacing_profiler::{PacingProfiler, PacingStats};
use avsync_core::engine::SessionInfo;
use avsync_core::{DecodeState, DecoderHandle, PlaybackError, PlaybackResult};
use serde::{Deserialize, Serialize};

/// Point-in-time report of one decode session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session facts published by the worker
    pub info: SessionInfo,
    /// Engine state when the report was taken
    pub state: DecodeState,
    /// Whether output is paced against the wall clock
    pub sync_enabled: bool,
    /// Playback progress in percent of the effective end
    pub progress_percent: f64,
    /// Pacing statistics, when a profiler observed the session
    pub pacing: Option<PacingStats>,
}

impl SessionReport {
    /// Capture the current state of `decoder`
    pub fn capture(decoder: &DecoderHandle) -> Self {
        let info = decoder.info();
        let end = info.effective_end_ms();
        let progress_percent = if end > 0 {
            let played = (info.current_timestamp_ms - info.start_position_ms).max(0);
            let span = (end - info.start_position_ms).max(1);
            (played as f64 / span as f64 * 100.0).min(100.0)
        } else {
            0.0
        };

        Self {
            info,
            state: decoder.state(),
            sync_enabled: decoder.is_sync_enabled(),
            progress_percent,
            pacing: None,
        }
    }

    /// Capture `decoder` together with the statistics `profiler` collected
    /// for its track
    pub fn capture_with_pacing(decoder: &DecoderHandle, profiler: &PacingProfiler) -> Self {
        let mut report = Self::capture(decoder);
        report.pacing = profiler.stats(decoder.track());
        report
    }

    /// Pretty-printed JSON rendition
    pub fn to_json(&self) -> PlaybackResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlaybackError::InvalidConfiguration {
            reason: format!("session report serialization: {}", e),
        })
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} {} [{}] {}/{} ms",
            self.info.track,
            self.info.path.display(),
            self.state,
            self.info.current_timestamp_ms,
            self.info.effective_end_ms()
        )
    }
}

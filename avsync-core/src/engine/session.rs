//! Per-session facts published by the worker and read by handles

use crate::format::{MediaFormat, TrackKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Snapshot of a decode session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: Uuid,
    /// Media file being decoded
    pub path: PathBuf,
    /// Track decoded by this session
    pub track: TrackKind,
    /// Frame width, 0 until known or for audio
    pub width: u32,
    /// Frame height, 0 until known or for audio
    pub height: u32,
    /// Display rotation in degrees
    pub rotation: u32,
    /// Track duration in milliseconds
    pub duration_ms: i64,
    /// Presentation time of the last delivered frame in milliseconds
    pub current_timestamp_ms: i64,
    /// Requested start position in milliseconds
    pub start_position_ms: i64,
    /// Requested end position in milliseconds, 0 for the full track
    pub end_position_ms: i64,
    /// Track format once the extractor is open
    pub format: Option<MediaFormat>,
}

impl SessionInfo {
    pub(crate) fn new(path: PathBuf, track: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            track,
            width: 0,
            height: 0,
            rotation: 0,
            duration_ms: 0,
            current_timestamp_ms: 0,
            start_position_ms: 0,
            end_position_ms: 0,
            format: None,
        }
    }

    /// Effective end of playback in milliseconds
    pub fn effective_end_ms(&self) -> i64 {
        if self.end_position_ms > 0 && self.end_position_ms < self.duration_ms {
            self.end_position_ms
        } else {
            self.duration_ms
        }
    }

    /// Whether playback stops before the natural end of the track
    pub fn is_trimmed(&self) -> bool {
        self.end_position_ms > 0 && self.end_position_ms < self.duration_ms
    }
}

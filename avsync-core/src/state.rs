//! Decode state of a track session

use serde::{Deserialize, Serialize};

/// Control state of a decode engine.
///
/// Exactly one value is active per session. The loop only performs push/pull
/// work in [`DecodeState::Start`], [`DecodeState::Decoding`] and
/// [`DecodeState::Seeking`]; every other state parks the worker on the
/// session's wait condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodeState {
    /// Loop entered; decode and deliver exactly one frame, then hold
    Start,
    /// Decoding with pacing against the wall clock
    Decoding,
    /// Holding on the wait condition
    Pause,
    /// A seek request is pending on the worker
    Seeking,
    /// The codec reported end of stream
    Finish,
    /// Session released or being released
    Stop,
}

impl DecodeState {
    /// Whether the loop performs work without blocking in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DecodeState::Start | DecodeState::Decoding | DecodeState::Seeking
        )
    }

    /// Short lowercase name used in logs and errors
    pub fn as_str(self) -> &'static str {
        match self {
            DecodeState::Start => "start",
            DecodeState::Decoding => "decoding",
            DecodeState::Pause => "pause",
            DecodeState::Seeking => "seeking",
            DecodeState::Finish => "finish",
            DecodeState::Stop => "stop",
        }
    }
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::Stop
    }
}

impl std::fmt::Display for DecodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Configuration types and defaults

use avsync_core::{EngineConfig, PlaybackError, PlaybackResult};
use serde::{Deserialize, Serialize};

/// Global avsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Install the tracing subscriber during initialization
    pub debug_logging: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Maximum number of players alive at once
    pub max_players: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_filter: "info".to_string(),
            max_players: 16,
        }
    }
}

/// Player-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Decode engine tuning shared by every track
    pub engine: EngineConfig,
    /// Decode the audio track
    pub audio_enabled: bool,
    /// Decode the video track (needs a surface or surface provider)
    pub video_enabled: bool,
    /// Show the first frame and hold until `play`
    pub start_paused: bool,
    /// Worker thread names are `<prefix>-audio` and `<prefix>-video`
    pub worker_name_prefix: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            audio_enabled: true,
            video_enabled: true,
            start_paused: true,
            worker_name_prefix: "avsync".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> PlaybackResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PlaybackError::InvalidConfiguration {
                reason: format!("player config: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no player can start with
    pub fn validate(&self) -> PlaybackResult<()> {
        self.engine.validate()?;
        if !self.audio_enabled && !self.video_enabled {
            return Err(PlaybackError::InvalidConfiguration {
                reason: "both audio and video are disabled".to_string(),
            });
        }
        if self.worker_name_prefix.is_empty() {
            return Err(PlaybackError::InvalidConfiguration {
                reason: "worker_name_prefix must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

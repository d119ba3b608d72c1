//! Track format metadata
//!
//! A [`MediaFormat`] is the string-keyed description an extractor publishes
//! for a track and a codec is configured with. Only the keys listed in
//! [`keys`] are interpreted by the engine; everything else passes through.

use crate::error::{PlaybackError, PlaybackResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known format keys
pub mod keys {
    /// MIME type, e.g. `audio/raw` or `video/avc`
    pub const MIME: &str = "mime";
    /// Track duration in microseconds
    pub const DURATION_US: &str = "durationUs";
    /// Video width in pixels
    pub const WIDTH: &str = "width";
    /// Video height in pixels
    pub const HEIGHT: &str = "height";
    /// Audio channel count
    pub const CHANNEL_COUNT: &str = "channel-count";
    /// Audio sample rate in Hz
    pub const SAMPLE_RATE: &str = "sample-rate";
    /// PCM sample encoding, see [`super::PcmEncoding`]
    pub const PCM_ENCODING: &str = "pcm-encoding";
    /// Clockwise display rotation in degrees
    pub const ROTATION: &str = "rotation-degrees";
    /// Largest encoded sample in bytes
    pub const MAX_INPUT_SIZE: &str = "max-input-size";
}

/// Single format value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatValue {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Str(String),
}

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// Derive the track kind from a MIME type prefix
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("audio/") {
            Some(TrackKind::Audio)
        } else if mime.starts_with("video/") {
            Some(TrackKind::Video)
        } else {
            None
        }
    }

    /// Lowercase name for logs and thread names
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PCM sample encoding of decoded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcmEncoding {
    /// Unsigned 8-bit samples
    Pcm8,
    /// Signed 16-bit little-endian samples
    Pcm16,
    /// 32-bit little-endian float samples
    PcmFloat,
}

impl PcmEncoding {
    /// Numeric code stored under [`keys::PCM_ENCODING`]
    pub fn code(self) -> i64 {
        match self {
            PcmEncoding::Pcm16 => 2,
            PcmEncoding::Pcm8 => 3,
            PcmEncoding::PcmFloat => 4,
        }
    }

    /// Parse a numeric encoding code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(PcmEncoding::Pcm16),
            3 => Some(PcmEncoding::Pcm8),
            4 => Some(PcmEncoding::PcmFloat),
            _ => None,
        }
    }

    /// Bytes per single-channel sample
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmEncoding::Pcm8 => 1,
            PcmEncoding::Pcm16 => 2,
            PcmEncoding::PcmFloat => 4,
        }
    }
}

impl Default for PcmEncoding {
    fn default() -> Self {
        Self::Pcm16
    }
}

/// Key/value description of a media track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    entries: BTreeMap<String, FormatValue>,
}

impl MediaFormat {
    /// Create an empty format
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a format carrying only a MIME type
    pub fn with_mime(mime: &str) -> Self {
        let mut format = Self::new();
        format.set_string(keys::MIME, mime);
        format
    }

    /// Raw audio format
    pub fn audio(mime: &str, sample_rate: u32, channels: u16) -> Self {
        let mut format = Self::with_mime(mime);
        format.set_i64(keys::SAMPLE_RATE, sample_rate as i64);
        format.set_i64(keys::CHANNEL_COUNT, channels as i64);
        format
    }

    /// Raw video format
    pub fn video(mime: &str, width: u32, height: u32) -> Self {
        let mut format = Self::with_mime(mime);
        format.set_i64(keys::WIDTH, width as i64);
        format.set_i64(keys::HEIGHT, height as i64);
        format
    }

    /// Builder-style setter for an integer key
    pub fn with_i64(mut self, key: &str, value: i64) -> Self {
        self.set_i64(key, value);
        self
    }

    /// Set an integer value
    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.entries.insert(key.to_string(), FormatValue::Int(value));
    }

    /// Set a float value
    pub fn set_f64(&mut self, key: &str, value: f64) {
        self.entries
            .insert(key.to_string(), FormatValue::Float(value));
    }

    /// Set a string value
    pub fn set_string(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_string(), FormatValue::Str(value.to_string()));
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw value lookup
    pub fn get(&self, key: &str) -> Option<&FormatValue> {
        self.entries.get(key)
    }

    /// Integer lookup, failing when the key is absent or not numeric
    pub fn get_i64(&self, key: &str) -> PlaybackResult<i64> {
        match self.entries.get(key) {
            Some(FormatValue::Int(value)) => Ok(*value),
            Some(FormatValue::Float(value)) => Ok(*value as i64),
            _ => Err(PlaybackError::MissingFormatKey {
                key: key.to_string(),
            }),
        }
    }

    /// Integer lookup narrowed to `u32`
    pub fn get_u32(&self, key: &str) -> PlaybackResult<u32> {
        let value = self.get_i64(key)?;
        u32::try_from(value).map_err(|_| PlaybackError::InvalidConfiguration {
            reason: format!("{} out of range: {}", key, value),
        })
    }

    /// String lookup
    pub fn get_str(&self, key: &str) -> PlaybackResult<&str> {
        match self.entries.get(key) {
            Some(FormatValue::Str(value)) => Ok(value.as_str()),
            _ => Err(PlaybackError::MissingFormatKey {
                key: key.to_string(),
            }),
        }
    }

    /// MIME type of the track
    pub fn mime(&self) -> PlaybackResult<&str> {
        self.get_str(keys::MIME)
    }

    /// Track kind derived from the MIME type
    pub fn track_kind(&self) -> Option<TrackKind> {
        self.mime().ok().and_then(TrackKind::from_mime)
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> PlaybackResult<i64> {
        Ok(self.get_i64(keys::DURATION_US)? / 1000)
    }

    /// Iterate over all entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let format = MediaFormat::audio("audio/raw", 44100, 2).with_i64(keys::DURATION_US, 2_500_000);

        assert_eq!(format.mime().unwrap(), "audio/raw");
        assert_eq!(format.get_u32(keys::SAMPLE_RATE).unwrap(), 44100);
        assert_eq!(format.duration_ms().unwrap(), 2500);
        assert_eq!(format.track_kind(), Some(TrackKind::Audio));
    }

    #[test]
    fn test_missing_key_reports_name() {
        let format = MediaFormat::with_mime("video/raw");
        match format.get_i64(keys::WIDTH) {
            Err(PlaybackError::MissingFormatKey { key }) => assert_eq!(key, "width"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_pcm_encoding_codes() {
        for encoding in [PcmEncoding::Pcm8, PcmEncoding::Pcm16, PcmEncoding::PcmFloat] {
            assert_eq!(PcmEncoding::from_code(encoding.code()), Some(encoding));
        }
        assert_eq!(PcmEncoding::from_code(99), None);
    }

    #[test]
    fn test_json_shape() {
        let format = MediaFormat::video("video/raw", 320, 240);
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["entries"]["width"], 320);
        assert_eq!(json["entries"]["mime"], "video/raw");
    }
}

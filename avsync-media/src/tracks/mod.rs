//! Track strategies
//!
//! The two [`TrackDecoder`](avsync_core::TrackDecoder) implementations the
//! engine is specialized with: audio writes decoded PCM into an
//! [`AudioOutput`](crate::render::AudioOutput), video lets the codec present
//! frames to a display surface.

mod audio;
mod video;

pub use audio::AudioTrackDecoder;
pub use video::VideoTrackDecoder;

/// Normalize a rotation to one of 0, 90, 180 or 270 degrees
pub fn normalize_rotation(degrees: i64) -> u32 {
    let degrees = degrees.rem_euclid(360);
    ((degrees + 45) / 90 % 4 * 90) as u32
}

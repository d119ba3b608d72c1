//! # avsync Media
//!
//! Concrete collaborators for the avsync decode engine: an in-memory
//! extractor, a buffer-indexed software codec with pluggable transforms,
//! audio outputs, display surfaces and the audio and video track strategies.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod codecs;
pub mod memory;
pub mod render;
pub mod surface;
pub mod tracks;

// Re-export main types
pub use codecs::{CodecRegistry, FrameTransform, PassthroughTransform, SoftwareCodec};
#[cfg(feature = "h264")]
pub use codecs::H264Transform;
#[cfg(feature = "opus")]
pub use codecs::OpusTransform;
pub use memory::{MemoryExtractor, MemorySample, MemorySource, MemoryTrack};
pub use render::{AudioOutput, AudioOutputConfig, CpalAudioOutput, MemoryAudioOutput, RenderError};
pub use surface::{DeferredSurfaceProvider, MemorySurface, PresentedFrame};
pub use tracks::{AudioTrackDecoder, VideoTrackDecoder};

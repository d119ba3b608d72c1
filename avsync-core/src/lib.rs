//! # avsync Core
//!
//! The decode engine shared by every media track, and the capability
//! contracts it is written against.
//!
//! A track session pulls encoded samples from an [`Extractor`], pushes them
//! through a buffer-indexed [`Codec`], paces decoded output against the wall
//! clock and hands each [`Frame`] to the registered listeners. Track specific
//! behavior (audio output, display surfaces) plugs in through the
//! [`TrackDecoder`] contract.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod codec;
pub mod contract;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod format;
pub mod listener;
pub mod serde_duration;
pub mod state;
pub mod surface;

// Re-export main types
pub use buffer::{BufferFlags, BufferInfo, Frame};
pub use codec::{Codec, CodecFactory, OutputStatus};
pub use contract::{CodecSetup, ResourceSignal, TrackDecoder, TrackParams};
pub use engine::{DecodeEngine, DecoderHandle, EngineConfig};
pub use error::{ErrorCategory, PlaybackError, PlaybackResult};
pub use extractor::{Extractor, ExtractorSource};
pub use format::{keys, FormatValue, MediaFormat, PcmEncoding, TrackKind};
pub use listener::{DecoderStateListener, ListenerSet, ProgressListener};
pub use state::DecodeState;
pub use surface::{Surface, SurfaceCallback, SurfaceProvider};

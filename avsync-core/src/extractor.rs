//! Extractor capability
//!
//! An extractor demultiplexes a container and yields the encoded samples of
//! a single track. Container formats are entirely the implementation's
//! business; the engine only relies on the calls below.

use crate::buffer::BufferFlags;
use crate::error::PlaybackResult;
use crate::format::{MediaFormat, TrackKind};
use std::path::Path;

/// Demultiplexer bound to a single track
pub trait Extractor: Send {
    /// Format of the selected track
    fn format(&self) -> Option<&MediaFormat>;

    /// Read the next encoded sample into `buffer`.
    ///
    /// Returns the number of bytes written, or `None` once the track is
    /// exhausted.
    fn read_sample(&mut self, buffer: &mut [u8]) -> PlaybackResult<Option<usize>>;

    /// Timestamp of the last sample read, in microseconds
    fn current_timestamp(&self) -> i64;

    /// Flags of the last sample read
    fn sample_flags(&self) -> BufferFlags;

    /// Seek to the sync sample at or before `position_us`, returning the
    /// timestamp actually landed on
    fn seek(&mut self, position_us: i64) -> PlaybackResult<i64>;

    /// Position decoding starts from, in microseconds; returns the sync
    /// sample timestamp reading will actually begin at
    fn set_start_position(&mut self, position_us: i64) -> PlaybackResult<i64>;

    /// Stop reading and release the underlying source
    fn stop(&mut self);
}

/// Opens extractors for media paths
pub trait ExtractorSource: Send + Sync {
    /// Open `path` and select its first track of `kind`
    fn open(&self, path: &Path, kind: TrackKind) -> PlaybackResult<Box<dyn Extractor>>;
}

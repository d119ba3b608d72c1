//! Buffer metadata and decoded frames

use serde::{Deserialize, Serialize};

/// Bit set of sample / buffer flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferFlags(u32);

impl BufferFlags {
    /// No flags
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Sample is a sync (key) frame
    pub const SYNC_FRAME: BufferFlags = BufferFlags(1);
    /// Buffer carries codec configuration data rather than media
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    /// Last buffer of the stream
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    /// Build from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// End-of-stream shorthand
    pub const fn is_end_of_stream(self) -> bool {
        self.contains(BufferFlags::END_OF_STREAM)
    }

    /// Sync frame shorthand
    pub const fn is_sync_frame(self) -> bool {
        self.contains(BufferFlags::SYNC_FRAME)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

/// Metadata the codec attaches to a decoded output buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    /// Start of valid data within the buffer
    pub offset: usize,
    /// Number of valid bytes
    pub size: usize,
    /// Presentation timestamp in microseconds
    pub presentation_time_us: i64,
    /// Buffer flags
    pub flags: BufferFlags,
}

impl BufferInfo {
    /// Create buffer info for `size` bytes at offset zero
    pub fn new(size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self {
            offset: 0,
            size,
            presentation_time_us,
            flags,
        }
    }

    /// Presentation timestamp in milliseconds
    pub fn presentation_time_ms(&self) -> i64 {
        self.presentation_time_us / 1000
    }

    /// Whether this buffer ends the stream
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }
}

/// A decoded frame handed to listeners.
///
/// The frame borrows the codec's output buffer; the buffer is released back
/// to the codec as soon as the `on_frame` callback returns, so a frame can
/// never outlive the callback.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    info: BufferInfo,
}

impl<'a> Frame<'a> {
    /// Wrap a decoded buffer and its metadata
    pub fn new(buffer: &'a [u8], info: BufferInfo) -> Self {
        Self { buffer, info }
    }

    /// Valid decoded bytes, honoring the metadata offset and size
    pub fn data(&self) -> &'a [u8] {
        let start = self.info.offset.min(self.buffer.len());
        let end = (start + self.info.size).min(self.buffer.len());
        &self.buffer[start..end]
    }

    /// Whole underlying buffer
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Buffer metadata
    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    /// Presentation timestamp in milliseconds
    pub fn timestamp_ms(&self) -> i64 {
        self.info.presentation_time_ms()
    }

    /// Whether this frame carries the end-of-stream marker
    pub fn is_end_of_stream(&self) -> bool {
        self.info.is_end_of_stream()
    }
}

//! In-memory media
//!
//! [`MemorySource`] maps file paths to pre-demultiplexed tracks, and
//! [`MemoryExtractor`] serves their samples to a decode session. Useful for
//! headless playback, generated test media and embedding applications that
//! demultiplex on their own.

use avsync_core::{
    keys, BufferFlags, Extractor, ExtractorSource, MediaFormat, PcmEncoding, PlaybackError,
    PlaybackResult, TrackKind,
};
use bytes::Bytes;
use dashmap::DashMap;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One encoded sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySample {
    /// Sample bytes
    pub data: Bytes,
    /// Presentation timestamp in microseconds
    pub timestamp_us: i64,
    /// Sample flags
    pub flags: BufferFlags,
}

impl MemorySample {
    /// Sample that decoding can start from
    pub fn sync(data: impl Into<Bytes>, timestamp_us: i64) -> Self {
        Self {
            data: data.into(),
            timestamp_us,
            flags: BufferFlags::SYNC_FRAME,
        }
    }

    /// Sample that depends on earlier samples
    pub fn delta(data: impl Into<Bytes>, timestamp_us: i64) -> Self {
        Self {
            data: data.into(),
            timestamp_us,
            flags: BufferFlags::NONE,
        }
    }
}

/// A demultiplexed track: format plus samples in decode order
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrack {
    format: MediaFormat,
    samples: Vec<MemorySample>,
}

impl MemoryTrack {
    /// Track with no samples yet
    pub fn new(format: MediaFormat) -> Self {
        Self {
            format,
            samples: Vec::new(),
        }
    }

    /// Track with the given samples
    pub fn with_samples(format: MediaFormat, samples: Vec<MemorySample>) -> Self {
        let mut track = Self::new(format);
        track.samples = samples;
        track
    }

    /// Append a sample
    pub fn push(&mut self, sample: MemorySample) {
        self.samples.push(sample);
    }

    /// Track format; the duration is derived from the samples when absent
    pub fn format(&self) -> MediaFormat {
        let mut format = self.format.clone();
        if !format.contains_key(keys::DURATION_US) {
            format.set_i64(keys::DURATION_US, self.derived_duration_us());
        }
        format
    }

    /// Samples in decode order
    pub fn samples(&self) -> &[MemorySample] {
        &self.samples
    }

    /// Kind of the track, from its MIME type
    pub fn kind(&self) -> Option<TrackKind> {
        self.format.track_kind()
    }

    fn derived_duration_us(&self) -> i64 {
        let mut timestamps: Vec<i64> = self.samples.iter().map(|s| s.timestamp_us).collect();
        timestamps.sort_unstable();
        match timestamps.as_slice() {
            [] => 0,
            [only] => *only,
            [.., previous, last] => last + (last - previous),
        }
    }

    /// Raw PCM16 sine tone cut into `chunk_ms` samples
    pub fn pcm_tone(
        sample_rate: u32,
        channels: u16,
        frequency: f32,
        duration_ms: u32,
        chunk_ms: u32,
    ) -> Self {
        let chunk_ms = chunk_ms.max(1);
        let frames_per_chunk = (sample_rate as usize * chunk_ms as usize / 1000).max(1);
        let total_frames = sample_rate as usize * duration_ms as usize / 1000;

        let format = MediaFormat::audio("audio/raw", sample_rate, channels)
            .with_i64(keys::PCM_ENCODING, PcmEncoding::Pcm16.code())
            .with_i64(keys::DURATION_US, duration_ms as i64 * 1000)
            .with_i64(
                keys::MAX_INPUT_SIZE,
                (frames_per_chunk * channels as usize * 2) as i64,
            );

        let mut track = Self::new(format);
        let mut frame = 0;
        while frame < total_frames {
            let count = frames_per_chunk.min(total_frames - frame);
            let mut data = Vec::with_capacity(count * channels as usize * 2);
            for i in frame..frame + count {
                let t = i as f32 / sample_rate as f32;
                let value = ((2.0 * PI * frequency * t).sin() * i16::MAX as f32 * 0.25) as i16;
                for _ in 0..channels {
                    data.extend_from_slice(&value.to_le_bytes());
                }
            }
            let timestamp_us = frame as i64 * 1_000_000 / sample_rate as i64;
            track.push(MemorySample::sync(data, timestamp_us));
            frame += count;
        }
        track
    }

    /// Raw video frames of a moving gradient; every `gop`-th frame is a sync
    /// frame
    pub fn video_pattern(width: u32, height: u32, fps: u32, frames: u32, gop: u32) -> Self {
        let fps = fps.max(1);
        let gop = gop.max(1);
        let frame_size = width as usize * height as usize * 3;
        let format = MediaFormat::video("video/raw", width, height)
            .with_i64(
                keys::DURATION_US,
                frames as i64 * 1_000_000 / fps as i64,
            )
            .with_i64(keys::MAX_INPUT_SIZE, frame_size as i64);

        let mut track = Self::new(format);
        for index in 0..frames {
            let shade = (index * 8 % 256) as u8;
            let data: Vec<u8> = (0..frame_size)
                .map(|i| shade.wrapping_add((i % 256) as u8))
                .collect();
            let timestamp_us = index as i64 * 1_000_000 / fps as i64;
            let sample = if index % gop == 0 {
                MemorySample::sync(data, timestamp_us)
            } else {
                MemorySample::delta(data, timestamp_us)
            };
            track.push(sample);
        }
        track
    }
}

/// Extractor over a [`MemoryTrack`]
#[derive(Debug)]
pub struct MemoryExtractor {
    format: MediaFormat,
    samples: Vec<MemorySample>,
    position: usize,
    last: Option<usize>,
    stopped: bool,
}

impl MemoryExtractor {
    /// Extractor positioned at the first sample of `track`
    pub fn new(track: &MemoryTrack) -> Self {
        Self {
            format: track.format(),
            samples: track.samples.clone(),
            position: 0,
            last: None,
            stopped: false,
        }
    }

    /// Index of the next sample to read
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Extractor for MemoryExtractor {
    fn format(&self) -> Option<&MediaFormat> {
        Some(&self.format)
    }

    fn read_sample(&mut self, buffer: &mut [u8]) -> PlaybackResult<Option<usize>> {
        if self.stopped {
            return Err(PlaybackError::extractor("extractor stopped"));
        }
        let Some(sample) = self.samples.get(self.position) else {
            return Ok(None);
        };
        let size = sample.data.len();
        if size > buffer.len() {
            return Err(PlaybackError::BufferOverflow {
                size,
                capacity: buffer.len(),
            });
        }
        buffer[..size].copy_from_slice(&sample.data);
        self.last = Some(self.position);
        self.position += 1;
        Ok(Some(size))
    }

    fn current_timestamp(&self) -> i64 {
        self.last
            .and_then(|index| self.samples.get(index))
            .map(|sample| sample.timestamp_us)
            .unwrap_or(0)
    }

    fn sample_flags(&self) -> BufferFlags {
        self.last
            .and_then(|index| self.samples.get(index))
            .map(|sample| sample.flags)
            .unwrap_or(BufferFlags::NONE)
    }

    fn seek(&mut self, position_us: i64) -> PlaybackResult<i64> {
        if self.stopped {
            return Err(PlaybackError::extractor("extractor stopped"));
        }
        let index = self
            .samples
            .iter()
            .rposition(|s| s.flags.is_sync_frame() && s.timestamp_us <= position_us)
            .or_else(|| self.samples.iter().position(|s| s.flags.is_sync_frame()))
            .unwrap_or(0);
        self.position = index;
        self.last = None;
        let landed = self.samples.get(index).map(|s| s.timestamp_us).unwrap_or(0);
        debug!("Memory extractor seek to {} us landed at {} us", position_us, landed);
        Ok(landed)
    }

    fn set_start_position(&mut self, position_us: i64) -> PlaybackResult<i64> {
        self.seek(position_us)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Registry of in-memory media keyed by path
#[derive(Debug, Default)]
pub struct MemorySource {
    media: DashMap<PathBuf, Vec<MemoryTrack>>,
}

impl MemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track to the media at `path`
    pub fn register(&self, path: impl Into<PathBuf>, track: MemoryTrack) {
        self.media.entry(path.into()).or_default().push(track);
    }

    /// Remove the media at `path`
    pub fn remove(&self, path: &Path) -> Option<Vec<MemoryTrack>> {
        self.media.remove(path).map(|(_, tracks)| tracks)
    }

    /// Whether media is registered at `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.media.contains_key(path)
    }
}

impl ExtractorSource for MemorySource {
    fn open(&self, path: &Path, kind: TrackKind) -> PlaybackResult<Box<dyn Extractor>> {
        let tracks = self
            .media
            .get(path)
            .ok_or_else(|| PlaybackError::extractor(format!(
                "no media registered for {}",
                path.display()
            )))?;
        let track = tracks
            .iter()
            .find(|track| track.kind() == Some(kind))
            .ok_or_else(|| PlaybackError::UnsupportedFormat {
                mime: format!("no {} track in {}", kind, path.display()),
            })?;
        Ok(Box::new(MemoryExtractor::new(track)))
    }
}

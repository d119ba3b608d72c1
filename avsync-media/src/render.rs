//! Audio output sinks
//!
//! This module provides the [`AudioOutput`] interface the audio track writes
//! decoded PCM into, a device backed implementation using CPAL and an
//! in-memory capture used for headless playback and tests.

use avsync_core::{PcmEncoding, PlaybackError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Errors raised by audio outputs and surfaces
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device not found or not available
    #[error("Device not found: {device}")]
    DeviceNotFound {
        /// Device name that was not found
        device: String,
    },

    /// Configuration not supported
    #[error("Configuration not supported: {reason}")]
    ConfigurationNotSupported {
        /// Reason why configuration is not supported
        reason: String,
    },

    /// Output stream error
    #[error("Render stream error: {reason}")]
    StreamError {
        /// Reason for the stream error
        reason: String,
    },

    /// Output used before `open`
    #[error("Audio output is not open")]
    NotOpen,

    /// Output used after `release`
    #[error("Audio output has been released")]
    Released,
}

impl From<RenderError> for PlaybackError {
    fn from(error: RenderError) -> Self {
        PlaybackError::Render {
            reason: error.to_string(),
        }
    }
}

/// PCM stream parameters of an audio output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOutputConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Encoding of the decoded samples
    pub encoding: PcmEncoding,
}

impl AudioOutputConfig {
    /// Bytes of one interleaved frame in the decoded encoding
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.encoding.bytes_per_sample()
    }

    /// Size in bytes of `millis` of decoded audio
    pub fn bytes_for_millis(&self, millis: u32) -> usize {
        self.sample_rate as usize * millis as usize / 1000 * self.bytes_per_frame()
    }
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            encoding: PcmEncoding::Pcm16,
        }
    }
}

/// Streaming PCM16 sink
pub trait AudioOutput: Send {
    /// Smallest buffer in bytes the output can stream `config` with
    fn min_buffer_size(&self, config: &AudioOutputConfig) -> Result<usize, RenderError>;

    /// Prepare the output for `config` with a `buffer_size` byte buffer
    fn open(&mut self, config: &AudioOutputConfig, buffer_size: usize) -> Result<(), RenderError>;

    /// Start consuming written samples
    fn play(&mut self) -> Result<(), RenderError>;

    /// Queue interleaved samples; returns how many were accepted
    fn write(&mut self, samples: &[i16]) -> Result<usize, RenderError>;

    /// Stop playback
    fn stop(&mut self) -> Result<(), RenderError>;

    /// Free the output; further calls fail with [`RenderError::Released`]
    fn release(&mut self);

    /// Whether the output is playing
    fn is_playing(&self) -> bool;
}

/// Ring buffer between the decode thread and the device callback
#[derive(Debug)]
struct SampleRing {
    samples: Vec<i16>,
    read_pos: usize,
    write_pos: usize,
    capacity: usize,
    underruns: u64,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            capacity,
            underruns: 0,
        }
    }

    fn write(&mut self, data: &[i16]) -> usize {
        let to_write = data.len().min(self.available_write());
        for &sample in &data[..to_write] {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
        to_write
    }

    /// Fill `out` with converted samples, padding with silence on underrun
    fn read_into<S>(&mut self, out: &mut [S], silence: S, convert: impl Fn(i16) -> S)
    where
        S: Copy,
    {
        let to_read = out.len().min(self.available_read());
        for slot in out[..to_read].iter_mut() {
            *slot = convert(self.samples[self.read_pos]);
            self.read_pos = (self.read_pos + 1) % self.capacity;
        }
        if to_read < out.len() {
            self.underruns += 1;
            out[to_read..].fill(silence);
        }
    }

    fn available_read(&self) -> usize {
        if self.write_pos >= self.read_pos {
            self.write_pos - self.read_pos
        } else {
            self.capacity - self.read_pos + self.write_pos
        }
    }

    fn available_write(&self) -> usize {
        self.capacity - self.available_read() - 1
    }

    fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }
}

#[derive(Debug)]
enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// Audio output on the default CPAL device
///
/// A CPAL stream is not guaranteed to be `Send`, so it lives on a dedicated
/// audio thread that receives play/pause commands over a channel. Samples
/// reach the device callback through a shared ring buffer.
pub struct CpalAudioOutput {
    device_name: Option<String>,
    ring: Arc<Mutex<SampleRing>>,
    playing: Arc<AtomicBool>,
    overflowed: Arc<AtomicU64>,
    commands: Option<mpsc::UnboundedSender<StreamCommand>>,
    thread: Option<JoinHandle<()>>,
    released: bool,
}

impl CpalAudioOutput {
    /// Output on the host's default device
    pub fn new() -> Self {
        Self {
            device_name: None,
            ring: Arc::new(Mutex::new(SampleRing::new(2))),
            playing: Arc::new(AtomicBool::new(false)),
            overflowed: Arc::new(AtomicU64::new(0)),
            commands: None,
            thread: None,
            released: false,
        }
    }

    /// Output on the named device
    pub fn with_device(name: impl Into<String>) -> Self {
        let mut output = Self::new();
        output.device_name = Some(name.into());
        output
    }

    /// Samples dropped because the ring buffer was full
    pub fn overflowed_samples(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Device callbacks that found too few samples
    pub fn underruns(&self) -> u64 {
        self.ring.lock().underruns
    }

    fn find_device(name: Option<&str>) -> Result<cpal::Device, RenderError> {
        let host = cpal::default_host();
        match name {
            Some(name) => host
                .output_devices()
                .map_err(|e| RenderError::DeviceNotFound {
                    device: format!("{} ({})", name, e),
                })?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| RenderError::DeviceNotFound {
                    device: name.to_string(),
                }),
            None => host
                .default_output_device()
                .ok_or_else(|| RenderError::DeviceNotFound {
                    device: "default output device".to_string(),
                }),
        }
    }

    fn send(&self, command: StreamCommand) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let commands = self.commands.as_ref().ok_or(RenderError::NotOpen)?;
        commands.send(command).map_err(|_| RenderError::StreamError {
            reason: "audio thread exited".to_string(),
        })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &AudioOutputConfig,
        ring: Arc<Mutex<SampleRing>>,
    ) -> Result<cpal::Stream, RenderError> {
        let supported =
            device
                .default_output_config()
                .map_err(|e| RenderError::ConfigurationNotSupported {
                    reason: format!("Failed to get default output config: {}", e),
                })?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels as cpal::ChannelCount,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let on_error = |err: cpal::StreamError| warn!("Audio output stream error: {}", err);

        match supported.sample_format() {
            cpal::SampleFormat::I16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    ring.lock().read_into(data, 0, |s| s);
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    ring.lock()
                        .read_into(data, u16::MAX / 2 + 1, |s| (s as i32 + 32768) as u16);
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    ring.lock()
                        .read_into(data, 0.0, |s| s as f32 / i16::MAX as f32);
                },
                on_error,
                None,
            ),
            sample_format => {
                return Err(RenderError::ConfigurationNotSupported {
                    reason: format!("Unsupported sample format: {:?}", sample_format),
                })
            }
        }
        .map_err(|e| RenderError::StreamError {
            reason: format!("Failed to build output stream: {}", e),
        })
    }
}

impl Default for CpalAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalAudioOutput {
    fn min_buffer_size(&self, config: &AudioOutputConfig) -> Result<usize, RenderError> {
        let device = Self::find_device(self.device_name.as_deref())?;
        let ranges = device
            .supported_output_configs()
            .map_err(|e| RenderError::ConfigurationNotSupported {
                reason: format!("Failed to query output configs: {}", e),
            })?;

        let min_frames = ranges
            .filter(|range| range.channels() == config.channels)
            .filter(|range| {
                range.min_sample_rate().0 <= config.sample_rate
                    && config.sample_rate <= range.max_sample_rate().0
            })
            .find_map(|range| match range.buffer_size() {
                cpal::SupportedBufferSize::Range { min, .. } => Some(*min as usize),
                cpal::SupportedBufferSize::Unknown => None,
            });

        Ok(match min_frames {
            Some(frames) if frames > 0 => frames * config.bytes_per_frame(),
            _ => config.bytes_for_millis(20),
        })
    }

    fn open(&mut self, config: &AudioOutputConfig, buffer_size: usize) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        if self.commands.is_some() {
            return Err(RenderError::StreamError {
                reason: "Already open".to_string(),
            });
        }

        // Keep roughly half a second queued beyond the device minimum
        let half_second = config.sample_rate as usize * config.channels as usize / 2;
        let capacity = (buffer_size / 2).max(half_second);
        self.ring = Arc::new(Mutex::new(SampleRing::new(capacity)));

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let ring = self.ring.clone();
        let device_name = self.device_name.clone();
        let config = *config;

        let thread = thread::Builder::new()
            .name("avsync-audio-output".to_string())
            .spawn(move || {
                let stream = Self::find_device(device_name.as_deref())
                    .and_then(|device| Self::build_stream(&device, &config, ring));
                let stream = match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Some(command) = command_rx.blocking_recv() {
                    let result = match command {
                        StreamCommand::Play => stream.play().map_err(|e| e.to_string()),
                        StreamCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                        StreamCommand::Shutdown => break,
                    };
                    if let Err(e) = result {
                        warn!("Audio output command failed: {}", e);
                    }
                }
                debug!("Audio output thread exiting");
            })
            .map_err(|e| RenderError::StreamError {
                reason: format!("Failed to spawn audio thread: {}", e),
            })?;

        let ready = ready_rx.blocking_recv().map_err(|_| RenderError::StreamError {
            reason: "audio thread exited during setup".to_string(),
        });
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => {
                let _ = thread.join();
                return Err(e);
            }
        }

        info!(
            "Audio output opened: {} Hz, {} channels, {} sample ring",
            config.sample_rate, config.channels, capacity
        );
        self.commands = Some(command_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn play(&mut self) -> Result<(), RenderError> {
        self.send(StreamCommand::Play)?;
        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        if self.commands.is_none() {
            return Err(RenderError::NotOpen);
        }
        let written = self.ring.lock().write(samples);
        if written < samples.len() {
            self.overflowed
                .fetch_add((samples.len() - written) as u64, Ordering::Relaxed);
        }
        Ok(written)
    }

    fn stop(&mut self) -> Result<(), RenderError> {
        self.send(StreamCommand::Pause)?;
        self.playing.store(false, Ordering::Relaxed);
        self.ring.lock().clear();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.playing.store(false, Ordering::Relaxed);
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(StreamCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
        debug!("Audio output released");
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    config: Option<AudioOutputConfig>,
    buffer_size: usize,
    samples: Vec<i16>,
    writes: usize,
    playing: bool,
    released: bool,
}

/// Audio output that records everything written to it
///
/// Clones share the same capture, so a test can keep one clone and hand
/// another to the audio track.
#[derive(Debug, Clone)]
pub struct MemoryAudioOutput {
    state: Arc<Mutex<CaptureState>>,
    min_buffer_millis: u32,
}

impl MemoryAudioOutput {
    /// Create an empty capture
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::default())),
            min_buffer_millis: 20,
        }
    }

    /// All samples written so far
    pub fn samples(&self) -> Vec<i16> {
        self.state.lock().samples.clone()
    }

    /// Number of samples written so far
    pub fn sample_count(&self) -> usize {
        self.state.lock().samples.len()
    }

    /// Number of `write` calls
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Configuration passed to `open`
    pub fn config(&self) -> Option<AudioOutputConfig> {
        self.state.lock().config
    }

    /// Buffer size passed to `open`
    pub fn buffer_size(&self) -> usize {
        self.state.lock().buffer_size
    }

    /// Whether `release` has been called
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

impl Default for MemoryAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for MemoryAudioOutput {
    fn min_buffer_size(&self, config: &AudioOutputConfig) -> Result<usize, RenderError> {
        Ok(config.bytes_for_millis(self.min_buffer_millis))
    }

    fn open(&mut self, config: &AudioOutputConfig, buffer_size: usize) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(RenderError::Released);
        }
        state.config = Some(*config);
        state.buffer_size = buffer_size;
        Ok(())
    }

    fn play(&mut self) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(RenderError::Released);
        }
        if state.config.is_none() {
            return Err(RenderError::NotOpen);
        }
        state.playing = true;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, RenderError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(RenderError::Released);
        }
        if state.config.is_none() {
            return Err(RenderError::NotOpen);
        }
        state.samples.extend_from_slice(samples);
        state.writes += 1;
        Ok(samples.len())
    }

    fn stop(&mut self) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(RenderError::Released);
        }
        state.playing = false;
        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.released = true;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

//! Codec implementations
//!
//! [`SoftwareCodec`] implements the buffer-index protocol of
//! [`avsync_core::Codec`] on top of a pluggable [`FrameTransform`] that turns
//! one encoded sample into one decoded buffer. Queued input is transformed
//! synchronously as soon as an output slot is free.

use avsync_core::{
    keys, BufferFlags, BufferInfo, Codec, CodecFactory, MediaFormat, OutputStatus,
    PlaybackError, PlaybackResult, Surface,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

#[cfg(feature = "opus")]
use audiopus::{coder::Decoder as OpusDecoder, Channels, SampleRate};

#[cfg(feature = "h264")]
use openh264::{decoder::Decoder as H264Decoder, formats::YUVSource};

/// Number of input buffers in a software codec
pub const INPUT_BUFFER_COUNT: usize = 4;

/// Number of output buffers in a software codec
pub const OUTPUT_BUFFER_COUNT: usize = 4;

/// Input buffer capacity when the format carries no `max-input-size`
pub const DEFAULT_INPUT_CAPACITY: usize = 64 * 1024;

/// Turns one encoded sample into decoded bytes
pub trait FrameTransform: Send {
    /// Transform name for logs
    fn name(&self) -> &str;

    /// Prepare for `format` and return the decoded output format
    fn configure(&mut self, format: &MediaFormat) -> PlaybackResult<MediaFormat>;

    /// Decode `input` into `output` (cleared by the caller). Leaving `output`
    /// empty means the sample produced no frame.
    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> PlaybackResult<()>;

    /// Drop any internal decoder state
    fn flush(&mut self) {}
}

/// Copies samples through unchanged (raw PCM, raw video)
#[derive(Debug, Default, Clone)]
pub struct PassthroughTransform;

impl FrameTransform for PassthroughTransform {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn configure(&mut self, format: &MediaFormat) -> PlaybackResult<MediaFormat> {
        Ok(format.clone())
    }

    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> PlaybackResult<()> {
        output.extend_from_slice(input);
        Ok(())
    }
}

/// Opus packets to interleaved little-endian PCM16
#[cfg(feature = "opus")]
pub struct OpusTransform {
    decoder: Option<OpusDecoder>,
    channels: usize,
    sample_rate: SampleRate,
    scratch: Vec<i16>,
}

#[cfg(feature = "opus")]
impl OpusTransform {
    /// Create an unconfigured transform
    pub fn new() -> Self {
        Self {
            decoder: None,
            channels: 2,
            sample_rate: SampleRate::Hz48000,
            scratch: Vec::new(),
        }
    }
}

#[cfg(feature = "opus")]
impl Default for OpusTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "opus")]
impl FrameTransform for OpusTransform {
    fn name(&self) -> &str {
        "opus"
    }

    fn configure(&mut self, format: &MediaFormat) -> PlaybackResult<MediaFormat> {
        let rate = format.get_u32(keys::SAMPLE_RATE)?;
        let channels = format.get_u32(keys::CHANNEL_COUNT)?;

        self.sample_rate = match rate {
            8000 => SampleRate::Hz8000,
            12000 => SampleRate::Hz12000,
            16000 => SampleRate::Hz16000,
            24000 => SampleRate::Hz24000,
            48000 => SampleRate::Hz48000,
            _ => {
                return Err(PlaybackError::InvalidConfiguration {
                    reason: format!("Unsupported Opus sample rate: {}", rate),
                })
            }
        };
        let layout = if channels == 1 {
            Channels::Mono
        } else {
            Channels::Stereo
        };
        self.channels = if channels == 1 { 1 } else { 2 };
        self.decoder = Some(
            OpusDecoder::new(self.sample_rate, layout)
                .map_err(|e| PlaybackError::codec("opus", format!("{:?}", e)))?,
        );
        // 120 ms is the longest Opus frame
        self.scratch = vec![0; rate as usize * 120 / 1000 * self.channels];

        let mut output = MediaFormat::audio("audio/raw", rate, self.channels as u16);
        if let Ok(duration) = format.get_i64(keys::DURATION_US) {
            output.set_i64(keys::DURATION_US, duration);
        }
        Ok(output)
    }

    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> PlaybackResult<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| PlaybackError::codec("opus", "decoder not configured"))?;
        let frames = decoder
            .decode(Some(input), &mut self.scratch, false)
            .map_err(|e| PlaybackError::codec("opus", format!("{:?}", e)))?;
        for sample in &self.scratch[..frames * self.channels] {
            output.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Ok(decoder) = OpusDecoder::new(
            self.sample_rate,
            if self.channels == 1 {
                Channels::Mono
            } else {
                Channels::Stereo
            },
        ) {
            self.decoder = Some(decoder);
        }
    }
}

/// H.264 access units to packed RGB8 frames
#[cfg(feature = "h264")]
pub struct H264Transform {
    decoder: Option<H264Decoder>,
}

#[cfg(feature = "h264")]
impl H264Transform {
    /// Create an unconfigured transform
    pub fn new() -> Self {
        Self { decoder: None }
    }
}

#[cfg(feature = "h264")]
impl Default for H264Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "h264")]
impl FrameTransform for H264Transform {
    fn name(&self) -> &str {
        "h264"
    }

    fn configure(&mut self, format: &MediaFormat) -> PlaybackResult<MediaFormat> {
        self.decoder = Some(
            H264Decoder::new().map_err(|e| PlaybackError::codec("h264", e.to_string()))?,
        );
        let mut output = format.clone();
        output.set_string(keys::MIME, "video/raw");
        Ok(output)
    }

    fn decode(&mut self, input: &[u8], output: &mut Vec<u8>) -> PlaybackResult<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| PlaybackError::codec("h264", "decoder not configured"))?;
        let decoded = decoder
            .decode(input)
            .map_err(|e| PlaybackError::codec("h264", e.to_string()))?;
        if let Some(yuv) = decoded {
            let (width, height) = yuv.dimensions();
            output.resize(width * height * 3, 0);
            yuv.write_rgb8(output);
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Ok(decoder) = H264Decoder::new() {
            self.decoder = Some(decoder);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecState {
    Uninitialized,
    Configured,
    Running,
    Released,
}

#[derive(Debug, Clone, Copy)]
struct QueuedInput {
    index: usize,
    offset: usize,
    size: usize,
    presentation_time_us: i64,
    flags: BufferFlags,
}

#[derive(Debug, Default)]
struct OutputSlot {
    data: Vec<u8>,
    info: BufferInfo,
}

/// Buffer-indexed codec driving a [`FrameTransform`]
pub struct SoftwareCodec<T: FrameTransform> {
    name: String,
    transform: T,
    state: CodecState,
    surface: Option<Arc<dyn Surface>>,
    output_format: Option<MediaFormat>,
    format_announced: bool,
    inputs: Vec<Vec<u8>>,
    input_owned: Vec<bool>,
    free_inputs: VecDeque<usize>,
    queued: VecDeque<QueuedInput>,
    outputs: Vec<OutputSlot>,
    output_held: Vec<bool>,
    free_outputs: VecDeque<usize>,
    ready: VecDeque<usize>,
    last_pts_us: i64,
}

impl<T: FrameTransform> SoftwareCodec<T> {
    /// Create an unconfigured codec around `transform`
    pub fn new(transform: T) -> Self {
        let name = format!("software.{}", transform.name());
        Self {
            name,
            transform,
            state: CodecState::Uninitialized,
            surface: None,
            output_format: None,
            format_announced: false,
            inputs: Vec::new(),
            input_owned: Vec::new(),
            free_inputs: VecDeque::new(),
            queued: VecDeque::new(),
            outputs: Vec::new(),
            output_held: Vec::new(),
            free_outputs: VecDeque::new(),
            ready: VecDeque::new(),
            last_pts_us: 0,
        }
    }

    /// Whether `start` has been called and the codec not stopped since
    pub fn is_running(&self) -> bool {
        self.state == CodecState::Running
    }

    fn ensure_running(&self) -> PlaybackResult<()> {
        if self.state != CodecState::Running {
            return Err(PlaybackError::InvalidState {
                expected: "running codec".to_string(),
                actual: format!("{:?}", self.state),
            });
        }
        Ok(())
    }

    fn reset_buffers(&mut self) {
        self.queued.clear();
        self.ready.clear();
        self.free_inputs = (0..self.inputs.len()).collect();
        self.free_outputs = (0..self.outputs.len()).collect();
        self.input_owned.iter_mut().for_each(|owned| *owned = false);
        self.output_held.iter_mut().for_each(|held| *held = false);
    }

    /// Transform queued input while output slots are free
    fn process(&mut self) -> PlaybackResult<()> {
        while !self.queued.is_empty() && !self.free_outputs.is_empty() {
            let Some(input) = self.queued.pop_front() else {
                break;
            };
            let Some(slot_index) = self.free_outputs.pop_front() else {
                break;
            };

            let slot = &mut self.outputs[slot_index];
            slot.data.clear();
            let end_of_stream = input.flags.is_end_of_stream();

            if input.size > 0 {
                let data = &self.inputs[input.index][input.offset..input.offset + input.size];
                if let Err(e) = self.transform.decode(data, &mut slot.data) {
                    self.free_inputs.push_back(input.index);
                    self.free_outputs.push_front(slot_index);
                    return Err(e);
                }
            }
            self.free_inputs.push_back(input.index);

            let pts = if end_of_stream && input.size == 0 {
                self.last_pts_us
            } else {
                input.presentation_time_us
            };
            self.last_pts_us = pts;

            if slot.data.is_empty() && !end_of_stream {
                trace!("{} sample at {} us produced no frame", self.name, pts);
                self.free_outputs.push_front(slot_index);
                continue;
            }

            let flags = BufferFlags::from_bits(
                input.flags.bits()
                    & (BufferFlags::END_OF_STREAM.bits() | BufferFlags::SYNC_FRAME.bits()),
            );
            slot.info = BufferInfo::new(slot.data.len(), pts, flags);
            self.ready.push_back(slot_index);
        }
        Ok(())
    }
}

impl<T: FrameTransform> Codec for SoftwareCodec<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(
        &mut self,
        format: &MediaFormat,
        surface: Option<Arc<dyn Surface>>,
    ) -> PlaybackResult<()> {
        if self.state != CodecState::Uninitialized {
            return Err(PlaybackError::InvalidState {
                expected: "uninitialized codec".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let capacity = format
            .get_i64(keys::MAX_INPUT_SIZE)
            .ok()
            .filter(|size| *size > 0)
            .map(|size| size as usize)
            .unwrap_or(DEFAULT_INPUT_CAPACITY);

        self.output_format = Some(self.transform.configure(format)?);
        self.inputs = (0..INPUT_BUFFER_COUNT).map(|_| vec![0; capacity]).collect();
        self.input_owned = vec![false; INPUT_BUFFER_COUNT];
        self.outputs = (0..OUTPUT_BUFFER_COUNT)
            .map(|_| OutputSlot::default())
            .collect();
        self.output_held = vec![false; OUTPUT_BUFFER_COUNT];
        self.reset_buffers();
        self.surface = surface;
        self.state = CodecState::Configured;

        debug!(
            "{} configured: {} byte inputs, surface {}",
            self.name,
            capacity,
            self.surface.as_ref().map(|s| s.name()).unwrap_or("none")
        );
        Ok(())
    }

    fn start(&mut self) -> PlaybackResult<()> {
        if self.state != CodecState::Configured {
            return Err(PlaybackError::InvalidState {
                expected: "configured codec".to_string(),
                actual: format!("{:?}", self.state),
            });
        }
        self.state = CodecState::Running;
        self.format_announced = false;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> PlaybackResult<Option<usize>> {
        self.ensure_running()?;
        self.process()?;
        match self.free_inputs.pop_front() {
            Some(index) => {
                self.input_owned[index] = true;
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    fn input_buffer(&mut self, index: usize) -> PlaybackResult<&mut [u8]> {
        if !self.input_owned.get(index).copied().unwrap_or(false) {
            return Err(PlaybackError::codec(
                &self.name,
                format!("input buffer {} is not dequeued", index),
            ));
        }
        Ok(&mut self.inputs[index])
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> PlaybackResult<()> {
        self.ensure_running()?;
        if !self.input_owned.get(index).copied().unwrap_or(false) {
            return Err(PlaybackError::codec(
                &self.name,
                format!("input buffer {} is not dequeued", index),
            ));
        }
        let capacity = self.inputs[index].len();
        if offset + size > capacity {
            return Err(PlaybackError::BufferOverflow {
                size: offset + size,
                capacity,
            });
        }

        self.input_owned[index] = false;
        self.queued.push_back(QueuedInput {
            index,
            offset,
            size,
            presentation_time_us,
            flags,
        });
        self.process()
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> PlaybackResult<OutputStatus> {
        self.ensure_running()?;
        if !self.format_announced {
            if let Some(format) = self.output_format.clone() {
                self.format_announced = true;
                return Ok(OutputStatus::FormatChanged(format));
            }
        }

        self.process()?;
        if self.ready.is_empty() {
            // Nothing decoded yet; behave like a blocking codec poll
            thread::sleep(timeout);
            return Ok(OutputStatus::TryAgainLater);
        }

        match self.ready.pop_front() {
            Some(index) => {
                self.output_held[index] = true;
                Ok(OutputStatus::Buffer {
                    index,
                    info: self.outputs[index].info,
                })
            }
            None => Ok(OutputStatus::TryAgainLater),
        }
    }

    fn output_buffer(&self, index: usize) -> PlaybackResult<&[u8]> {
        if !self.output_held.get(index).copied().unwrap_or(false) {
            return Err(PlaybackError::codec(
                &self.name,
                format!("output buffer {} is not dequeued", index),
            ));
        }
        Ok(&self.outputs[index].data)
    }

    fn release_output_buffer(&mut self, index: usize, render: bool) -> PlaybackResult<()> {
        if !self.output_held.get(index).copied().unwrap_or(false) {
            return Err(PlaybackError::codec(
                &self.name,
                format!("output buffer {} is not dequeued", index),
            ));
        }

        let slot = &self.outputs[index];
        if render && !slot.data.is_empty() {
            if let Some(surface) = &self.surface {
                surface.present(&slot.data, slot.info.presentation_time_us);
            }
        }

        self.output_held[index] = false;
        self.free_outputs.push_back(index);
        Ok(())
    }

    fn flush(&mut self) -> PlaybackResult<()> {
        if !matches!(self.state, CodecState::Configured | CodecState::Running) {
            return Err(PlaybackError::InvalidState {
                expected: "configured codec".to_string(),
                actual: format!("{:?}", self.state),
            });
        }
        self.reset_buffers();
        self.transform.flush();
        debug!("{} flushed", self.name);
        Ok(())
    }

    fn stop(&mut self) -> PlaybackResult<()> {
        if self.state == CodecState::Released {
            return Err(PlaybackError::InvalidState {
                expected: "live codec".to_string(),
                actual: "Released".to_string(),
            });
        }
        if self.state == CodecState::Running {
            self.state = CodecState::Configured;
        }
        self.reset_buffers();
        Ok(())
    }

    fn release(&mut self) {
        self.state = CodecState::Released;
        self.inputs.clear();
        self.outputs.clear();
        self.input_owned.clear();
        self.output_held.clear();
        self.queued.clear();
        self.ready.clear();
        self.free_inputs.clear();
        self.free_outputs.clear();
        self.surface = None;
        debug!("{} released", self.name);
    }
}

type CodecConstructor = Box<dyn Fn() -> Box<dyn Codec> + Send + Sync>;

/// Codec factory keyed by MIME type
pub struct CodecRegistry {
    constructors: HashMap<String, CodecConstructor>,
}

impl CodecRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with raw passthrough decoders plus the compiled-in codecs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("audio/raw", || SoftwareCodec::new(PassthroughTransform));
        registry.register("video/raw", || SoftwareCodec::new(PassthroughTransform));

        #[cfg(feature = "opus")]
        registry.register("audio/opus", || SoftwareCodec::new(OpusTransform::new()));

        #[cfg(feature = "h264")]
        registry.register("video/avc", || SoftwareCodec::new(H264Transform::new()));

        registry
    }

    /// Register a decoder constructor for `mime`, replacing any previous one
    pub fn register<C, F>(&mut self, mime: &str, constructor: F)
    where
        C: Codec + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.constructors.insert(
            mime.to_string(),
            Box::new(move || Box::new(constructor()) as Box<dyn Codec>),
        );
    }

    /// Whether a decoder is registered for `mime`
    pub fn supports(&self, mime: &str) -> bool {
        self.constructors.contains_key(mime)
    }

    /// Registered MIME types
    pub fn mime_types(&self) -> Vec<String> {
        let mut mimes: Vec<String> = self.constructors.keys().cloned().collect();
        mimes.sort();
        mimes
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecFactory for CodecRegistry {
    fn create_decoder(&self, mime: &str) -> PlaybackResult<Box<dyn Codec>> {
        let constructor =
            self.constructors
                .get(mime)
                .ok_or_else(|| PlaybackError::UnsupportedFormat {
                    mime: mime.to_string(),
                })?;
        Ok(constructor())
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}

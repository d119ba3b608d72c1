use crate::render::{AudioOutput, AudioOutputConfig};
use avsync_core::{
    keys, BufferInfo, Codec, CodecSetup, Extractor, ExtractorSource, MediaFormat, PcmEncoding,
    PlaybackError, PlaybackResult, ResourceSignal, TrackDecoder, TrackKind, TrackParams,
};
use bytes::Buf;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Audio track strategy: decoded PCM goes to an [`AudioOutput`]
pub struct AudioTrackDecoder {
    source: Arc<dyn ExtractorSource>,
    output: Box<dyn AudioOutput>,
    config: Option<AudioOutputConfig>,
    scratch: Vec<i16>,
    opened: bool,
}

impl AudioTrackDecoder {
    /// Strategy reading from `source` and playing through `output`
    pub fn new(source: Arc<dyn ExtractorSource>, output: Box<dyn AudioOutput>) -> Self {
        Self {
            source,
            output,
            config: None,
            scratch: Vec::new(),
            opened: false,
        }
    }

    /// Output configuration parsed from the track format
    pub fn output_config(&self) -> Option<AudioOutputConfig> {
        self.config
    }

    /// Convert `data` into interleaved PCM16 in the scratch buffer
    fn convert(&mut self, mut data: &[u8], encoding: PcmEncoding) {
        let samples = data.len() / encoding.bytes_per_sample();
        self.scratch.clear();
        if self.scratch.capacity() < samples {
            self.scratch.reserve(samples);
        }
        match encoding {
            PcmEncoding::Pcm16 => {
                while data.remaining() >= 2 {
                    self.scratch.push(data.get_i16_le());
                }
            }
            PcmEncoding::Pcm8 => {
                while data.has_remaining() {
                    self.scratch.push((data.get_u8() as i16 - 128) << 8);
                }
            }
            PcmEncoding::PcmFloat => {
                while data.remaining() >= 4 {
                    let value = data.get_f32_le().clamp(-1.0, 1.0);
                    self.scratch.push((value * i16::MAX as f32) as i16);
                }
            }
        }
    }
}

impl TrackDecoder for AudioTrackDecoder {
    fn track_kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn check(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn init_extractor(&mut self, path: &Path) -> PlaybackResult<Box<dyn Extractor>> {
        self.source.open(path, TrackKind::Audio)
    }

    fn init_spec_params(&mut self, format: &MediaFormat) -> PlaybackResult<TrackParams> {
        let channels = format.get_u32(keys::CHANNEL_COUNT)?;
        let sample_rate = format.get_u32(keys::SAMPLE_RATE)?;
        let encoding = if format.contains_key(keys::PCM_ENCODING) {
            let code = format.get_i64(keys::PCM_ENCODING)?;
            PcmEncoding::from_code(code).ok_or_else(|| PlaybackError::UnsupportedFormat {
                mime: format!("pcm encoding {}", code),
            })?
        } else {
            PcmEncoding::Pcm16
        };

        if channels == 0 || channels > u16::MAX as u32 || sample_rate == 0 {
            return Err(PlaybackError::InvalidConfiguration {
                reason: format!("{} channels at {} Hz", channels, sample_rate),
            });
        }

        self.config = Some(AudioOutputConfig {
            sample_rate,
            channels: channels as u16,
            encoding,
        });
        debug!(
            "Audio track: {} Hz, {} channels, {:?}",
            sample_rate, channels, encoding
        );
        Ok(TrackParams::default())
    }

    fn configure_codec(
        &mut self,
        codec: &mut dyn Codec,
        format: &MediaFormat,
        _signal: &ResourceSignal,
    ) -> PlaybackResult<CodecSetup> {
        codec.configure(format, None)?;
        Ok(CodecSetup::Configured)
    }

    fn init_render(&mut self) -> PlaybackResult<()> {
        let config = self
            .config
            .ok_or_else(|| PlaybackError::MissingConfiguration {
                field: "audio output config".to_string(),
            })?;
        let min_buffer_size = self.output.min_buffer_size(&config)?;
        self.output.open(&config, min_buffer_size)?;
        self.opened = true;
        self.output.play()?;
        self.scratch = Vec::with_capacity(min_buffer_size / 2);
        info!(
            "Audio output playing: {} Hz, {} channels, {} byte buffer",
            config.sample_rate, config.channels, min_buffer_size
        );
        Ok(())
    }

    fn render(&mut self, buffer: &[u8], info: &BufferInfo) -> PlaybackResult<()> {
        let Some(config) = self.config else {
            return Err(PlaybackError::MissingConfiguration {
                field: "audio output config".to_string(),
            });
        };
        let start = info.offset.min(buffer.len());
        let end = (info.offset + info.size).min(buffer.len());
        self.convert(&buffer[start..end], config.encoding);
        if self.scratch.is_empty() {
            return Ok(());
        }

        let written = self.output.write(&self.scratch)?;
        if written < self.scratch.len() {
            debug!(
                "Audio output accepted {} of {} samples",
                written,
                self.scratch.len()
            );
        }
        Ok(())
    }

    fn done_decode(&mut self) {
        if self.opened {
            if let Err(e) = self.output.stop() {
                warn!("Audio output stop failed: {}", e);
            }
        }
        self.output.release();
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use crate::render::MemoryAudioOutput;

    fn decoder() -> AudioTrackDecoder {
        AudioTrackDecoder::new(
            Arc::new(MemorySource::new()),
            Box::new(MemoryAudioOutput::new()),
        )
    }

    #[test]
    fn test_convert_pcm8_and_float() {
        let mut decoder = decoder();
        decoder.convert(&[0, 128, 255], PcmEncoding::Pcm8);
        assert_eq!(decoder.scratch, vec![-32768, 0, 127 << 8]);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        decoder.convert(&bytes, PcmEncoding::PcmFloat);
        assert_eq!(decoder.scratch, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_odd_trailing_byte_is_dropped() {
        let mut decoder = decoder();
        decoder.convert(&[1, 0, 2, 0, 9], PcmEncoding::Pcm16);
        assert_eq!(decoder.scratch, vec![1, 2]);
    }
}

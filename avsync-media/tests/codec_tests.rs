//! Unit tests for the software codec and codec registry
//!
//! This module exercises the buffer-index protocol: buffer ownership, format
//! announcements, end-of-stream propagation, flushing and surface rendering.

use avsync_core::*;
use avsync_media::*;
use std::sync::Arc;
use std::time::Duration;

const POLL: Duration = Duration::from_micros(100);

fn raw_audio_codec() -> SoftwareCodec<PassthroughTransform> {
    let mut codec = SoftwareCodec::new(PassthroughTransform);
    let format = MediaFormat::audio("audio/raw", 8000, 1).with_i64(keys::MAX_INPUT_SIZE, 16);
    codec.configure(&format, None).unwrap();
    codec.start().unwrap();
    codec
}

fn queue(codec: &mut SoftwareCodec<PassthroughTransform>, data: &[u8], pts: i64) {
    let index = codec.dequeue_input_buffer(POLL).unwrap().unwrap();
    codec.input_buffer(index).unwrap()[..data.len()].copy_from_slice(data);
    codec
        .queue_input_buffer(index, 0, data.len(), pts, BufferFlags::SYNC_FRAME)
        .unwrap();
}

fn next_buffer(codec: &mut SoftwareCodec<PassthroughTransform>) -> (usize, BufferInfo) {
    for _ in 0..10 {
        if let OutputStatus::Buffer { index, info } = codec.dequeue_output_buffer(POLL).unwrap() {
            return (index, info);
        }
    }
    panic!("codec produced no output");
}

// ============================================================================
// BUFFER PROTOCOL TESTS
// ============================================================================

#[test]
fn test_codec_requires_start() {
    let mut codec = SoftwareCodec::new(PassthroughTransform);
    assert!(matches!(
        codec.dequeue_input_buffer(POLL),
        Err(PlaybackError::InvalidState { .. })
    ));

    codec
        .configure(&MediaFormat::audio("audio/raw", 8000, 1), None)
        .unwrap();
    assert!(!codec.is_running());
    assert!(codec.dequeue_output_buffer(POLL).is_err());

    codec.start().unwrap();
    assert!(codec.is_running());
}

#[test]
fn test_format_change_is_announced_before_first_buffer() {
    let mut codec = raw_audio_codec();
    match codec.dequeue_output_buffer(POLL).unwrap() {
        OutputStatus::FormatChanged(format) => {
            assert_eq!(format.mime().unwrap(), "audio/raw");
        }
        other => panic!("expected format change, got {:?}", other),
    }
    assert_eq!(
        codec.dequeue_output_buffer(POLL).unwrap(),
        OutputStatus::TryAgainLater
    );
}

#[test]
fn test_decoded_buffer_carries_sample_metadata() {
    let mut codec = raw_audio_codec();
    queue(&mut codec, &[1, 2, 3, 4], 20_000);

    let (index, info) = next_buffer(&mut codec);
    assert_eq!(info.size, 4);
    assert_eq!(info.presentation_time_us, 20_000);
    assert!(info.flags.is_sync_frame());
    assert_eq!(codec.output_buffer(index).unwrap(), &[1, 2, 3, 4]);

    codec.release_output_buffer(index, false).unwrap();
    assert!(codec.output_buffer(index).is_err());
    assert!(codec.release_output_buffer(index, false).is_err());
}

#[test]
fn test_end_of_stream_yields_empty_flagged_buffer() {
    let mut codec = raw_audio_codec();
    queue(&mut codec, &[9, 9], 40_000);

    let index = codec.dequeue_input_buffer(POLL).unwrap().unwrap();
    codec
        .queue_input_buffer(index, 0, 0, 0, BufferFlags::END_OF_STREAM)
        .unwrap();

    let (first, info) = next_buffer(&mut codec);
    assert!(!info.is_end_of_stream());
    codec.release_output_buffer(first, true).unwrap();

    let (last, info) = next_buffer(&mut codec);
    assert!(info.is_end_of_stream());
    assert_eq!(info.size, 0);
    assert_eq!(info.presentation_time_us, 40_000);
    codec.release_output_buffer(last, false).unwrap();
}

#[test]
fn test_input_pool_is_bounded() {
    let mut codec = raw_audio_codec();
    let mut held = Vec::new();
    while let Some(index) = codec.dequeue_input_buffer(POLL).unwrap() {
        held.push(index);
    }
    assert_eq!(held.len(), avsync_media::codecs::INPUT_BUFFER_COUNT);
}

#[test]
fn test_oversized_input_is_rejected() {
    let mut codec = raw_audio_codec();
    let index = codec.dequeue_input_buffer(POLL).unwrap().unwrap();
    assert!(matches!(
        codec.queue_input_buffer(index, 8, 16, 0, BufferFlags::NONE),
        Err(PlaybackError::BufferOverflow {
            size: 24,
            capacity: 16
        })
    ));
}

#[test]
fn test_flush_discards_pending_output() {
    let mut codec = raw_audio_codec();
    queue(&mut codec, &[1], 0);
    queue(&mut codec, &[2], 10_000);

    codec.flush().unwrap();
    // Skip the format announcement
    let _ = codec.dequeue_output_buffer(POLL).unwrap();
    assert_eq!(
        codec.dequeue_output_buffer(POLL).unwrap(),
        OutputStatus::TryAgainLater
    );

    queue(&mut codec, &[3], 20_000);
    let (index, info) = next_buffer(&mut codec);
    assert_eq!(info.presentation_time_us, 20_000);
    assert_eq!(codec.output_buffer(index).unwrap(), &[3]);
}

#[test]
fn test_render_release_presents_to_surface() {
    let surface = Arc::new(MemorySurface::new("test"));
    let mut codec = SoftwareCodec::new(PassthroughTransform);
    codec
        .configure(
            &MediaFormat::video("video/raw", 2, 1).with_i64(keys::MAX_INPUT_SIZE, 6),
            Some(surface.clone()),
        )
        .unwrap();
    codec.start().unwrap();

    queue(&mut codec, &[10, 20, 30, 40, 50, 60], 33_000);
    let (index, _) = next_buffer(&mut codec);
    codec.release_output_buffer(index, true).unwrap();

    queue(&mut codec, &[1, 1, 1, 1, 1, 1], 66_000);
    let (index, _) = next_buffer(&mut codec);
    codec.release_output_buffer(index, false).unwrap();

    assert_eq!(surface.frame_count(), 1);
    assert_eq!(surface.last_timestamp_us(), Some(33_000));
}

#[test]
fn test_stop_then_release() {
    let mut codec = raw_audio_codec();
    codec.stop().unwrap();
    assert!(!codec.is_running());
    codec.release();
    assert!(codec.stop().is_err());
    assert!(codec.configure(&MediaFormat::new(), None).is_err());
}

// ============================================================================
// REGISTRY TESTS
// ============================================================================

#[test]
fn test_registry_defaults() {
    let registry = CodecRegistry::with_defaults();
    assert!(registry.supports("audio/raw"));
    assert!(registry.supports("video/raw"));
    assert_eq!(cfg!(feature = "opus"), registry.supports("audio/opus"));
    assert_eq!(cfg!(feature = "h264"), registry.supports("video/avc"));

    let codec = registry.create_decoder("audio/raw").unwrap();
    assert_eq!(codec.name(), "software.passthrough");
}

#[test]
fn test_registry_unknown_mime() {
    let registry = CodecRegistry::new();
    assert!(matches!(
        registry.create_decoder("video/x-unknown"),
        Err(PlaybackError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_registry_custom_constructor() {
    let mut registry = CodecRegistry::new();
    registry.register("audio/x-test", || SoftwareCodec::new(PassthroughTransform));
    assert_eq!(registry.mime_types(), vec!["audio/x-test".to_string()]);
    assert!(registry.create_decoder("audio/x-test").is_ok());
}

//! Unit tests for the decode engine state machine
//!
//! These tests drive a real `DecodeEngine` worker against scripted fake
//! extractors and codecs that count every call, and observe the session
//! through listeners and the `DecoderHandle`.

use avsync_core::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

// ============================================================================
// FAKES
// ============================================================================

#[derive(Default)]
struct Counters {
    extractor_opened: AtomicUsize,
    extractor_stopped: AtomicUsize,
    eos_reads: AtomicUsize,
    reads: AtomicUsize,
    eos_queued: AtomicUsize,
    flushes: AtomicUsize,
    codec_stopped: AtomicUsize,
    codec_released: AtomicUsize,
    renders: AtomicUsize,
    done_decode: AtomicUsize,
}

impl Counters {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct Sample {
    pts_us: i64,
    sync: bool,
}

struct FakeExtractor {
    format: MediaFormat,
    samples: Vec<Sample>,
    position: usize,
    last: Option<Sample>,
    seek_delay: Duration,
    counters: Arc<Counters>,
}

impl Extractor for FakeExtractor {
    fn format(&self) -> Option<&MediaFormat> {
        Some(&self.format)
    }

    fn read_sample(&mut self, buffer: &mut [u8]) -> PlaybackResult<Option<usize>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let Some(sample) = self.samples.get(self.position).cloned() else {
            self.counters.eos_reads.fetch_add(1, Ordering::SeqCst);
            return Ok(None);
        };
        self.position += 1;
        buffer[..4].copy_from_slice(&[1, 2, 3, 4]);
        self.last = Some(sample);
        Ok(Some(4))
    }

    fn current_timestamp(&self) -> i64 {
        self.last.as_ref().map(|s| s.pts_us).unwrap_or(0)
    }

    fn sample_flags(&self) -> BufferFlags {
        match &self.last {
            Some(sample) if sample.sync => BufferFlags::SYNC_FRAME,
            _ => BufferFlags::NONE,
        }
    }

    fn seek(&mut self, position_us: i64) -> PlaybackResult<i64> {
        thread::sleep(self.seek_delay);
        let index = self
            .samples
            .iter()
            .rposition(|s| s.sync && s.pts_us <= position_us)
            .unwrap_or(0);
        self.position = index;
        Ok(self.samples.get(index).map(|s| s.pts_us).unwrap_or(0))
    }

    fn set_start_position(&mut self, position_us: i64) -> PlaybackResult<i64> {
        self.seek(position_us)
    }

    fn stop(&mut self) {
        self.counters.extractor_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeCodec {
    input: Vec<u8>,
    input_free: bool,
    pending: VecDeque<(Vec<u8>, BufferInfo)>,
    held: Option<(Vec<u8>, BufferInfo)>,
    started: bool,
    // Hold output until end of stream, then flag the last data buffer
    merge_eos: bool,
    eos_seen: bool,
    counters: Arc<Counters>,
}

impl Codec for FakeCodec {
    fn name(&self) -> &str {
        "fake"
    }

    fn configure(
        &mut self,
        _format: &MediaFormat,
        _surface: Option<Arc<dyn Surface>>,
    ) -> PlaybackResult<()> {
        self.input = vec![0; 64];
        self.input_free = true;
        Ok(())
    }

    fn start(&mut self) -> PlaybackResult<()> {
        self.started = true;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> PlaybackResult<Option<usize>> {
        if self.input_free && (self.pending.len() < 2 || self.merge_eos) {
            self.input_free = false;
            Ok(Some(0))
        } else {
            Ok(None)
        }
    }

    fn input_buffer(&mut self, _index: usize) -> PlaybackResult<&mut [u8]> {
        Ok(&mut self.input)
    }

    fn queue_input_buffer(
        &mut self,
        _index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> PlaybackResult<()> {
        if flags.is_end_of_stream() {
            self.counters.eos_queued.fetch_add(1, Ordering::SeqCst);
            if self.merge_eos {
                self.eos_seen = true;
                self.input_free = true;
                if let Some((_, info)) = self.pending.back_mut() {
                    info.flags |= BufferFlags::END_OF_STREAM;
                    return Ok(());
                }
            }
        }
        let data = self.input[offset..offset + size].to_vec();
        self.pending
            .push_back((data, BufferInfo::new(size, presentation_time_us, flags)));
        self.input_free = true;
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> PlaybackResult<OutputStatus> {
        if self.held.is_some() || (self.merge_eos && !self.eos_seen) {
            return Ok(OutputStatus::TryAgainLater);
        }
        match self.pending.pop_front() {
            Some((data, info)) => {
                self.held = Some((data, info));
                Ok(OutputStatus::Buffer { index: 0, info })
            }
            None => Ok(OutputStatus::TryAgainLater),
        }
    }

    fn output_buffer(&self, _index: usize) -> PlaybackResult<&[u8]> {
        self.held
            .as_ref()
            .map(|(data, _)| data.as_slice())
            .ok_or_else(|| PlaybackError::codec("fake", "no output held"))
    }

    fn release_output_buffer(&mut self, _index: usize, _render: bool) -> PlaybackResult<()> {
        self.held = None;
        Ok(())
    }

    fn flush(&mut self) -> PlaybackResult<()> {
        self.counters.flushes.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
        self.held = None;
        self.input_free = true;
        self.eos_seen = false;
        Ok(())
    }

    fn stop(&mut self) -> PlaybackResult<()> {
        self.counters.codec_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.counters.codec_released.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeCodecs {
    merge_eos: bool,
    counters: Arc<Counters>,
}

impl CodecFactory for FakeCodecs {
    fn create_decoder(&self, mime: &str) -> PlaybackResult<Box<dyn Codec>> {
        if mime != "audio/raw" {
            return Err(PlaybackError::UnsupportedFormat {
                mime: mime.to_string(),
            });
        }
        Ok(Box::new(FakeCodec {
            merge_eos: self.merge_eos,
            counters: self.counters.clone(),
            ..Default::default()
        }))
    }
}

struct FakeTrack {
    samples: Vec<Sample>,
    seek_delay: Duration,
    counters: Arc<Counters>,
    deferred: Option<Arc<Mutex<Option<ResourceSignal>>>>,
}

impl TrackDecoder for FakeTrack {
    fn track_kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn check(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn init_extractor(&mut self, _path: &Path) -> PlaybackResult<Box<dyn Extractor>> {
        self.counters.extractor_opened.fetch_add(1, Ordering::SeqCst);
        let duration_us = self.samples.last().map(|s| s.pts_us + 10_000).unwrap_or(0);
        Ok(Box::new(FakeExtractor {
            format: MediaFormat::audio("audio/raw", 48_000, 2)
                .with_i64(keys::DURATION_US, duration_us),
            samples: self.samples.clone(),
            position: 0,
            last: None,
            seek_delay: self.seek_delay,
            counters: self.counters.clone(),
        }))
    }

    fn init_spec_params(&mut self, _format: &MediaFormat) -> PlaybackResult<TrackParams> {
        Ok(TrackParams::default())
    }

    fn configure_codec(
        &mut self,
        codec: &mut dyn Codec,
        format: &MediaFormat,
        signal: &ResourceSignal,
    ) -> PlaybackResult<CodecSetup> {
        if let Some(slot) = &self.deferred {
            let mut slot = slot.lock();
            if slot.is_none() {
                *slot = Some(signal.clone());
                return Ok(CodecSetup::Deferred);
            }
        }
        codec.configure(format, None)?;
        Ok(CodecSetup::Configured)
    }

    fn init_render(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn render(&mut self, _buffer: &[u8], _info: &BufferInfo) -> PlaybackResult<()> {
        self.counters.renders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn done_decode(&mut self) {
        self.counters.done_decode.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<(i64, Instant)>>,
    prepared: AtomicUsize,
    ready: AtomicUsize,
    running: AtomicUsize,
    paused: AtomicUsize,
    finished: AtomicUsize,
    destroyed: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl Recorder {
    fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    fn timestamps(&self) -> Vec<i64> {
        self.frames.lock().iter().map(|(pts, _)| *pts).collect()
    }
}

impl DecoderStateListener for Recorder {
    fn on_prepare(&self, _decoder: &DecoderHandle) {
        self.prepared.fetch_add(1, Ordering::SeqCst);
    }

    fn on_ready(&self, _decoder: &DecoderHandle) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }

    fn on_running(&self, _decoder: &DecoderHandle) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    fn on_pause(&self, _decoder: &DecoderHandle) {
        self.paused.fetch_add(1, Ordering::SeqCst);
    }

    fn on_frame(&self, _decoder: &DecoderHandle, frame: &Frame<'_>) {
        self.frames.lock().push((frame.timestamp_ms(), Instant::now()));
    }

    fn on_finish(&self, _decoder: &DecoderHandle) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn on_destroy(&self, _decoder: &DecoderHandle) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _decoder: &DecoderHandle, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

// ============================================================================
// HARNESS
// ============================================================================

struct Session {
    handle: DecoderHandle,
    worker: Option<JoinHandle<()>>,
    recorder: Arc<Recorder>,
    counters: Arc<Counters>,
    _file: Option<NamedTempFile>,
}

impl Session {
    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.join().unwrap();
        }
    }
}

fn samples(count: usize, step_ms: i64, sync_every: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| Sample {
            pts_us: i as i64 * step_ms * 1000,
            sync: i % sync_every == 0,
        })
        .collect()
}

struct SessionBuilder {
    samples: Vec<Sample>,
    config: EngineConfig,
    deferred: Option<Arc<Mutex<Option<ResourceSignal>>>>,
    missing_file: bool,
    start_ms: i64,
    end_ms: i64,
    stop_before_run: bool,
    playing: bool,
    merge_eos: bool,
    seek_delay: Duration,
}

impl SessionBuilder {
    fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            config: EngineConfig::default(),
            deferred: None,
            missing_file: false,
            start_ms: 0,
            end_ms: 0,
            stop_before_run: false,
            playing: false,
            merge_eos: false,
            seek_delay: Duration::ZERO,
        }
    }

    fn start(self) -> Session {
        let counters = Arc::new(Counters::default());
        let recorder = Arc::new(Recorder::default());
        let file = if self.missing_file {
            None
        } else {
            Some(NamedTempFile::new().unwrap())
        };
        let path = match &file {
            Some(file) => file.path().to_path_buf(),
            None => std::env::temp_dir().join("avsync-missing-media-file.bin"),
        };

        let track = FakeTrack {
            samples: self.samples,
            seek_delay: self.seek_delay,
            counters: counters.clone(),
            deferred: self.deferred,
        };
        let codecs = Arc::new(FakeCodecs {
            merge_eos: self.merge_eos,
            counters: counters.clone(),
        });
        let (engine, handle) = DecodeEngine::new(path, Box::new(track), codecs, self.config);
        handle.set_state_listener(Some(recorder.clone()));
        handle.set_start_position(self.start_ms);
        handle.set_end_position(self.end_ms);
        if self.playing {
            handle.resume();
        }
        if self.stop_before_run {
            handle.stop();
        }
        let worker = engine.spawn("engine-test").unwrap();

        Session {
            handle,
            worker: Some(worker),
            recorder,
            counters,
            _file: file,
        }
    }
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

// ============================================================================
// LIFECYCLE TESTS
// ============================================================================

#[test]
fn test_primes_one_frame_then_pauses() {
    let mut session = SessionBuilder::new(samples(10, 10, 1)).start();

    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(session.recorder.frame_count(), 1);
    assert_eq!(session.recorder.prepared.load(Ordering::SeqCst), 1);
    assert_eq!(session.recorder.ready.load(Ordering::SeqCst), 1);
    assert_eq!(session.recorder.paused.load(Ordering::SeqCst), 1);
    assert_eq!(session.handle.duration_ms(), 100);

    session.handle.stop();
    session.join();
    assert!(session.handle.is_stopped());
}

#[test]
fn test_resume_decodes_to_finish() {
    let mut session = SessionBuilder::new(samples(10, 10, 1)).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    session.handle.resume();
    assert!(wait_until(Duration::from_secs(3), || session
        .handle
        .is_finished()));

    assert_eq!(
        session.recorder.timestamps(),
        vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]
    );
    assert_eq!(session.recorder.running.load(Ordering::SeqCst), 1);
    assert_eq!(session.recorder.finished.load(Ordering::SeqCst), 1);
    assert_eq!(session.handle.current_timestamp_ms(), 90);

    session.handle.stop();
    session.join();
}

#[test]
fn test_end_of_stream_queued_exactly_once() {
    let mut session = SessionBuilder::new(samples(5, 10, 1)).start();
    session.handle.resume();
    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    // Linger in FINISH so any extra reads would show up
    thread::sleep(Duration::from_millis(50));

    assert_eq!(Counters::get(&session.counters.eos_queued), 1);
    assert_eq!(Counters::get(&session.counters.eos_reads), 1);
    assert_eq!(Counters::get(&session.counters.reads), 6);

    session.handle.stop();
    session.join();
}

#[test]
fn test_end_of_stream_on_primed_frame_finishes() {
    // The only frame comes back carrying the end-of-stream flag while priming
    let mut builder = SessionBuilder::new(samples(1, 10, 1));
    builder.merge_eos = true;
    let mut session = builder.start();

    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.timestamps(), vec![0]);
    assert_eq!(session.recorder.finished.load(Ordering::SeqCst), 1);
    assert_eq!(Counters::get(&session.counters.eos_queued), 1);

    session.handle.resume();
    thread::sleep(Duration::from_millis(30));
    assert!(session.handle.is_finished());
    assert_eq!(session.recorder.finished.load(Ordering::SeqCst), 1);

    session.handle.stop();
    session.join();
}

#[test]
fn test_end_of_stream_on_last_data_buffer_finishes() {
    let mut builder = SessionBuilder::new(samples(3, 10, 1));
    builder.merge_eos = true;
    let mut session = builder.start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    session.handle.resume();
    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.timestamps(), vec![0, 10, 20]);
    assert_eq!(session.recorder.finished.load(Ordering::SeqCst), 1);

    session.handle.stop();
    session.join();
}

#[test]
fn test_teardown_runs_exactly_once() {
    let mut session = SessionBuilder::new(samples(3, 10, 1)).start();
    session.handle.resume();
    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));

    session.handle.stop();
    session.handle.stop();
    session.join();

    assert_eq!(Counters::get(&session.counters.codec_stopped), 1);
    assert_eq!(Counters::get(&session.counters.codec_released), 1);
    assert_eq!(Counters::get(&session.counters.extractor_stopped), 1);
    assert_eq!(Counters::get(&session.counters.done_decode), 1);
    assert_eq!(session.recorder.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(session.handle.state(), DecodeState::Stop);
}

#[test]
fn test_stop_from_another_thread_wakes_paused_worker() {
    let mut session = SessionBuilder::new(samples(10, 10, 1)).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    let handle = session.handle.clone();
    let stopper = thread::spawn(move || handle.stop());
    stopper.join().unwrap();

    let started = Instant::now();
    session.join();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(session.recorder.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_interrupts_pacing_sleep() {
    // One frame far in the future keeps the worker inside its pacing wait
    let far = vec![
        Sample {
            pts_us: 0,
            sync: true,
        },
        Sample {
            pts_us: 30_000_000,
            sync: true,
        },
    ];
    let mut session = SessionBuilder::new(far).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));
    session.handle.resume();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    session.handle.stop();
    session.join();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_stop_before_run_skips_everything() {
    let mut builder = SessionBuilder::new(samples(3, 10, 1));
    builder.stop_before_run = true;
    let mut session = builder.start();
    session.join();

    assert_eq!(session.recorder.prepared.load(Ordering::SeqCst), 0);
    assert_eq!(Counters::get(&session.counters.extractor_opened), 0);
    assert_eq!(session.recorder.destroyed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_file_reports_error() {
    let mut builder = SessionBuilder::new(samples(3, 10, 1));
    builder.missing_file = true;
    let mut session = builder.start();
    session.join();

    let errors = session.recorder.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("not found"));
    assert_eq!(Counters::get(&session.counters.extractor_opened), 0);
    assert_eq!(session.recorder.ready.load(Ordering::SeqCst), 0);
    assert_eq!(session.recorder.destroyed.load(Ordering::SeqCst), 0);
    assert!(session.handle.is_stopped());
}

// ============================================================================
// SYNC TESTS
// ============================================================================

#[test]
fn test_pause_gap_does_not_burst_frames() {
    let mut session = SessionBuilder::new(samples(20, 20, 1)).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    session.handle.resume();
    assert!(wait_until(Duration::from_secs(2), || session
        .recorder
        .frame_count()
        >= 5));
    session.handle.pause();
    thread::sleep(Duration::from_millis(300));

    let before = session.recorder.frame_count();
    let last_pts = session.recorder.timestamps()[before - 1];
    let resumed_at = Instant::now();
    session.handle.resume();
    assert!(wait_until(Duration::from_secs(3), || session
        .handle
        .is_finished()));

    // Remaining frames are paced from the resume point, not released in a burst
    let remaining_ms = (380 - last_pts) as u128;
    let elapsed = resumed_at.elapsed().as_millis();
    assert!(
        elapsed + 40 >= remaining_ms,
        "finished {} ms after resume, expected about {} ms",
        elapsed,
        remaining_ms
    );
    assert_eq!(session.recorder.running.load(Ordering::SeqCst), 2);

    session.handle.stop();
    session.join();
}

#[test]
fn test_pause_while_pacing_holds_the_frame() {
    let spaced = vec![
        Sample {
            pts_us: 0,
            sync: true,
        },
        Sample {
            pts_us: 300_000,
            sync: true,
        },
    ];
    let mut session = SessionBuilder::new(spaced).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    session.handle.resume();
    thread::sleep(Duration::from_millis(50));
    session.handle.pause();
    // Well past the frame's presentation time
    thread::sleep(Duration::from_millis(400));
    assert_eq!(session.recorder.timestamps(), vec![0]);
    assert_eq!(session.recorder.paused.load(Ordering::SeqCst), 2);

    session.handle.resume();
    assert!(wait_until(Duration::from_secs(1), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.timestamps(), vec![0, 300]);

    session.handle.stop();
    session.join();
}

#[test]
fn test_seek_while_pacing_drops_the_stale_frame() {
    let far = vec![
        Sample {
            pts_us: 0,
            sync: true,
        },
        Sample {
            pts_us: 30_000_000,
            sync: true,
        },
    ];
    let mut session = SessionBuilder::new(far).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    session.handle.resume();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(session.handle.seek_to(0).unwrap(), 0);
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause
        && session.recorder.frame_count() == 2));
    assert_eq!(session.recorder.timestamps(), vec![0, 0]);

    session.handle.stop();
    session.join();
}

#[test]
fn test_start_position_paces_from_landed_sync_sample() {
    // Sync samples every 300 ms; a start at 500 ms lands on 300 ms
    let mut builder = SessionBuilder::new(samples(10, 100, 3));
    builder.start_ms = 500;
    builder.playing = true;
    let mut session = builder.start();

    assert!(wait_until(Duration::from_secs(3), || session
        .handle
        .is_finished()));
    let frames = session.recorder.frames.lock().clone();
    assert_eq!(frames.first().map(|(pts, _)| *pts), Some(300));
    assert_eq!(frames.last().map(|(pts, _)| *pts), Some(900));
    let span = frames[frames.len() - 1].1.duration_since(frames[0].1);
    assert!(
        span >= Duration::from_millis(550),
        "frames 300..=900 ms delivered within {:?}",
        span
    );

    session.handle.stop();
    session.join();
}

#[test]
fn test_without_sync_decodes_as_fast_as_possible() {
    // Ten seconds of media
    let mut session = SessionBuilder::new(samples(100, 100, 1)).start();
    session.handle.without_sync();
    session.handle.resume();

    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.frame_count(), 100);
    assert_eq!(Counters::get(&session.counters.renders), 0);

    session.handle.stop();
    session.join();
}

#[test]
fn test_end_position_trims_playback() {
    let mut builder = SessionBuilder::new(samples(10, 10, 1));
    builder.end_ms = 40;
    let mut session = builder.start();
    session.handle.resume();

    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.timestamps(), vec![0, 10, 20, 30, 40]);

    session.handle.stop();
    session.join();
}

#[test]
fn test_start_position_skips_leading_samples() {
    let mut builder = SessionBuilder::new(samples(10, 10, 1));
    builder.start_ms = 50;
    let mut session = builder.start();

    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));
    assert_eq!(session.recorder.timestamps(), vec![50]);

    session.handle.stop();
    session.join();
}

// ============================================================================
// SEEK TESTS
// ============================================================================

#[test]
fn test_seek_to_lands_on_previous_sync_sample() {
    let mut session = SessionBuilder::new(samples(10, 10, 3)).start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    let actual = session.handle.seek_to(55).unwrap();
    assert_eq!(actual, 30);
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause
        && session.recorder.frame_count() == 2));
    assert_eq!(session.recorder.timestamps(), vec![0, 30]);
    assert!(Counters::get(&session.counters.flushes) >= 1);

    session.handle.stop();
    session.join();
}

#[test]
fn test_seek_and_play_replays_after_finish() {
    let mut session = SessionBuilder::new(samples(4, 10, 1)).start();
    session.handle.resume();
    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));

    let actual = session.handle.seek_and_play(0).unwrap();
    assert_eq!(actual, 0);
    assert!(wait_until(Duration::from_secs(2), || session
        .recorder
        .finished
        .load(Ordering::SeqCst)
        == 2));
    assert_eq!(
        session.recorder.timestamps(),
        vec![0, 10, 20, 30, 0, 10, 20, 30]
    );
    assert_eq!(Counters::get(&session.counters.eos_queued), 2);

    session.handle.stop();
    session.join();
}

#[test]
fn test_pause_during_seek_lands_holding() {
    let mut builder = SessionBuilder::new(samples(10, 10, 1));
    builder.seek_delay = Duration::from_millis(200);
    let mut session = builder.start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    let handle = session.handle.clone();
    let seeker = thread::spawn(move || handle.seek_and_play(0));
    assert!(wait_until(Duration::from_secs(1), || session
        .handle
        .is_seeking()));
    thread::sleep(Duration::from_millis(50));
    session.handle.pause();

    assert_eq!(seeker.join().unwrap().unwrap(), 0);
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause
        && session.recorder.frame_count() == 2));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(session.handle.state(), DecodeState::Pause);
    assert_eq!(session.recorder.timestamps(), vec![0, 0]);

    session.handle.stop();
    session.join();
}

#[test]
fn test_resume_during_seek_lands_playing() {
    let mut builder = SessionBuilder::new(samples(5, 10, 1));
    builder.seek_delay = Duration::from_millis(200);
    let mut session = builder.start();
    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));

    let handle = session.handle.clone();
    let seeker = thread::spawn(move || handle.seek_to(0));
    assert!(wait_until(Duration::from_secs(1), || session
        .handle
        .is_seeking()));
    thread::sleep(Duration::from_millis(50));
    session.handle.resume();

    assert_eq!(seeker.join().unwrap().unwrap(), 0);
    assert!(wait_until(Duration::from_secs(2), || session
        .handle
        .is_finished()));
    assert_eq!(session.recorder.timestamps(), vec![0, 0, 10, 20, 30, 40]);

    session.handle.stop();
    session.join();
}

#[test]
fn test_seek_on_stopped_session_fails() {
    let mut session = SessionBuilder::new(samples(4, 10, 1)).start();
    session.handle.stop();
    session.join();

    assert!(matches!(
        session.handle.seek_to(10),
        Err(PlaybackError::SessionStopped)
    ));
}

// ============================================================================
// DEFERRED CONFIGURATION TESTS
// ============================================================================

#[test]
fn test_deferred_configuration_waits_for_signal() {
    let slot = Arc::new(Mutex::new(None));
    let mut builder = SessionBuilder::new(samples(4, 10, 1));
    builder.deferred = Some(slot.clone());
    let mut session = builder.start();

    assert!(wait_until(Duration::from_secs(2), || slot.lock().is_some()));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(session.recorder.frame_count(), 0);
    assert_eq!(session.recorder.ready.load(Ordering::SeqCst), 0);

    let signal = slot.lock().clone().unwrap();
    thread::spawn(move || signal.notify()).join().unwrap();

    assert!(wait_until(Duration::from_secs(2), || session.handle.state()
        == DecodeState::Pause));
    assert_eq!(session.recorder.frame_count(), 1);

    session.handle.stop();
    session.join();
}

#[test]
fn test_stop_while_deferred_releases_resources() {
    let slot = Arc::new(Mutex::new(None));
    let mut builder = SessionBuilder::new(samples(4, 10, 1));
    builder.deferred = Some(slot.clone());
    let mut session = builder.start();

    assert!(wait_until(Duration::from_secs(2), || slot.lock().is_some()));
    session.handle.stop();
    session.join();

    assert_eq!(Counters::get(&session.counters.codec_released), 1);
    assert_eq!(Counters::get(&session.counters.extractor_stopped), 1);
    assert_eq!(session.recorder.destroyed.load(Ordering::SeqCst), 1);
    assert!(session.recorder.errors.lock().is_empty());
}

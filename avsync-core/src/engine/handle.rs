//! Control surface of a decode session

use super::control::{Control, SeekRequest, SeekWait};
use super::session::SessionInfo;
use crate::error::{PlaybackError, PlaybackResult};
use crate::format::{MediaFormat, TrackKind};
use crate::listener::{DecoderStateListener, ProgressListener};
use crate::state::DecodeState;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State shared between the worker and every handle
pub(crate) struct Shared {
    pub control: Arc<Control>,
    pub info: RwLock<SessionInfo>,
    pub listener: RwLock<Option<Arc<dyn DecoderStateListener>>>,
    pub progress: RwLock<Option<Arc<dyn ProgressListener>>>,
    pub worker: RwLock<Option<ThreadId>>,
    pub seek_timeout: Duration,
}

impl Shared {
    pub fn new(path: PathBuf, track: TrackKind, sync_enabled: bool, seek_timeout: Duration) -> Self {
        Self {
            control: Arc::new(Control::new(sync_enabled)),
            info: RwLock::new(SessionInfo::new(path, track)),
            listener: RwLock::new(None),
            progress: RwLock::new(None),
            worker: RwLock::new(None),
            seek_timeout,
        }
    }

    pub fn listener(&self) -> Option<Arc<dyn DecoderStateListener>> {
        self.listener.read().clone()
    }

    pub fn progress(&self) -> Option<Arc<dyn ProgressListener>> {
        self.progress.read().clone()
    }

    fn on_worker_thread(&self) -> bool {
        *self.worker.read() == Some(thread::current().id())
    }
}

/// Clonable handle controlling one decode session
///
/// Every call is safe from any thread. Calls that should unblock the worker
/// change the state and signal it in one step.
#[derive(Clone)]
pub struct DecoderHandle {
    pub(crate) shared: Arc<Shared>,
}

impl DecoderHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Hold decoding; the worker waits on its next iteration
    pub fn pause(&self) {
        let mut control = self.shared.control.lock();
        match control.state {
            DecodeState::Start | DecodeState::Decoding => {
                control.state = DecodeState::Pause;
            }
            DecodeState::Seeking => {
                // land on the sought frame and hold there
                control.retarget_seek(false);
            }
            _ => return,
        }
        drop(control);
        self.shared.control.notify();
        debug!("{} decoder paused", self.track());
    }

    /// Continue decoding and wake the worker
    pub fn resume(&self) {
        let mut control = self.shared.control.lock();
        if !control.running {
            return;
        }
        match control.state {
            DecodeState::Finish => {
                drop(control);
                debug!("{} decoder finished, resume ignored", self.track());
                return;
            }
            DecodeState::Seeking => control.retarget_seek(true),
            _ => control.state = DecodeState::Decoding,
        }
        drop(control);
        self.shared.control.notify();
    }

    /// End the session; the worker tears down and exits
    pub fn stop(&self) {
        self.shared.control.stop();
        info!("{} decoder stop requested", self.track());
    }

    /// Seek to `position_ms`, then show that frame and hold
    pub fn seek_to(&self, position_ms: i64) -> PlaybackResult<i64> {
        self.seek(position_ms, false)
    }

    /// Seek to `position_ms` and keep decoding from there
    pub fn seek_and_play(&self, position_ms: i64) -> PlaybackResult<i64> {
        self.seek(position_ms, true)
    }

    fn seek(&self, position_ms: i64, resume: bool) -> PlaybackResult<i64> {
        let position_ms = position_ms.max(0);
        let ticket = {
            let mut control = self.shared.control.lock();
            if !control.running {
                return Err(PlaybackError::SessionStopped);
            }
            let ticket = control.next_ticket;
            control.next_ticket += 1;
            control.seek = Some(SeekRequest {
                ticket,
                position_ms,
                resume,
            });
            control.state = DecodeState::Seeking;
            ticket
        };
        self.shared.control.notify();
        info!("{} decoder seek to {} ms requested", self.track(), position_ms);

        // The worker cannot serve a request while it is inside a callback
        if self.shared.on_worker_thread() {
            return Ok(position_ms);
        }

        let timeout = self.shared.seek_timeout;
        match self.shared.control.wait_for_seek(ticket, timeout) {
            Some(SeekWait::Done(Ok(actual))) => Ok(actual),
            Some(SeekWait::Done(Err(reason))) => Err(PlaybackError::extractor(reason)),
            Some(SeekWait::Stopped) => Err(PlaybackError::SessionStopped),
            None => {
                warn!("{} decoder seek timed out after {:?}", self.track(), timeout);
                Err(PlaybackError::Timeout { duration: timeout })
            }
        }
    }

    /// Whether frames are being decoded continuously
    pub fn is_decoding(&self) -> bool {
        self.state() == DecodeState::Decoding
    }

    /// Whether a seek is in progress
    pub fn is_seeking(&self) -> bool {
        self.state() == DecodeState::Seeking
    }

    /// Whether the session has been stopped
    pub fn is_stopped(&self) -> bool {
        !self.shared.control.is_running()
    }

    /// Whether the end of the track was reached
    pub fn is_finished(&self) -> bool {
        self.state() == DecodeState::Finish
    }

    /// Current decode state
    pub fn state(&self) -> DecodeState {
        self.shared.control.state()
    }

    /// Session identifier
    pub fn id(&self) -> Uuid {
        self.shared.info.read().id
    }

    /// Frame width, 0 for audio or before initialization
    pub fn width(&self) -> u32 {
        self.shared.info.read().width
    }

    /// Frame height, 0 for audio or before initialization
    pub fn height(&self) -> u32 {
        self.shared.info.read().height
    }

    /// Display rotation in degrees
    pub fn rotation(&self) -> u32 {
        self.shared.info.read().rotation
    }

    /// Track duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.shared.info.read().duration_ms
    }

    /// Timestamp of the last delivered frame in milliseconds
    pub fn current_timestamp_ms(&self) -> i64 {
        self.shared.info.read().current_timestamp_ms
    }

    /// Track format, once the extractor is open
    pub fn media_format(&self) -> Option<MediaFormat> {
        self.shared.info.read().format.clone()
    }

    /// Track decoded by this session
    pub fn track(&self) -> TrackKind {
        self.shared.info.read().track
    }

    /// Media file path
    pub fn file_path(&self) -> PathBuf {
        self.shared.info.read().path.clone()
    }

    /// Snapshot of everything known about the session
    pub fn info(&self) -> SessionInfo {
        self.shared.info.read().clone()
    }

    /// Deliver frames as fast as they decode, without pacing or rendering
    pub fn without_sync(&self) -> &Self {
        self.shared.control.lock().sync_enabled = false;
        self.shared.control.notify();
        self
    }

    /// Whether output is paced against the wall clock
    pub fn is_sync_enabled(&self) -> bool {
        self.shared.control.snapshot().2
    }

    /// Replace the lifecycle listener
    pub fn set_state_listener(&self, listener: Option<Arc<dyn DecoderStateListener>>) {
        *self.shared.listener.write() = listener;
    }

    /// Replace the progress listener
    pub fn set_progress_listener(&self, listener: Option<Arc<dyn ProgressListener>>) {
        *self.shared.progress.write() = listener;
    }

    /// Position decoding starts from; applied when the session initializes
    pub fn set_start_position(&self, position_ms: i64) {
        self.shared.info.write().start_position_ms = position_ms.max(0);
    }

    /// Position decoding ends at; 0 plays the whole track
    pub fn set_end_position(&self, position_ms: i64) {
        self.shared.info.write().end_position_ms = position_ms.max(0);
    }
}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.control.state();
        let info = self.shared.info.read();
        f.debug_struct("DecoderHandle")
            .field("id", &info.id)
            .field("track", &info.track)
            .field("path", &info.path)
            .field("state", &state)
            .finish()
    }
}

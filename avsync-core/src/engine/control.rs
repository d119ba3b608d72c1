//! Wait/notify control block shared between a worker and its handles
//!
//! Every mutation that should unblock the worker happens under the mutex and
//! is followed by `notify_all`, and every wait re-checks an explicit
//! predicate, so a signal can never be missed.

use crate::state::DecodeState;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Pending seek posted by a control call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeekRequest {
    pub ticket: u64,
    pub position_ms: i64,
    pub resume: bool,
}

/// Published result of the most recent completed seek
#[derive(Debug, Clone)]
pub(crate) struct SeekOutcome {
    pub ticket: u64,
    pub result: Result<i64, String>,
}

#[derive(Debug)]
pub(crate) struct ControlState {
    pub state: DecodeState,
    pub running: bool,
    pub sync_enabled: bool,
    pub resource_epoch: u64,
    pub seek: Option<SeekRequest>,
    /// Whether the seek the worker is carrying out lands playing
    pub seek_in_flight: Option<bool>,
    pub seek_outcome: Option<SeekOutcome>,
    pub next_ticket: u64,
}

impl ControlState {
    /// Make the pending or in-flight seek land playing or holding
    pub fn retarget_seek(&mut self, resume: bool) {
        if let Some(request) = self.seek.as_mut() {
            request.resume = resume;
        }
        if let Some(in_flight) = self.seek_in_flight.as_mut() {
            *in_flight = resume;
        }
    }
}

#[derive(Debug)]
pub(crate) struct Control {
    inner: Mutex<ControlState>,
    cond: Condvar,
}

impl Control {
    pub fn new(sync_enabled: bool) -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: DecodeState::Stop,
                running: true,
                sync_enabled,
                resource_epoch: 0,
                seek: None,
                seek_in_flight: None,
                seek_outcome: None,
                next_ticket: 1,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner.lock()
    }

    /// Wake every waiter; call after mutating through [`Control::lock`]
    pub fn notify(&self) {
        self.cond.notify_all();
    }

    pub fn state(&self) -> DecodeState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> (DecodeState, bool, bool) {
        let control = self.inner.lock();
        (control.state, control.running, control.sync_enabled)
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Move from `from` to `to`; no-op when the state changed meanwhile
    pub fn transition(&self, from: DecodeState, to: DecodeState) -> bool {
        let mut control = self.inner.lock();
        if control.state != from || !control.running {
            return false;
        }
        control.state = to;
        drop(control);
        self.cond.notify_all();
        true
    }

    /// Permanently stop the session
    pub fn stop(&self) {
        let mut control = self.inner.lock();
        control.state = DecodeState::Stop;
        control.running = false;
        drop(control);
        self.cond.notify_all();
    }

    /// Block until the state is active, a seek is pending, or the session
    /// stops. Returns whether the session is still running.
    pub fn wait_for_activity(&self) -> bool {
        let mut control = self.inner.lock();
        while control.running && !control.state.is_active() && control.seek.is_none() {
            self.cond.wait(&mut control);
        }
        control.running
    }

    pub fn resource_epoch(&self) -> u64 {
        self.inner.lock().resource_epoch
    }

    pub fn signal_resource(&self) {
        let mut control = self.inner.lock();
        control.resource_epoch = control.resource_epoch.wrapping_add(1);
        drop(control);
        self.cond.notify_all();
    }

    /// Block until the resource epoch moves past `epoch` or the session
    /// stops. Returns whether the session is still running.
    pub fn wait_for_resource(&self, epoch: u64) -> bool {
        let mut control = self.inner.lock();
        while control.running && control.resource_epoch == epoch {
            self.cond.wait(&mut control);
        }
        control.running
    }

    /// Sleep for `delay` while decoding, waking early on stop, pause or seek
    pub fn pace(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut control = self.inner.lock();
        while control.running && control.state == DecodeState::Decoding && control.seek.is_none()
        {
            if self.cond.wait_until(&mut control, deadline).timed_out() {
                break;
            }
        }
    }

    pub fn take_seek(&self) -> Option<SeekRequest> {
        let mut control = self.inner.lock();
        let request = control.seek.take()?;
        control.seek_in_flight = Some(request.resume);
        Some(request)
    }

    /// Publish a seek result and leave SEEKING unless a newer seek or a stop
    /// arrived in the meantime. The session lands in DECODING when the seek
    /// should play on and in START otherwise.
    pub fn complete_seek(&self, ticket: u64, result: Result<i64, String>) {
        let mut control = self.inner.lock();
        let resume = control.seek_in_flight.take().unwrap_or(false);
        control.seek_outcome = Some(SeekOutcome { ticket, result });
        if control.running && control.seek.is_none() && control.state == DecodeState::Seeking {
            control.state = if resume {
                DecodeState::Decoding
            } else {
                DecodeState::Start
            };
        }
        drop(control);
        self.cond.notify_all();
    }

    /// Wait for the outcome of `ticket` or any newer seek
    pub fn wait_for_seek(&self, ticket: u64, timeout: Duration) -> Option<SeekWait> {
        let deadline = Instant::now() + timeout;
        let mut control = self.inner.lock();
        loop {
            if let Some(outcome) = control.seek_outcome.as_ref() {
                if outcome.ticket >= ticket {
                    return Some(SeekWait::Done(outcome.result.clone()));
                }
            }
            if !control.running {
                return Some(SeekWait::Stopped);
            }
            if self.cond.wait_until(&mut control, deadline).timed_out() {
                return None;
            }
        }
    }
}

/// How a seek wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SeekWait {
    Done(Result<i64, String>),
    Stopped,
}

//! Event system for decoder lifecycle events
//!
//! [`ChannelListener`] turns observer callbacks into [`Event`] values on an
//! unbounded channel so that async code can follow a player through an
//! [`EventStream`] instead of implementing listener traits.

use avsync_core::{DecoderHandle, DecoderStateListener, Frame, TrackKind};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// Decoder events, one per observer callback
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The worker entered its run loop
    Prepared {
        /// Track of the session
        track: TrackKind,
    },
    /// Initialization succeeded
    Ready {
        /// Track of the session
        track: TrackKind,
    },
    /// Continuous decoding (re)started
    Running {
        /// Track of the session
        track: TrackKind,
    },
    /// The worker is holding
    Paused {
        /// Track of the session
        track: TrackKind,
    },
    /// A frame was delivered
    Frame {
        /// Track of the session
        track: TrackKind,
        /// Presentation time in milliseconds
        pts_ms: i64,
        /// Decoded payload size in bytes
        size: usize,
    },
    /// The track reached its end
    Finished {
        /// Track of the session
        track: TrackKind,
    },
    /// Codec and extractor were released
    Destroyed {
        /// Track of the session
        track: TrackKind,
    },
    /// The session failed
    Error {
        /// Track of the session
        track: TrackKind,
        /// Error description
        message: String,
    },
}

impl Event {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Prepared { .. } => "prepared",
            Event::Ready { .. } => "ready",
            Event::Running { .. } => "running",
            Event::Paused { .. } => "paused",
            Event::Frame { .. } => "frame",
            Event::Finished { .. } => "finished",
            Event::Destroyed { .. } => "destroyed",
            Event::Error { .. } => "error",
        }
    }

    /// Track the event belongs to
    pub fn track(&self) -> TrackKind {
        match self {
            Event::Prepared { track }
            | Event::Ready { track }
            | Event::Running { track }
            | Event::Paused { track }
            | Event::Frame { track, .. }
            | Event::Finished { track }
            | Event::Destroyed { track }
            | Event::Error { track, .. } => *track,
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, Event::Error { .. })
    }

    /// Check if this event ends the session's useful life
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Finished { .. } | Event::Destroyed { .. } | Event::Error { .. }
        )
    }
}

/// Stream of decoder events for async iteration
#[derive(Debug)]
pub struct EventStream {
    /// Receiver for events
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.receiver.poll_recv(cx)
    }
}

/// Listener forwarding every callback into an event channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelListener {
    /// Listener paired with a fresh [`EventStream`]
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, EventStream::new(receiver))
    }

    fn send(&self, event: Event) {
        // A dropped stream just means nobody is listening anymore
        if self.sender.send(event).is_err() {
            trace!("Event stream closed, event dropped");
        }
    }
}

impl DecoderStateListener for ChannelListener {
    fn on_prepare(&self, decoder: &DecoderHandle) {
        self.send(Event::Prepared {
            track: decoder.track(),
        });
    }

    fn on_ready(&self, decoder: &DecoderHandle) {
        self.send(Event::Ready {
            track: decoder.track(),
        });
    }

    fn on_running(&self, decoder: &DecoderHandle) {
        self.send(Event::Running {
            track: decoder.track(),
        });
    }

    fn on_pause(&self, decoder: &DecoderHandle) {
        self.send(Event::Paused {
            track: decoder.track(),
        });
    }

    fn on_frame(&self, decoder: &DecoderHandle, frame: &Frame<'_>) {
        self.send(Event::Frame {
            track: decoder.track(),
            pts_ms: frame.timestamp_ms(),
            size: frame.data().len(),
        });
    }

    fn on_finish(&self, decoder: &DecoderHandle) {
        self.send(Event::Finished {
            track: decoder.track(),
        });
    }

    fn on_destroy(&self, decoder: &DecoderHandle) {
        self.send(Event::Destroyed {
            track: decoder.track(),
        });
    }

    fn on_error(&self, decoder: &DecoderHandle, message: &str) {
        self.send(Event::Error {
            track: decoder.track(),
            message: message.to_string(),
        });
    }
}

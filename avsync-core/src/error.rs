//! Error types for avsync

use std::time::Duration;
use thiserror::Error;

/// Main error type for decode sessions
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Media file does not exist or the path is empty
    #[error("Media file not found: {path}")]
    FileNotFound {
        /// Offending path
        path: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason the configuration was rejected
        reason: String,
    },

    /// A required key is absent from the track format
    #[error("Missing format key: {key}")]
    MissingFormatKey {
        /// Format key name
        key: String,
    },

    /// No extractor track or decoder for the given MIME type
    #[error("Unsupported format: {mime}")]
    UnsupportedFormat {
        /// MIME type or format description
        mime: String,
    },

    /// Codec call failed
    #[error("Codec failure: {codec} - {reason}")]
    CodecFailure {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Extractor call failed
    #[error("Extractor failure: {reason}")]
    ExtractorFailure {
        /// Failure reason
        reason: String,
    },

    /// Sample does not fit the buffer it is read into
    #[error("Buffer overflow: {size} bytes into {capacity} byte buffer")]
    BufferOverflow {
        /// Size of the data
        size: usize,
        /// Capacity of the buffer
        capacity: usize,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Audio output or surface failure
    #[error("Render error: {reason}")]
    Render {
        /// Reason for the render failure
        reason: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Duration after which the operation gave up
        duration: Duration,
    },

    /// Session has been stopped and cannot serve the request
    #[error("Session stopped")]
    SessionStopped,

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Result type alias for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

impl PlaybackError {
    /// Shorthand for a codec failure
    pub fn codec(codec: impl Into<String>, reason: impl Into<String>) -> Self {
        PlaybackError::CodecFailure {
            codec: codec.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an extractor failure
    pub fn extractor(reason: impl Into<String>) -> Self {
        PlaybackError::ExtractorFailure {
            reason: reason.into(),
        }
    }

    /// Check if a fresh session could succeed after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlaybackError::Io { .. } => true,
            PlaybackError::Timeout { .. } => true,
            PlaybackError::Render { .. } => true,
            PlaybackError::CodecFailure { .. } => true,
            PlaybackError::SessionStopped => true,
            PlaybackError::FileNotFound { .. } => false,
            PlaybackError::UnsupportedFormat { .. } => false,
            PlaybackError::MissingFormatKey { .. } => false,
            PlaybackError::InvalidConfiguration { .. } => false,
            PlaybackError::MissingConfiguration { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlaybackError::Initialization { .. } => ErrorCategory::Precondition,
            PlaybackError::MissingConfiguration { .. } => ErrorCategory::Precondition,
            PlaybackError::FileNotFound { .. } => ErrorCategory::Precondition,
            PlaybackError::InvalidConfiguration { .. } => ErrorCategory::Precondition,
            PlaybackError::MissingFormatKey { .. } => ErrorCategory::Format,
            PlaybackError::UnsupportedFormat { .. } => ErrorCategory::Format,
            PlaybackError::CodecFailure { .. } => ErrorCategory::Runtime,
            PlaybackError::ExtractorFailure { .. } => ErrorCategory::Runtime,
            PlaybackError::BufferOverflow { .. } => ErrorCategory::Runtime,
            PlaybackError::InvalidState { .. } => ErrorCategory::Runtime,
            PlaybackError::Render { .. } => ErrorCategory::Runtime,
            PlaybackError::Timeout { .. } => ErrorCategory::System,
            PlaybackError::SessionStopped => ErrorCategory::Teardown,
            PlaybackError::Io { .. } => ErrorCategory::System,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing file, missing display target, bad configuration
    Precondition,
    /// Unreadable container or codec type
    Format,
    /// Failures raised inside the decode loop
    Runtime,
    /// Failures while releasing resources or talking to a stopped session
    Teardown,
    /// I/O and timing errors
    System,
}

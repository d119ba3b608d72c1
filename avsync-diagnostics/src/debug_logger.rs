//! Structured debug logging system

use avsync_core::{PlaybackError, PlaybackResult};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor the caller gives one
pub const DEFAULT_FILTER: &str = "info";

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the process-wide `tracing` subscriber
#[derive(Debug)]
pub struct DebugLogger {
    filter: String,
}

impl DebugLogger {
    /// Logger using the default `info` directive
    pub fn new() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
        }
    }

    /// Logger using `filter` when `RUST_LOG` is unset
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
        }
    }

    /// Filter directive this logger falls back to
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Install the subscriber; later calls are no-ops
    pub fn install(&self) -> PlaybackResult<()> {
        Self::init_with_filter(&self.filter)
    }

    /// Initialize logging with the default directive
    pub fn init_logging() -> PlaybackResult<()> {
        Self::init_with_filter(DEFAULT_FILTER)
    }

    /// Initialize logging, preferring `RUST_LOG` over `filter`
    pub fn init_with_filter(filter: &str) -> PlaybackResult<()> {
        if INSTALLED.load(Ordering::SeqCst) {
            return Ok(());
        }

        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(env_filter) => env_filter,
            Err(_) => EnvFilter::try_new(filter).map_err(|e| {
                PlaybackError::InvalidConfiguration {
                    reason: format!("log filter '{}': {}", filter, e),
                }
            })?,
        };

        // Another subscriber may already be installed by the embedding
        // application; that one stays in charge.
        let result = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_thread_names(true)
            .try_init();
        INSTALLED.store(true, Ordering::SeqCst);

        match result {
            Ok(()) => tracing::debug!("Logging initialized with filter {}", filter),
            Err(e) => tracing::debug!("Keeping existing subscriber: {}", e),
        }
        Ok(())
    }

    /// Whether a subscriber installation has been attempted
    pub fn is_initialized() -> bool {
        INSTALLED.load(Ordering::SeqCst)
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}

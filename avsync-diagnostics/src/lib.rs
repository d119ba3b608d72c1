//! # avsync Diagnostics
//!
//! Debugging and diagnostic tools for avsync decode sessions.
//! Provides logging setup, frame pacing profiling and session reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod pacing_profiler;
pub mod session_report;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use pacing_profiler::{PacingProfiler, PacingStats};
pub use session_report::SessionReport;

//! Error taxonomy
//!
//! - [`RenderError`]: a single renderer call failed or timed out. Always absorbed into an
//!   error-bearing [`Snapshot`](crate::snapshot::Snapshot), never returned to callers.
//! - [`SchedulerError`]: the scheduler could not start or one of its jobs died. Handled by the
//!   supervising service under its restart budget.
//! - [`ChartError`]: caller-facing configuration errors, rejected at the provider boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to callers of the provider
#[derive(Debug, Error)]
pub enum ChartError {
    /// The timeframe token is not one of the supported tiers
    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    /// Symbol was empty after normalization
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// A tier override violates the tier invariants
    #[error("Invalid tier for {timeframe}: {reason}")]
    InvalidTier { timeframe: String, reason: String },

    /// A process-wide provider was already installed
    #[error("A chart provider is already installed for this process")]
    AlreadyInstalled,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Errors produced by a [`Renderer`](crate::render::Renderer)
#[derive(Debug, Error)]
pub enum RenderError {
    /// The render did not finish within the tier timeout
    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure talking to a remote renderer
    #[error("Render request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The renderer reported an explicit failure
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// The renderer panicked mid-call
    #[error("Renderer panicked: {0}")]
    Panicked(String),
}

/// Scheduler crash taxonomy
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Neither the caller nor the defaults name any pair to track
    #[error("No symbol/timeframe pairs to track")]
    NoTrackedPairs,

    /// The snapshot directory could not be prepared
    #[error("Cannot prepare snapshot directory {path:?}: {message}")]
    SnapshotDir { path: PathBuf, message: String },

    /// A periodic capture job panicked outside the renderer call
    #[error("Capture job for {key} panicked: {message}")]
    JobPanicked { key: String, message: String },
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

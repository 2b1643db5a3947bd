//! Chart-Freshness: always-fresh rendered market charts
//!
//! This crate keeps a rendered chart per (symbol, timeframe) close at hand for visual
//! analysis consumers, without making every request pay the full render cost.
//!
//! # Features
//!
//! - **Snapshots**: immutable capture results with lazy, read-time staleness checks
//! - **Cache**: thread-safe latest-snapshot-per-key map with hit/miss accounting
//! - **Scheduler**: per-timeframe periodic capture jobs plus a cold-start sweep
//! - **Provider**: read-through and fresh-or-capture access, concurrent batch refresh
//! - **Service**: crash supervision with a sliding restart budget and health reporting
//!
//! # Example
//!
//! ```no_run
//! use chart_freshness::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let renderer = Arc::new(HttpRenderer::new("http://localhost:8085", None)?);
//!     let provider = ChartProvider::new(SchedulerConfig::default(), renderer);
//!     provider.start_scheduler(&[], &[]).await?;
//!     let chart = provider.get_fresh_chart("BTCUSDT", "1h").await?;
//!     println!("{} bytes, error: {:?}", chart.image.len(), chart.error);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod provider;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod snapshot;

// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::provider::*;
    pub use crate::render::*;
    pub use crate::scheduler::*;
    pub use crate::service::*;
    pub use crate::snapshot::*;
}

/// Result type alias for operations that can hit a configuration error
pub type Result<T> = std::result::Result<T, error::ChartError>;

//! Snapshot cache module
//!
//! Latest snapshot per (symbol, timeframe), with lazy read-time staleness.

pub mod store;

pub use store::*;

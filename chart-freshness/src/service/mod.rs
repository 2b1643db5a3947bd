//! Supervising service module
//!
//! Runs the capture scheduler under crash recovery with a sliding restart budget.

pub mod restart;
pub mod supervisor;

pub use restart::*;
pub use supervisor::*;

//! Capture scheduling module
//!
//! Periodic per-pair capture jobs, the cold-start sweep, and status reporting.

pub mod capture;
pub mod status;

pub use capture::*;
pub use status::*;

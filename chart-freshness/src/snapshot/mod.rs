//! Snapshot module
//!
//! Immutable capture results and the keys they are cached under.

pub mod chart;
pub mod key;

pub use chart::*;
pub use key::*;

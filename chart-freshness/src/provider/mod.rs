//! Chart provider module
//!
//! The access point consumers use: an explicit handle over one lazily built
//! scheduler, plus an opt-in process-wide registry for code that cannot be handed it.

pub mod facade;
pub mod registry;

pub use facade::*;
pub use registry::*;

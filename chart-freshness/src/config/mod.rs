//! Configuration module

pub mod scheduler;
pub mod service;
pub mod timeframe;

pub use scheduler::*;
pub use service::*;
pub use timeframe::*;

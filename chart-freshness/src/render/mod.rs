//! Renderer integration module
//!
//! The chart drawing itself lives outside this crate; this module defines the
//! capability the scheduler calls and an HTTP client for a remote render service.

pub mod http;
pub mod renderer;

pub use http::*;
pub use renderer::*;

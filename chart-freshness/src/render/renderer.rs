//! Renderer capability

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Timeframe;
use crate::error::RenderError;

/// What to draw
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub indicators: Vec<String>,
    /// Caller's deadline; the scheduler also enforces it from outside
    pub timeout: Duration,
}

/// Rendered chart
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub image: Vec<u8>,
    pub generation_time_ms: f64,
}

/// Turns a symbol and timeframe into a chart image
///
/// Implementations must be safe to call concurrently. If they need an exclusive
/// resource internally (a single browser, a GPU context) they serialize on it themselves.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render one chart
    ///
    /// # Returns
    ///
    /// * `Ok(RenderOutput)` - Image bytes and how long rendering took.
    /// * `Err(RenderError)` - Explicit renderer failure or transport error.
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}

//! HTTP renderer client
//!
//! Talks to a chart rendering service exposing `POST /render`.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::Timeframe;
use crate::error::RenderError;
use crate::render::{RenderOutput, RenderRequest, Renderer};

/// Header a render service may use to report its own timing
pub const GENERATION_TIME_HEADER: &str = "x-generation-time-ms";

#[derive(Debug, Clone)]
pub struct HttpRenderer {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct RenderBody<'a> {
    symbol: &'a str,
    timeframe: Timeframe,
    indicators: &'a [String],
}

impl HttpRenderer {
    /// Create a client for the service at `base_url`
    ///
    /// Timeouts are per request, taken from each [`RenderRequest`].
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn render_url(&self) -> String {
        format!("{}/render", self.base_url)
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let started = Instant::now();
        let body = RenderBody {
            symbol: &request.symbol,
            timeframe: request.timeframe,
            indicators: &request.indicators,
        };

        let mut call = self
            .client
            .post(self.render_url())
            .timeout(request.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Timeout(request.timeout)
            } else {
                RenderError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RenderError::Renderer(format!("{}: {}", status, text.trim())));
        }

        let reported_ms = response
            .headers()
            .get(GENERATION_TIME_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());

        let image = response.bytes().await?.to_vec();
        if image.is_empty() {
            return Err(RenderError::Renderer("empty image body".to_string()));
        }

        let generation_time_ms =
            reported_ms.unwrap_or_else(|| started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            "Rendered {} {} ({} bytes, {:.0}ms)",
            request.symbol,
            request.timeframe,
            image.len(),
            generation_time_ms
        );

        Ok(RenderOutput {
            image,
            generation_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_url_trims_slash() {
        let renderer = HttpRenderer::new("http://localhost:8085/", None).unwrap();
        assert_eq!(renderer.render_url(), "http://localhost:8085/render");
    }

    #[test]
    fn test_body_serializes_timeframe_token() {
        let indicators = vec!["RSI".to_string()];
        let body = RenderBody {
            symbol: "BTCUSDT",
            timeframe: Timeframe::H4,
            indicators: &indicators,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["timeframe"], "4h");
        assert_eq!(json["indicators"][0], "RSI");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Port 9 (discard) is not expected to serve HTTP locally.
        let renderer = HttpRenderer::new("http://127.0.0.1:9", None).unwrap();
        let request = RenderRequest {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            indicators: Vec::new(),
            timeout: Duration::from_secs(2),
        };
        assert!(renderer.render(&request).await.is_err());
    }
}

//! Chart snapshot

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Timeframe;
use crate::snapshot::CacheKey;

/// One capture result for a symbol/timeframe pair
///
/// Never mutated once built; a newer capture replaces it in the cache as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// When the capture was issued
    pub timestamp: DateTime<Utc>,
    /// Encoded chart image, empty on failure
    #[serde(skip)]
    pub image: Vec<u8>,
    pub generation_time_ms: f64,
    pub error: Option<String>,
    pub indicators: Vec<String>,
    /// Where the image was persisted, if anywhere
    pub file_path: Option<PathBuf>,
}

impl Snapshot {
    /// Successful capture stamped now
    pub fn success(
        key: &CacheKey,
        image: Vec<u8>,
        generation_time_ms: f64,
        indicators: Vec<String>,
    ) -> Self {
        Self {
            symbol: key.symbol().to_string(),
            timeframe: key.timeframe(),
            timestamp: Utc::now(),
            image,
            generation_time_ms,
            error: None,
            indicators,
            file_path: None,
        }
    }

    /// Failed capture stamped now, carrying the error text and no image
    pub fn failure(key: &CacheKey, error: impl Into<String>, indicators: Vec<String>) -> Self {
        Self {
            symbol: key.symbol().to_string(),
            timeframe: key.timeframe(),
            timestamp: Utc::now(),
            image: Vec::new(),
            generation_time_ms: 0.0,
            error: Some(error.into()),
            indicators,
            file_path: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_generation_time_ms(mut self, generation_time_ms: f64) -> Self {
        self.generation_time_ms = generation_time_ms;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    /// Rebuild the cache key; symbol is already normalized
    pub fn key(&self) -> CacheKey {
        CacheKey::from_normalized(self.symbol.clone(), self.timeframe)
    }

    /// Elapsed time since capture; zero if the clock went backwards
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn age_seconds(&self) -> f64 {
        self.age().as_secs_f64()
    }

    /// Servable: no error, non-empty image, younger than `max_age`
    pub fn is_valid(&self, max_age: Duration) -> bool {
        self.error.is_none() && !self.image.is_empty() && self.age() < max_age
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn image_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.image)
    }
}

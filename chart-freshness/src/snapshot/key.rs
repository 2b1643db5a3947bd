//! Cache key

use std::fmt;

use serde::Serialize;

use crate::config::Timeframe;
use crate::error::ChartError;

/// Normalized (symbol, timeframe) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey {
    symbol: String,
    timeframe: Timeframe,
}

impl CacheKey {
    /// Build a key, normalizing the symbol to trimmed uppercase
    pub fn new(symbol: &str, timeframe: Timeframe) -> Result<Self, ChartError> {
        let symbol = normalize_symbol(symbol)?;
        Ok(Self { symbol, timeframe })
    }

    /// Parse both parts, rejecting unsupported timeframe tokens
    pub fn parse(symbol: &str, timeframe: &str) -> Result<Self, ChartError> {
        Self::new(symbol, timeframe.parse()?)
    }

    pub(crate) fn from_normalized(symbol: String, timeframe: Timeframe) -> Self {
        Self { symbol, timeframe }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

/// `BTCUSDT_1h`, the form used as batch result keys and file stems
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbol, self.timeframe)
    }
}

pub fn normalize_symbol(symbol: &str) -> Result<String, ChartError> {
    let normalized = symbol.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(ChartError::InvalidSymbol(symbol.to_string()));
    }
    Ok(normalized)
}

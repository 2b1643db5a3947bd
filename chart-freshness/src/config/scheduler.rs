//! Capture scheduler configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{TierTable, Timeframe};

/// Capture scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tier per timeframe
    pub tiers: TierTable,
    /// Symbols tracked when `start` is called without any
    pub default_symbols: Vec<String>,
    /// Timeframes tracked when `start` is called without any
    pub default_timeframes: Vec<Timeframe>,
    /// Indicator set passed to the renderer on every capture
    pub indicators: Vec<String>,
    /// How long `stop` waits for in-flight captures before aborting them
    pub stop_grace: Duration,
    /// Directory receiving `<SYMBOL>_<timeframe>.png` for successful captures
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            default_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            default_timeframes: vec![Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::H1],
            indicators: vec!["RSI".to_string(), "MACD".to_string(), "Volume".to_string()],
            stop_grace: Duration::from_secs(5),
            snapshot_dir: None,
        }
    }
}

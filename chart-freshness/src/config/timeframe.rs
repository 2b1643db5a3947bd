//! Supported timeframes and their capture tiers

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChartError;

/// Chart timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Canonical token, e.g. `"15m"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Built-in tier: shorter timeframes refresh more often and expire sooner
    pub fn default_tier(&self) -> TimeframeTier {
        let (interval, ttl, timeout) = match self {
            Timeframe::M1 => (60, 60, 30),
            Timeframe::M5 => (120, 300, 45),
            Timeframe::M15 => (300, 900, 60),
            Timeframe::M30 => (600, 1_800, 60),
            Timeframe::H1 => (900, 3_600, 60),
            Timeframe::H4 => (1_800, 14_400, 90),
            Timeframe::D1 => (3_600, 86_400, 90),
        };
        TimeframeTier::new(
            Duration::from_secs(interval),
            Duration::from_secs(ttl),
            Duration::from_secs(timeout),
        )
    }

    /// Parse a comma separated token list, e.g. `"1m, 5m,1h"`
    pub fn parse_list(list: &str) -> Result<Vec<Timeframe>, ChartError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for Timeframe {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Minutes stay lowercase only: "1M" would read as one month.
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "1H" => Ok(Timeframe::H1),
            "4h" | "4H" => Ok(Timeframe::H4),
            "1d" | "1D" => Ok(Timeframe::D1),
            other => Err(ChartError::UnsupportedTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture schedule for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeTier {
    /// How often the periodic job re-renders
    pub capture_interval: Duration,
    /// Maximum age at which a snapshot is still served
    pub ttl: Duration,
    /// Upper bound for one renderer call
    pub render_timeout: Duration,
}

impl TimeframeTier {
    pub fn new(capture_interval: Duration, ttl: Duration, render_timeout: Duration) -> Self {
        Self {
            capture_interval,
            ttl,
            render_timeout,
        }
    }

    fn validate(&self, timeframe: Timeframe) -> Result<(), ChartError> {
        let invalid = |reason: &str| ChartError::InvalidTier {
            timeframe: timeframe.to_string(),
            reason: reason.to_string(),
        };
        if self.capture_interval.is_zero() {
            return Err(invalid("capture interval must be positive"));
        }
        if self.render_timeout.is_zero() {
            return Err(invalid("render timeout must be positive"));
        }
        if self.ttl < self.capture_interval {
            return Err(invalid("ttl must be at least the capture interval"));
        }
        Ok(())
    }
}

/// Tier override as read from a JSON config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierSpec {
    pub capture_interval_secs: u64,
    pub ttl_secs: u64,
    pub timeout_secs: u64,
}

impl From<TierSpec> for TimeframeTier {
    fn from(spec: TierSpec) -> Self {
        TimeframeTier::new(
            Duration::from_secs(spec.capture_interval_secs),
            Duration::from_secs(spec.ttl_secs),
            Duration::from_secs(spec.timeout_secs),
        )
    }
}

/// Tier per supported timeframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    tiers: HashMap<Timeframe, TimeframeTier>,
}

impl TierTable {
    /// Merge `overrides` over the built-in tiers and validate the result
    pub fn with_overrides<I>(overrides: I) -> Result<Self, ChartError>
    where
        I: IntoIterator<Item = (Timeframe, TimeframeTier)>,
    {
        let mut table = Self::default();
        for (timeframe, tier) in overrides {
            tier.validate(timeframe)?;
            table.tiers.insert(timeframe, tier);
        }
        Ok(table)
    }

    /// Build from string-keyed specs, e.g. a parsed JSON file
    pub fn from_specs(specs: HashMap<String, TierSpec>) -> Result<Self, ChartError> {
        let overrides = specs
            .into_iter()
            .map(|(token, spec)| Ok((token.parse::<Timeframe>()?, spec.into())))
            .collect::<Result<Vec<_>, ChartError>>()?;
        Self::with_overrides(overrides)
    }

    pub fn get(&self, timeframe: Timeframe) -> TimeframeTier {
        self.tiers
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| timeframe.default_tier())
    }

    pub fn ttl(&self, timeframe: Timeframe) -> Duration {
        self.get(timeframe).ttl
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: Timeframe::ALL
                .iter()
                .map(|tf| (*tf, tf.default_tier()))
                .collect(),
        }
    }
}

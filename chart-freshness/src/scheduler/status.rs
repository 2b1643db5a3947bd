//! Scheduler status reporting

use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheStats;

/// Point-in-time view of the scheduler, serialized as the public status surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub uptime_human: String,
    pub scheduled_jobs: usize,
    pub jobs_executed: u64,
    pub jobs_failed: u64,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub valid_entries: usize,
    pub total_entries: usize,
    pub stats: HitStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HitStats {
    pub hits: u64,
    pub misses: u64,
}

impl From<CacheStats> for CacheStatus {
    fn from(stats: CacheStats) -> Self {
        Self {
            valid_entries: stats.valid_entries,
            total_entries: stats.total_entries,
            stats: HitStats {
                hits: stats.hits,
                misses: stats.misses,
            },
        }
    }
}

/// `1d 2h 3m 4s`, leading zero units omitted
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

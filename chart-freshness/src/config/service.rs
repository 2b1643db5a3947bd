//! Supervising service configuration

use std::time::Duration;

/// Restart budget and health reporting settings
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    /// Restarts allowed within one window
    pub max_restarts: u32,
    /// Sliding window; a crash this long after the previous restart starts a fresh budget
    pub restart_window: Duration,
    /// Pause before bringing the scheduler back up
    pub restart_cooldown: Duration,
    /// Interval between health lines
    pub health_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window: Duration::from_secs(300),
            restart_cooldown: Duration::from_secs(10),
            health_interval: Duration::from_secs(300),
        }
    }
}

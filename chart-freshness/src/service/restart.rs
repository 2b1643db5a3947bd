//! Restart budget

use std::time::{Duration, Instant};

/// What to do after a crash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart; `attempt` counts restarts in the current window
    Restart { attempt: u32 },
    /// Budget spent, stop for good
    GiveUp { restarts: u32 },
}

/// Sliding "restarts per window" budget
///
/// A crash arriving more than `restart_window` after the previous restart starts the
/// count over, so the budget is never a lifetime cap.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub restart_count: u32,
    pub last_restart_time: Option<Instant>,
    pub max_restarts: u32,
    pub restart_window: Duration,
}

impl RestartPolicy {
    pub fn new(max_restarts: u32, restart_window: Duration) -> Self {
        Self {
            restart_count: 0,
            last_restart_time: None,
            max_restarts,
            restart_window,
        }
    }

    /// Record a crash observed at `now` and decide whether to restart
    pub fn register_crash(&mut self, now: Instant) -> RestartDecision {
        if let Some(last) = self.last_restart_time {
            if now.saturating_duration_since(last) > self.restart_window {
                self.restart_count = 0;
            }
        }

        self.restart_count += 1;
        self.last_restart_time = Some(now);

        if self.restart_count <= self.max_restarts {
            RestartDecision::Restart {
                attempt: self.restart_count,
            }
        } else {
            RestartDecision::GiveUp {
                restarts: self.restart_count - 1,
            }
        }
    }
}

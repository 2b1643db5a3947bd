//! Supervising service
//!
//! `Idle --run()--> RunningScheduler --crash--> EvaluatingRestart`, then either back to
//! `RunningScheduler` after a cooldown or, once the budget is spent, a terminal stop.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant as TokioInstant};
use tracing::{error, info, warn};

use crate::config::{ServiceConfig, Timeframe};
use crate::error::ChartError;
use crate::provider::ChartProvider;
use crate::scheduler::CaptureScheduler;
use crate::service::{RestartDecision, RestartPolicy};

/// Requests delivered to a running service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop the scheduler and leave the run loop
    Terminate,
    /// Accepted and logged; reloading configuration is not implemented
    Reload,
}

/// How the service ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceExit {
    Shutdown,
    RestartBudgetExhausted { restarts: u32, last_error: String },
}

/// Sends control signals to a [`SupervisingService`]
///
/// Dropping every handle has the same effect as [`terminate`](Self::terminate).
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    control_tx: mpsc::Sender<ControlSignal>,
}

impl ServiceHandle {
    /// Returns `false` if the service is already gone
    pub async fn terminate(&self) -> bool {
        self.control_tx.send(ControlSignal::Terminate).await.is_ok()
    }

    pub async fn reload(&self) -> bool {
        self.control_tx.send(ControlSignal::Reload).await.is_ok()
    }
}

enum RunOutcome {
    Terminated,
    Crashed(String),
}

pub struct SupervisingService {
    provider: ChartProvider,
    config: ServiceConfig,
    symbols: Vec<String>,
    timeframes: Vec<String>,
    policy: RestartPolicy,
    control_rx: mpsc::Receiver<ControlSignal>,
}

impl SupervisingService {
    /// Build a service tracking `symbols` × `timeframes` on top of the defaults
    pub fn new(
        provider: ChartProvider,
        config: ServiceConfig,
        symbols: Vec<String>,
        timeframes: Vec<String>,
    ) -> Result<(Self, ServiceHandle), ChartError> {
        for timeframe in &timeframes {
            timeframe.parse::<Timeframe>()?;
        }

        let (control_tx, control_rx) = mpsc::channel(8);
        let service = Self {
            provider,
            policy: RestartPolicy::new(config.max_restarts, config.restart_window),
            config,
            symbols,
            timeframes,
            control_rx,
        };
        Ok((service, ServiceHandle { control_tx }))
    }

    pub fn restart_policy(&self) -> &RestartPolicy {
        &self.policy
    }

    /// Run until terminated or until the restart budget is exhausted
    pub async fn run(mut self) -> ServiceExit {
        self.supervise().await
    }

    async fn supervise(&mut self) -> ServiceExit {
        info!("Starting chart capture service");

        loop {
            let reason = match self.run_scheduler().await {
                RunOutcome::Terminated => {
                    info!("Shutdown requested; stopping scheduler");
                    self.provider.stop_scheduler().await;
                    return ServiceExit::Shutdown;
                }
                RunOutcome::Crashed(reason) => reason,
            };

            error!("Scheduler crashed: {}", reason);
            self.provider.stop_scheduler().await;

            match self.policy.register_crash(Instant::now()) {
                RestartDecision::Restart { attempt } => {
                    warn!(
                        "Restarting scheduler in {:?} (restart {}/{} within {:?})",
                        self.config.restart_cooldown,
                        attempt,
                        self.config.max_restarts,
                        self.config.restart_window
                    );
                    if self.cooldown().await {
                        info!("Shutdown requested during restart cooldown");
                        return ServiceExit::Shutdown;
                    }
                }
                RestartDecision::GiveUp { restarts } => {
                    error!(
                        "Restart budget exhausted ({} restarts within {:?}); chart service stopped permanently. Last error: {}",
                        restarts, self.config.restart_window, reason
                    );
                    return ServiceExit::RestartBudgetExhausted {
                        restarts,
                        last_error: reason,
                    };
                }
            }
        }
    }

    async fn run_scheduler(&mut self) -> RunOutcome {
        // Terminate must not wait for the cold-start sweep; dropping the start future
        // leaves the sweep to `stop_scheduler`, which bounds it by the stop grace.
        let start = self
            .provider
            .start_scheduler(&self.symbols, &self.timeframes);
        tokio::pin!(start);
        let scheduler = loop {
            tokio::select! {
                started = &mut start => match started {
                    Ok(scheduler) => break scheduler,
                    Err(e) => return RunOutcome::Crashed(e.to_string()),
                },
                signal = self.control_rx.recv() => match signal {
                    Some(ControlSignal::Terminate) | None => return RunOutcome::Terminated,
                    Some(ControlSignal::Reload) => {
                        info!("Reload requested during start; ignoring");
                    }
                },
            }
        };

        // tokio intervals reject a zero period
        let period = self.config.health_interval.max(Duration::from_millis(1));
        let mut health = interval_at(TokioInstant::now() + period, period);

        loop {
            tokio::select! {
                signal = self.control_rx.recv() => match signal {
                    Some(ControlSignal::Terminate) | None => return RunOutcome::Terminated,
                    Some(ControlSignal::Reload) => {
                        info!("Reload requested; configuration reload is not supported yet, ignoring");
                    }
                },
                crash = scheduler.crashed() => return RunOutcome::Crashed(crash.to_string()),
                _ = health.tick() => report_health(&scheduler),
            }
        }
    }

    /// Sleep out the restart cooldown; `true` if terminate arrived meanwhile
    async fn cooldown(&mut self) -> bool {
        let pause = sleep(self.config.restart_cooldown);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => return false,
                signal = self.control_rx.recv() => match signal {
                    Some(ControlSignal::Terminate) | None => return true,
                    Some(ControlSignal::Reload) => {
                        info!("Reload requested during cooldown; ignoring");
                    }
                },
            }
        }
    }
}

fn report_health(scheduler: &CaptureScheduler) {
    let status = scheduler.get_status();
    info!(
        "Health: up {}, {} valid charts cached, {} jobs executed, {} failed",
        status.uptime_human, status.cache.valid_entries, status.jobs_executed, status.jobs_failed
    );
}

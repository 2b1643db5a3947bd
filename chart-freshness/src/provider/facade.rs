//! Chart provider facade

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{SchedulerConfig, Timeframe};
use crate::render::Renderer;
use crate::scheduler::{CaptureScheduler, SchedulerStatus};
use crate::snapshot::{normalize_symbol, CacheKey, Snapshot};
use crate::Result;

struct ProviderInner {
    config: SchedulerConfig,
    renderer: Arc<dyn Renderer>,
    scheduler: OnceLock<CaptureScheduler>,
    started: Mutex<bool>,
}

/// Application-owned handle to the chart subsystem
///
/// Cheap to clone; clones share one scheduler and one cache. Timeframes arrive as
/// tokens and an unsupported token is rejected here, never mapped to some default tier.
#[derive(Clone)]
pub struct ChartProvider {
    inner: Arc<ProviderInner>,
}

fn parse_timeframes(timeframes: &[String]) -> Result<Vec<Timeframe>> {
    timeframes.iter().map(|tf| tf.parse()).collect()
}

impl ChartProvider {
    pub fn new(config: SchedulerConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                config,
                renderer,
                scheduler: OnceLock::new(),
                started: Mutex::new(false),
            }),
        }
    }

    /// The scheduler, created on first use
    pub fn get_scheduler(&self) -> &CaptureScheduler {
        self.inner.scheduler.get_or_init(|| {
            info!("Creating capture scheduler");
            CaptureScheduler::new(self.inner.config.clone(), self.inner.renderer.clone())
        })
    }

    /// Start the scheduler once
    ///
    /// A later call returns the running scheduler untouched, even with a different
    /// symbol/timeframe set; use [`track_chart`](Self::track_chart) to add pairs.
    pub async fn start_scheduler(
        &self,
        symbols: &[String],
        timeframes: &[String],
    ) -> Result<CaptureScheduler> {
        let timeframes = parse_timeframes(timeframes)?;
        let mut started = self.inner.started.lock().await;
        let scheduler = self.get_scheduler().clone();

        if *started {
            debug!("Scheduler already started; ignoring start request");
            return Ok(scheduler);
        }

        scheduler.start(symbols, &timeframes).await?;
        *started = true;
        Ok(scheduler)
    }

    /// Stop the scheduler if it was started; harmless otherwise
    pub async fn stop_scheduler(&self) {
        let mut started = self.inner.started.lock().await;
        if let Some(scheduler) = self.inner.scheduler.get() {
            scheduler.stop().await;
        }
        *started = false;
    }

    pub async fn is_started(&self) -> bool {
        *self.inner.started.lock().await
    }

    /// Cached chart if valid for `max_age` (tier ttl when `None`)
    pub fn get_chart(
        &self,
        symbol: &str,
        timeframe: &str,
        max_age: Option<Duration>,
    ) -> Result<Option<Arc<Snapshot>>> {
        let key = CacheKey::parse(symbol, timeframe)?;
        Ok(self.get_scheduler().get_chart(&key, max_age))
    }

    /// Cached chart, or one captured now; render failures show up in `error`
    pub async fn get_fresh_chart(&self, symbol: &str, timeframe: &str) -> Result<Arc<Snapshot>> {
        let key = CacheKey::parse(symbol, timeframe)?;
        Ok(self.get_scheduler().get_fresh_chart(&key).await)
    }

    /// Like [`get_fresh_chart`](Self::get_fresh_chart), with the capture on its own task
    ///
    /// The capture finishes and lands in the cache even if the caller gives up waiting.
    pub async fn get_fresh_chart_async(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Arc<Snapshot>> {
        let key = CacheKey::parse(symbol, timeframe)?;
        Ok(self.spawn_fresh(key).await)
    }

    async fn spawn_fresh(&self, key: CacheKey) -> Arc<Snapshot> {
        let scheduler = self.get_scheduler().clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move { scheduler.get_fresh_chart(&task_key).await });

        match task.await {
            Ok(snapshot) => snapshot,
            Err(e) => Arc::new(Snapshot::failure(
                &key,
                format!("capture task failed: {}", e),
                self.inner.config.indicators.clone(),
            )),
        }
    }

    /// Make sure every `symbols` × `timeframes` pair has a chart no older than `max_age`
    ///
    /// Valid cache entries are served as is; everything else is captured concurrently.
    /// Every pair gets an entry keyed `"{SYMBOL}_{timeframe}"`, error-bearing where the
    /// render failed. Only a bad symbol or timeframe fails the whole call, before any
    /// capture starts.
    pub async fn ensure_fresh_charts(
        &self,
        symbols: &[String],
        timeframes: &[String],
        max_age: Option<Duration>,
    ) -> Result<HashMap<String, Arc<Snapshot>>> {
        let timeframes = parse_timeframes(timeframes)?;
        let mut keys = BTreeSet::new();
        for symbol in symbols {
            for timeframe in &timeframes {
                keys.insert(CacheKey::new(symbol, *timeframe)?);
            }
        }

        let scheduler = self.get_scheduler();
        let mut charts = HashMap::with_capacity(keys.len());
        let mut pending = Vec::new();
        for key in keys {
            match scheduler.get_chart(&key, max_age) {
                Some(snapshot) => {
                    charts.insert(key.to_string(), snapshot);
                }
                None => pending.push(key),
            }
        }

        if !pending.is_empty() {
            debug!("Capturing {} stale or missing charts", pending.len());
            let captures = pending.into_iter().map(|key| async move {
                let scheduler = self.get_scheduler().clone();
                let task_key = key.clone();
                let result = tokio::spawn(async move { scheduler.capture_chart(&task_key).await })
                    .await
                    .unwrap_or_else(|e| {
                        Arc::new(Snapshot::failure(
                            &key,
                            format!("capture task failed: {}", e),
                            self.inner.config.indicators.clone(),
                        ))
                    });
                (key, result)
            });
            for (key, snapshot) in join_all(captures).await {
                charts.insert(key.to_string(), snapshot);
            }
        }

        Ok(charts)
    }

    /// Every valid cached chart for `symbol` among `timeframes`; never captures
    pub fn get_all_charts_for_symbol(
        &self,
        symbol: &str,
        timeframes: &[String],
    ) -> Result<HashMap<Timeframe, Arc<Snapshot>>> {
        let symbol = normalize_symbol(symbol)?;
        let timeframes = parse_timeframes(timeframes)?;
        let scheduler = self.get_scheduler();

        let mut charts = HashMap::new();
        for timeframe in timeframes {
            let key = CacheKey::new(&symbol, timeframe)?;
            if let Some(snapshot) = scheduler.get_chart(&key, None) {
                charts.insert(timeframe, snapshot);
            }
        }
        Ok(charts)
    }

    /// Add a pair to the tracked set: captured now, then refreshed periodically
    pub async fn track_chart(&self, symbol: &str, timeframe: &str) -> Result<Arc<Snapshot>> {
        let key = CacheKey::parse(symbol, timeframe)?;
        Ok(self.get_scheduler().track(key).await)
    }

    pub fn get_status(&self) -> SchedulerStatus {
        self.get_scheduler().get_status()
    }
}

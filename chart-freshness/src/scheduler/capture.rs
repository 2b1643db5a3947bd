//! Capture scheduler
//!
//! Lifecycle: `Stopped --start()--> Starting (cold-start sweep) --> Running --stop()--> Stopped`.
//! While running, every tracked pair has one tokio task re-rendering it at its tier's
//! capture interval. Every capture, scheduled or on demand, ends up as a snapshot in the
//! cache; renderer failures never escape as errors.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::SnapshotCache;
use crate::config::{SchedulerConfig, Timeframe};
use crate::error::{panic_message, RenderError, SchedulerError};
use crate::render::{RenderRequest, Renderer};
use crate::scheduler::{format_uptime, SchedulerStatus};
use crate::snapshot::{CacheKey, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
}

struct Lifecycle {
    state: SchedulerState,
    started_at: Option<Instant>,
    /// Bumped by every cold start, so a sweep outliving its run cannot schedule jobs
    generation: u64,
}

struct CaptureJob {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Shared {
    config: SchedulerConfig,
    cache: Arc<SnapshotCache>,
    renderer: Arc<dyn Renderer>,
    // Lock order: lifecycle before jobs before tasks.
    lifecycle: Mutex<Lifecycle>,
    jobs: Mutex<HashMap<CacheKey, CaptureJob>>,
    /// One-off captures (cold-start sweep, `track`) that `stop` must wait out
    tasks: Mutex<Vec<JoinHandle<()>>>,
    jobs_executed: AtomicU64,
    jobs_failed: AtomicU64,
    crash_tx: mpsc::UnboundedSender<SchedulerError>,
    crash_rx: AsyncMutex<mpsc::UnboundedReceiver<SchedulerError>>,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<CacheKey, CaptureJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the snapshot cache and drives the renderer on a timer
#[derive(Clone)]
pub struct CaptureScheduler {
    shared: Arc<Shared>,
}

impl CaptureScheduler {
    pub fn new(config: SchedulerConfig, renderer: Arc<dyn Renderer>) -> Self {
        let cache = Arc::new(SnapshotCache::new(config.tiers.clone()));
        let (crash_tx, crash_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                config,
                cache,
                renderer,
                lifecycle: Mutex::new(Lifecycle {
                    state: SchedulerState::Stopped,
                    started_at: None,
                    generation: 0,
                }),
                jobs: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                jobs_executed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
                crash_tx,
                crash_rx: AsyncMutex::new(crash_rx),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.shared.cache
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Keys that currently have a periodic job
    pub fn tracked_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.shared.jobs().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Cross product of (symbols ∪ default symbols) × (timeframes ∪ default timeframes)
    fn tracked_pairs(&self, symbols: &[String], timeframes: &[Timeframe]) -> Vec<CacheKey> {
        let config = &self.shared.config;
        let timeframes: BTreeSet<Timeframe> = timeframes
            .iter()
            .chain(config.default_timeframes.iter())
            .copied()
            .collect();

        let mut pairs = BTreeSet::new();
        for symbol in symbols.iter().chain(config.default_symbols.iter()) {
            for timeframe in &timeframes {
                match CacheKey::new(symbol, *timeframe) {
                    Ok(key) => {
                        pairs.insert(key);
                    }
                    Err(e) => warn!("Skipping tracked pair: {}", e),
                }
            }
        }
        pairs.into_iter().collect()
    }

    /// Start tracking `symbols` × `timeframes` (merged with the configured defaults)
    ///
    /// Runs the cold-start sweep, one concurrent capture per pair, before returning, so a
    /// query issued after `start` resolves never finds an empty cache. Calling it while
    /// already running adds the pairs: each gets an immediate capture and its job is
    /// replaced rather than duplicated.
    pub async fn start(
        &self,
        symbols: &[String],
        timeframes: &[Timeframe],
    ) -> Result<(), SchedulerError> {
        let pairs = self.tracked_pairs(symbols, timeframes);
        if pairs.is_empty() {
            return Err(SchedulerError::NoTrackedPairs);
        }

        let generation = {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.state == SchedulerState::Stopped {
                lifecycle.state = SchedulerState::Starting;
                lifecycle.generation += 1;
                Some(lifecycle.generation)
            } else {
                None
            }
        };

        let Some(generation) = generation else {
            join_all(pairs.into_iter().map(|key| self.track(key))).await;
            return Ok(());
        };

        if let Err(e) = self.prepare_snapshot_dir().await {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.generation == generation {
                lifecycle.state = SchedulerState::Stopped;
            }
            return Err(e);
        }
        self.drain_crashes().await;

        info!("Cold-start sweep: capturing {} charts", pairs.len());
        let scheduler = self.clone();
        let sweep_pairs = pairs.clone();
        let sweep = self.spawn_owned(async move {
            join_all(sweep_pairs.iter().map(|key| scheduler.capture_chart(key))).await;
        });
        let completed = match sweep {
            Some(done) => done.await.is_ok(),
            None => false,
        };

        let mut lifecycle = self.shared.lifecycle();
        if !completed
            || lifecycle.state != SchedulerState::Starting
            || lifecycle.generation != generation
        {
            info!("Scheduler stopped during cold-start sweep; no jobs scheduled");
            return Ok(());
        }
        for key in &pairs {
            self.schedule(key.clone());
        }
        lifecycle.state = SchedulerState::Running;
        lifecycle.started_at = Some(Instant::now());
        info!("Capture scheduler running with {} jobs", pairs.len());

        Ok(())
    }

    /// Add one pair: capture it right away, then keep it fresh if the scheduler is running
    ///
    /// On a stopped scheduler this is a plain on-demand capture. A capture cut short by
    /// `stop` comes back as an error snapshot.
    pub async fn track(&self, key: CacheKey) -> Arc<Snapshot> {
        let scheduler = self.clone();
        let task_key = key.clone();
        let capture = self.spawn_owned(async move { scheduler.capture_chart(&task_key).await });

        let Some(capture) = capture else {
            return self.capture_chart(&key).await;
        };
        let snapshot = match capture.await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                return Arc::new(Snapshot::failure(
                    &key,
                    "capture cancelled: scheduler stopped",
                    self.shared.config.indicators.clone(),
                ))
            }
        };

        let lifecycle = self.shared.lifecycle();
        if lifecycle.state != SchedulerState::Stopped {
            self.schedule(key);
        }
        snapshot
    }

    /// Run `work` on its own task owned by the current run; `None` when stopped
    ///
    /// The receiver errors if `stop` aborted the task before it finished.
    fn spawn_owned<F, T>(&self, work: F) -> Option<oneshot::Receiver<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let lifecycle = self.shared.lifecycle();
        if lifecycle.state == SchedulerState::Stopped {
            return None;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = done_tx.send(work.await);
        });
        let mut tasks = self.shared.tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        Some(done_rx)
    }

    /// Stop every periodic job and any capture still running for this run
    ///
    /// Works in `Starting` too, cutting the cold-start sweep short. In-flight captures
    /// get `stop_grace` to finish, after which they are aborted. Once this returns no
    /// scheduler task is left to touch the counters or the cache.
    pub async fn stop(&self) {
        let (jobs, tasks) = {
            let mut lifecycle = self.shared.lifecycle();
            if lifecycle.state == SchedulerState::Stopped {
                return;
            }
            lifecycle.state = SchedulerState::Stopped;
            lifecycle.started_at = None;
            let jobs: Vec<CaptureJob> = self.shared.jobs().drain().map(|(_, job)| job).collect();
            let tasks: Vec<JoinHandle<()>> = self.shared.tasks().drain(..).collect();
            (jobs, tasks)
        };

        let mut handles = Vec::with_capacity(jobs.len() + tasks.len());
        for job in jobs {
            let _ = job.stop_tx.send(true);
            handles.push(job.handle);
        }
        handles.extend(tasks);

        let grace = self.shared.config.stop_grace;
        let deadline = Instant::now() + grace;
        let mut aborted = 0;
        for mut handle in handles {
            if timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(
                "Aborted {} capture tasks still busy after {:?}",
                aborted, grace
            );
        }

        info!("Capture scheduler stopped");
    }

    /// Wait for the next crash reported by a job task
    pub async fn crashed(&self) -> SchedulerError {
        let mut crash_rx = self.shared.crash_rx.lock().await;
        match crash_rx.recv().await {
            Some(crash) => crash,
            None => std::future::pending().await,
        }
    }

    /// Report `crash` as if a job task had died
    #[cfg(test)]
    pub(crate) fn inject_crash(&self, crash: SchedulerError) {
        let _ = self.shared.crash_tx.send(crash);
    }

    async fn drain_crashes(&self) {
        let mut crash_rx = self.shared.crash_rx.lock().await;
        while let Ok(stale) = crash_rx.try_recv() {
            debug!("Dropping crash report from previous run: {}", stale);
        }
    }

    async fn prepare_snapshot_dir(&self) -> Result<(), SchedulerError> {
        if let Some(dir) = &self.shared.config.snapshot_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SchedulerError::SnapshotDir {
                    path: dir.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn schedule(&self, key: CacheKey) {
        let period = self.shared.config.tiers.get(key.timeframe()).capture_interval;
        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = self.clone();
        let job_key = key.clone();

        let handle = tokio::spawn(async move {
            let crash_tx = scheduler.shared.crash_tx.clone();
            let run = scheduler.run_job(&job_key, period, stop_rx);
            if let Err(panic) = AssertUnwindSafe(run).catch_unwind().await {
                let message = panic_message(panic.as_ref());
                error!("Capture job for {} panicked: {}", job_key, message);
                let _ = crash_tx.send(SchedulerError::JobPanicked {
                    key: job_key.to_string(),
                    message,
                });
            }
        });

        let replaced = self
            .shared
            .jobs()
            .insert(key.clone(), CaptureJob { stop_tx, handle });
        if let Some(old) = replaced {
            let _ = old.stop_tx.send(true);
            old.handle.abort();
            debug!("Replaced capture job for {}", key);
        }
    }

    async fn run_job(&self, key: &CacheKey, period: Duration, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.capture_chart(key).await;
                }
            }
        }
        debug!("Capture job for {} stopped", key);
    }

    /// Render `key` now and store the outcome
    ///
    /// Timeouts, renderer errors and renderer panics all become an error-bearing snapshot;
    /// this never fails.
    pub async fn capture_chart(&self, key: &CacheKey) -> Arc<Snapshot> {
        let tier = self.shared.config.tiers.get(key.timeframe());
        let indicators = self.shared.config.indicators.clone();
        let request = RenderRequest {
            symbol: key.symbol().to_string(),
            timeframe: key.timeframe(),
            indicators: indicators.clone(),
            timeout: tier.render_timeout,
        };

        let issued_at = Utc::now();
        let started = Instant::now();
        let render = AssertUnwindSafe(self.shared.renderer.render(&request)).catch_unwind();
        let outcome = match timeout(tier.render_timeout, render).await {
            Ok(Ok(Ok(output))) if output.image.is_empty() => Err(RenderError::Renderer(
                "renderer returned an empty image".to_string(),
            )),
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(RenderError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(RenderError::Timeout(tier.render_timeout)),
        };

        let snapshot = match outcome {
            Ok(output) => {
                self.shared.jobs_executed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Captured {} in {:.0}ms ({} bytes)",
                    key,
                    output.generation_time_ms,
                    output.image.len()
                );
                let file = self.persist(key, &output.image).await;
                let snapshot =
                    Snapshot::success(key, output.image, output.generation_time_ms, indicators)
                        .with_timestamp(issued_at);
                match file {
                    Some(path) => snapshot.with_file(path),
                    None => snapshot,
                }
            }
            Err(e) => {
                self.shared.jobs_failed.fetch_add(1, Ordering::Relaxed);
                warn!("Capture failed for {}: {}", key, e);
                Snapshot::failure(key, e.to_string(), indicators)
                    .with_timestamp(issued_at)
                    .with_generation_time_ms(started.elapsed().as_secs_f64() * 1000.0)
            }
        };

        let snapshot = Arc::new(snapshot);
        if !self.shared.cache.put_if_newer(key.clone(), snapshot.clone()) {
            debug!("Discarded capture for {}: cache holds a later one", key);
        }
        snapshot
    }

    async fn persist(&self, key: &CacheKey, image: &[u8]) -> Option<PathBuf> {
        let dir = self.shared.config.snapshot_dir.as_ref()?;
        let path = dir.join(format!("{}.png", key));
        match tokio::fs::write(&path, image).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Could not persist {} to {:?}: {}", key, path, e);
                None
            }
        }
    }

    /// Cached snapshot if valid for `max_age`, defaulting to the tier ttl
    pub fn get_chart(&self, key: &CacheKey, max_age: Option<Duration>) -> Option<Arc<Snapshot>> {
        let max_age = max_age.unwrap_or_else(|| self.shared.config.tiers.ttl(key.timeframe()));
        self.shared.cache.get(key, max_age)
    }

    /// Cached snapshot if still within the tier ttl, otherwise a capture made now
    pub async fn get_fresh_chart(&self, key: &CacheKey) -> Arc<Snapshot> {
        match self.get_chart(key, None) {
            Some(snapshot) => snapshot,
            None => self.capture_chart(key).await,
        }
    }

    pub fn get_status(&self) -> SchedulerStatus {
        let (running, uptime) = {
            let lifecycle = self.shared.lifecycle();
            (
                lifecycle.state == SchedulerState::Running,
                lifecycle
                    .started_at
                    .map(|started| started.elapsed())
                    .unwrap_or_default(),
            )
        };

        SchedulerStatus {
            running,
            uptime_secs: uptime.as_secs(),
            uptime_human: format_uptime(uptime),
            scheduled_jobs: self.shared.jobs().len(),
            jobs_executed: self.shared.jobs_executed.load(Ordering::Relaxed),
            jobs_failed: self.shared.jobs_failed.load(Ordering::Relaxed),
            cache: self.shared.cache.stats().into(),
        }
    }
}

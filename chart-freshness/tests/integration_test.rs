//! Integration tests for chart-freshness scheduling and provider access

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chart_freshness::prelude::*;
use chrono::Utc;

/// Renderer double counting calls, with optional failures, panics and latency
#[derive(Default)]
struct MockRenderer {
    calls: AtomicUsize,
    fail_symbols: Vec<String>,
    panic_symbols: Vec<String>,
    delay: Duration,
}

impl MockRenderer {
    fn failing(symbols: &[&str]) -> Self {
        Self {
            fail_symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_symbols.contains(&request.symbol) {
            panic!("renderer crashed drawing {}", request.symbol);
        }
        if self.fail_symbols.contains(&request.symbol) {
            return Err(RenderError::Renderer("chart source unavailable".to_string()));
        }
        Ok(RenderOutput {
            image: format!("png:{}:{}", request.symbol, request.timeframe).into_bytes(),
            generation_time_ms: 12.5,
        })
    }
}

/// Config with no defaults and the same tier for every timeframe
fn test_config(interval: Duration, ttl: Duration, render_timeout: Duration) -> SchedulerConfig {
    let tier = TimeframeTier::new(interval, ttl, render_timeout);
    SchedulerConfig {
        tiers: TierTable::with_overrides(Timeframe::ALL.iter().map(|tf| (*tf, tier))).unwrap(),
        default_symbols: Vec::new(),
        default_timeframes: Vec::new(),
        indicators: vec!["RSI".to_string()],
        stop_grace: Duration::from_secs(1),
        snapshot_dir: None,
    }
}

/// Periodic jobs that will not fire during a test
fn quiet_config() -> SchedulerConfig {
    test_config(
        Duration::from_secs(60),
        Duration::from_secs(60),
        Duration::from_millis(500),
    )
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn key(symbol: &str, timeframe: &str) -> CacheKey {
    CacheKey::parse(symbol, timeframe).unwrap()
}

#[tokio::test]
async fn test_cold_start_populates_every_pair() {
    let renderer = Arc::new(MockRenderer::default());
    let scheduler = CaptureScheduler::new(quiet_config(), renderer.clone());

    scheduler
        .start(&strings(&["btcusdt", "ETHUSDT"]), &[Timeframe::M1, Timeframe::M5])
        .await
        .unwrap();

    for (symbol, timeframe) in [("BTCUSDT", "1m"), ("BTCUSDT", "5m"), ("ETHUSDT", "1m"), ("ETHUSDT", "5m")] {
        let chart = scheduler.get_chart(&key(symbol, timeframe), None);
        let chart = chart.expect("cold-start sweep should fill the cache");
        assert!(chart.age_seconds() < 5.0);
        assert_eq!(chart.indicators, vec!["RSI".to_string()]);
    }

    let status = scheduler.get_status();
    assert!(status.running);
    assert_eq!(status.scheduled_jobs, 4);
    assert_eq!(status.jobs_executed, 4);
    assert_eq!(status.jobs_failed, 0);
    assert_eq!(status.cache.valid_entries, 4);
    assert_eq!(renderer.calls(), 4);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_defaults_merge_into_tracked_set() {
    let renderer = Arc::new(MockRenderer::default());
    let mut config = quiet_config();
    config.default_symbols = strings(&["BTCUSDT"]);
    config.default_timeframes = vec![Timeframe::H1];
    let scheduler = CaptureScheduler::new(config, renderer.clone());

    scheduler.start(&strings(&["solusdt"]), &[]).await.unwrap();

    assert_eq!(
        scheduler.tracked_keys(),
        vec![key("BTCUSDT", "1h"), key("SOLUSDT", "1h")]
    );
    scheduler.stop().await;
}

#[tokio::test]
async fn test_start_without_pairs_fails() {
    let scheduler = CaptureScheduler::new(quiet_config(), Arc::new(MockRenderer::default()));
    let result = scheduler.start(&[], &[Timeframe::M1]).await;
    assert!(matches!(result, Err(SchedulerError::NoTrackedPairs)));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test]
async fn test_restarting_pairs_replaces_jobs() {
    let renderer = Arc::new(MockRenderer::default());
    let scheduler = CaptureScheduler::new(quiet_config(), renderer.clone());
    let symbols = strings(&["BTCUSDT"]);

    scheduler.start(&symbols, &[Timeframe::M1]).await.unwrap();
    scheduler.start(&symbols, &[Timeframe::M1]).await.unwrap();

    let status = scheduler.get_status();
    assert_eq!(status.scheduled_jobs, 1);
    // re-adding a pair captures it again
    assert_eq!(renderer.calls(), 2);
    scheduler.stop().await;
}

#[tokio::test]
async fn test_cached_chart_does_not_rerender() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());

    let first = provider.get_fresh_chart("BTCUSDT", "1m").await.unwrap();
    assert_eq!(renderer.calls(), 1);

    let second = provider.get_fresh_chart("btcusdt", "1m").await.unwrap();
    let third = provider.get_chart("BTCUSDT", "1m", None).unwrap().unwrap();
    assert_eq!(renderer.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));

    let stats = provider.get_status().cache.stats;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_fresh_chart_on_failure_returns_error_snapshot() {
    let renderer = Arc::new(MockRenderer::failing(&["BADUSDT"]));
    let provider = ChartProvider::new(quiet_config(), renderer.clone());

    let chart = provider.get_fresh_chart("BADUSDT", "5m").await.unwrap();
    assert!(chart.error.as_deref().unwrap().contains("chart source unavailable"));
    assert!(chart.image.is_empty());
    assert!(provider.get_chart("BADUSDT", "5m", None).unwrap().is_none());

    let status = provider.get_status();
    assert_eq!(status.jobs_failed, 1);
    assert_eq!(status.jobs_executed, 0);
    assert_eq!(status.cache.total_entries, 1);
}

#[tokio::test]
async fn test_render_timeout_becomes_error_snapshot() {
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(500)));
    let config = test_config(
        Duration::from_secs(60),
        Duration::from_secs(60),
        Duration::from_millis(50),
    );
    let provider = ChartProvider::new(config, renderer);

    let started = Instant::now();
    let chart = provider.get_fresh_chart_async("BTCUSDT", "1h").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(chart.error.as_deref().unwrap().contains("timed out"));
    assert!(chart.image.is_empty());
}

#[tokio::test]
async fn test_renderer_panic_becomes_error_snapshot() {
    let renderer = Arc::new(MockRenderer {
        panic_symbols: strings(&["BOOMUSDT"]),
        ..Default::default()
    });
    let provider = ChartProvider::new(quiet_config(), renderer);

    let chart = provider.get_fresh_chart("BOOMUSDT", "1m").await.unwrap();
    assert!(chart.error.as_deref().unwrap().contains("panicked"));
    assert_eq!(provider.get_status().jobs_failed, 1);
}

#[tokio::test]
async fn test_ensure_fresh_charts_returns_every_pair() {
    let renderer = Arc::new(MockRenderer::failing(&["BUSDT"]));
    let provider = ChartProvider::new(quiet_config(), renderer.clone());

    let charts = provider
        .ensure_fresh_charts(&strings(&["AUSDT", "BUSDT"]), &strings(&["1m", "5m"]), None)
        .await
        .unwrap();

    assert_eq!(charts.len(), 4);
    assert!(charts["AUSDT_1m"].error.is_none());
    assert!(charts["AUSDT_5m"].error.is_none());
    assert!(charts["BUSDT_1m"].is_error());
    assert!(charts["BUSDT_5m"].is_error());
    assert_eq!(renderer.calls(), 4);

    // valid entries are served from cache, failed ones are retried
    let again = provider
        .ensure_fresh_charts(&strings(&["AUSDT", "BUSDT"]), &strings(&["1m", "5m"]), None)
        .await
        .unwrap();
    assert_eq!(again.len(), 4);
    assert_eq!(renderer.calls(), 6);
    assert!(Arc::ptr_eq(&charts["AUSDT_1m"], &again["AUSDT_1m"]));
}

#[tokio::test]
async fn test_ensure_fresh_charts_respects_max_age() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());
    let scheduler = provider.get_scheduler();

    let k = key("BTCUSDT", "1m");
    let aged = Snapshot::success(&k, b"old".to_vec(), 1.0, Vec::new())
        .with_timestamp(Utc::now() - chrono::Duration::seconds(30));
    scheduler.cache().put(k, Arc::new(aged));

    let symbols = strings(&["BTCUSDT"]);
    let timeframes = strings(&["1m"]);
    let charts = provider
        .ensure_fresh_charts(&symbols, &timeframes, Some(Duration::from_secs(45)))
        .await
        .unwrap();
    assert_eq!(charts["BTCUSDT_1m"].image, b"old".to_vec());
    assert_eq!(renderer.calls(), 0);

    let charts = provider
        .ensure_fresh_charts(&symbols, &timeframes, Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(charts["BTCUSDT_1m"].image, b"png:BTCUSDT:1m".to_vec());
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_unsupported_timeframe_rejected() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());

    assert!(matches!(
        provider.get_chart("BTCUSDT", "2h", None),
        Err(ChartError::UnsupportedTimeframe(_))
    ));
    assert!(matches!(
        provider.get_fresh_chart("BTCUSDT", "7m").await,
        Err(ChartError::UnsupportedTimeframe(_))
    ));
    assert!(matches!(
        provider
            .ensure_fresh_charts(&strings(&["BTCUSDT"]), &strings(&["1m", "weekly"]), None)
            .await,
        Err(ChartError::UnsupportedTimeframe(_))
    ));
    assert!(matches!(
        provider.start_scheduler(&strings(&["BTCUSDT"]), &strings(&["13m"])).await,
        Err(ChartError::UnsupportedTimeframe(_))
    ));
    assert_eq!(renderer.calls(), 0);
    assert!(!provider.is_started().await);
}

#[tokio::test]
async fn test_stop_halts_periodic_jobs() {
    let renderer = Arc::new(MockRenderer::default());
    let config = test_config(
        Duration::from_millis(50),
        Duration::from_secs(60),
        Duration::from_millis(500),
    );
    let scheduler = CaptureScheduler::new(config, renderer.clone());

    scheduler
        .start(&strings(&["BTCUSDT"]), &[Timeframe::M1])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(scheduler.get_status().jobs_executed > 1);

    scheduler.stop().await;
    let status = scheduler.get_status();
    assert!(!status.running);
    assert_eq!(status.scheduled_jobs, 0);
    assert_eq!(status.uptime_secs, 0);

    let executed = status.jobs_executed;
    let calls = renderer.calls();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(scheduler.get_status().jobs_executed, executed);
    assert_eq!(renderer.calls(), calls);
}

#[tokio::test]
async fn test_stop_is_bounded_by_grace_period() {
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(800)));
    let mut config = test_config(
        Duration::from_millis(20),
        Duration::from_secs(60),
        Duration::from_secs(5),
    );
    config.stop_grace = Duration::from_millis(100);
    let scheduler = CaptureScheduler::new(config, renderer);

    scheduler
        .start(&strings(&["BTCUSDT"]), &[Timeframe::M1])
        .await
        .unwrap();
    // let the first periodic capture get stuck in the renderer
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    scheduler.stop().await;
    assert!(started.elapsed() < Duration::from_millis(600));
    assert_eq!(scheduler.get_status().jobs_executed, 1);
}

#[tokio::test]
async fn test_provider_start_is_idempotent() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());

    let first = provider
        .start_scheduler(&strings(&["BTCUSDT"]), &strings(&["1m"]))
        .await
        .unwrap();
    let second = provider
        .start_scheduler(&strings(&["ETHUSDT"]), &strings(&["1h"]))
        .await
        .unwrap();

    assert_eq!(first.tracked_keys(), vec![key("BTCUSDT", "1m")]);
    assert_eq!(second.tracked_keys(), vec![key("BTCUSDT", "1m")]);
    assert_eq!(renderer.calls(), 1);

    provider.stop_scheduler().await;
    assert!(!provider.is_started().await);
    assert!(!provider.get_status().running);
    // stopping twice is fine
    provider.stop_scheduler().await;
}

#[tokio::test]
async fn test_stop_during_cold_start_cancels_sweep() {
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(400)));
    let mut config = quiet_config();
    config.stop_grace = Duration::from_millis(100);
    let scheduler = CaptureScheduler::new(config, renderer.clone());

    let starter = scheduler.clone();
    let starting = tokio::spawn(async move {
        starter
            .start(&strings(&["BTCUSDT", "ETHUSDT"]), &[Timeframe::M1])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.state(), SchedulerState::Starting);

    let started = Instant::now();
    scheduler.stop().await;
    assert!(started.elapsed() < Duration::from_millis(350));
    let executed = scheduler.get_status().jobs_executed;
    assert_eq!(executed, 0);

    // the aborted renders would have finished by now
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(starting.await.unwrap().is_ok());
    let status = scheduler.get_status();
    assert_eq!(status.jobs_executed, executed);
    assert_eq!(status.jobs_failed, 0);
    assert_eq!(status.scheduled_jobs, 0);
    assert!(!status.running);
    assert!(scheduler.cache().is_empty());
}

#[tokio::test]
async fn test_stop_during_cold_start_lets_sweep_finish_within_grace() {
    let renderer = Arc::new(MockRenderer::slow(Duration::from_millis(100)));
    let scheduler = CaptureScheduler::new(quiet_config(), renderer.clone());

    let starter = scheduler.clone();
    let starting = tokio::spawn(async move {
        starter.start(&strings(&["BTCUSDT"]), &[Timeframe::M1]).await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    scheduler.stop().await;
    assert_eq!(scheduler.get_status().jobs_executed, 1);
    assert!(starting.await.unwrap().is_ok());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = scheduler.get_status();
    assert_eq!(status.jobs_executed, 1);
    assert_eq!(status.scheduled_jobs, 0);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(scheduler.tracked_keys().is_empty());
}

#[tokio::test]
async fn test_stop_without_start_is_safe() {
    let provider = ChartProvider::new(quiet_config(), Arc::new(MockRenderer::default()));
    provider.stop_scheduler().await;
    assert!(!provider.is_started().await);
}

#[tokio::test]
async fn test_track_chart_captures_immediately() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());
    provider
        .start_scheduler(&strings(&["BTCUSDT"]), &strings(&["1m"]))
        .await
        .unwrap();

    let chart = provider.track_chart("solusdt", "15m").await.unwrap();
    assert_eq!(chart.symbol, "SOLUSDT");
    assert!(chart.error.is_none());
    assert_eq!(renderer.calls(), 2);
    assert_eq!(provider.get_status().scheduled_jobs, 2);
    assert!(provider.get_chart("SOLUSDT", "15m", None).unwrap().is_some());

    provider.stop_scheduler().await;
}

#[tokio::test]
async fn test_all_charts_for_symbol_is_cache_only() {
    let renderer = Arc::new(MockRenderer::default());
    let provider = ChartProvider::new(quiet_config(), renderer.clone());
    provider
        .start_scheduler(&strings(&["BTCUSDT"]), &strings(&["1m", "1h"]))
        .await
        .unwrap();
    let calls = renderer.calls();

    let charts = provider
        .get_all_charts_for_symbol("btcusdt", &strings(&["1m", "5m", "1h"]))
        .unwrap();
    assert_eq!(charts.len(), 2);
    assert!(charts.contains_key(&Timeframe::M1));
    assert!(charts.contains_key(&Timeframe::H1));
    assert!(!charts.contains_key(&Timeframe::M5));
    assert_eq!(renderer.calls(), calls);

    provider.stop_scheduler().await;
}

#[tokio::test]
async fn test_stale_entry_kept_for_larger_max_age() {
    // BTCUSDT/1m with a 60s ttl, observed 70s after capture
    let provider = ChartProvider::new(quiet_config(), Arc::new(MockRenderer::default()));
    let k = key("BTCUSDT", "1m");
    let captured = Arc::new(
        Snapshot::success(&k, b"chart".to_vec(), 40.0, Vec::new())
            .with_timestamp(Utc::now() - chrono::Duration::seconds(70)),
    );
    provider.get_scheduler().cache().put(k, captured.clone());

    assert!(provider.get_chart("BTCUSDT", "1m", None).unwrap().is_none());
    let same = provider
        .get_chart("BTCUSDT", "1m", Some(Duration::from_secs(120)))
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&captured, &same));
}

#[tokio::test]
async fn test_snapshot_dir_persists_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet_config();
    config.snapshot_dir = Some(dir.path().join("charts"));
    let scheduler = CaptureScheduler::new(config, Arc::new(MockRenderer::default()));

    scheduler
        .start(&strings(&["BTCUSDT"]), &[Timeframe::H4])
        .await
        .unwrap();

    let chart = scheduler.get_chart(&key("BTCUSDT", "4h"), None).unwrap();
    let path = chart.file_path.clone().expect("successful capture is persisted");
    assert!(path.ends_with("BTCUSDT_4h.png"));
    assert_eq!(std::fs::read(path).unwrap(), b"png:BTCUSDT:4h".to_vec());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_provider_registry_installs_once() {
    let provider = ChartProvider::new(quiet_config(), Arc::new(MockRenderer::default()));
    install(provider.clone()).unwrap();
    assert!(installed().is_some());

    let other = ChartProvider::new(quiet_config(), Arc::new(MockRenderer::default()));
    assert!(matches!(install(other), Err(ChartError::AlreadyInstalled)));
}

use anyhow::Context;
use chart_freshness::prelude::*;
use shared::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: ChartProvider,
    pub service_config: ServiceConfig,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let scheduler_config = scheduler_config(&config)?;
        let renderer = Arc::new(HttpRenderer::new(
            &config.render_url,
            config.render_api_key.clone(),
        )?);
        tracing::info!("Rendering charts through {}", config.render_url);

        let provider = ChartProvider::new(scheduler_config, renderer);
        let service_config = service_config(&config);

        Ok(AppState {
            config: Arc::new(config),
            provider,
            service_config,
        })
    }
}

pub fn scheduler_config(config: &Config) -> Result<SchedulerConfig, anyhow::Error> {
    let mut scheduler = SchedulerConfig::default();

    if let Some(path) = &config.tiers_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read tier file {}", path))?;
        let specs: HashMap<String, TierSpec> = serde_json::from_str(&raw)
            .with_context(|| format!("Tier file {} is not valid JSON", path))?;
        scheduler.tiers = TierTable::from_specs(specs)?;
    }
    if !config.indicators.is_empty() {
        scheduler.indicators = config.indicators.clone();
    }
    scheduler.stop_grace = Duration::from_secs(config.stop_grace_secs);
    scheduler.snapshot_dir = config.snapshot_dir.as_ref().map(PathBuf::from);

    Ok(scheduler)
}

pub fn service_config(config: &Config) -> ServiceConfig {
    ServiceConfig {
        max_restarts: config.max_restarts,
        restart_window: Duration::from_secs(config.restart_window_secs),
        restart_cooldown: Duration::from_secs(config.restart_cooldown_secs),
        health_interval: Duration::from_secs(config.health_interval_secs),
    }
}

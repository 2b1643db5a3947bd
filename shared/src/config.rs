use anyhow::Context;
use dotenv::dotenv;
use std::str::FromStr;
use tracing::debug;

pub struct Config {
    pub render_url: String,
    pub render_api_key: Option<String>,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub indicators: Vec<String>,
    pub tiers_file: Option<String>,
    pub snapshot_dir: Option<String>,
    pub pid_file: String,
    pub status_addr: String,
    pub health_interval_secs: u64,
    pub max_restarts: u32,
    pub restart_window_secs: u64,
    pub restart_cooldown_secs: u64,
    pub stop_timeout_secs: u64,
    pub stop_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Config {
            render_url: get("RENDER_URL").unwrap_or_else(|| "http://localhost:8085".to_string()),
            render_api_key: get("RENDER_API_KEY"),
            symbols: list(get("CHART_SYMBOLS")),
            timeframes: list(get("CHART_TIMEFRAMES")),
            indicators: list(get("CHART_INDICATORS")),
            tiers_file: get("CHART_TIERS_FILE"),
            snapshot_dir: get("SNAPSHOT_DIR"),
            pid_file: get("PID_FILE").unwrap_or_else(|| "./chartd.pid".to_string()),
            status_addr: get("STATUS_ADDR").unwrap_or_else(|| "127.0.0.1:9998".to_string()),
            health_interval_secs: number(&get, "HEALTH_INTERVAL_SECS", 300)?,
            max_restarts: number(&get, "MAX_RESTARTS", 5)?,
            restart_window_secs: number(&get, "RESTART_WINDOW_SECS", 300)?,
            restart_cooldown_secs: number(&get, "RESTART_COOLDOWN_SECS", 10)?,
            stop_timeout_secs: number(&get, "STOP_TIMEOUT_SECS", 30)?,
            stop_grace_secs: number(&get, "STOP_GRACE_SECS", 5)?,
        };
        debug!("Loaded configuration (render service at {})", config.render_url);
        Ok(config)
    }
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn number<T, F>(get: &F, name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        None => Ok(default),
    }
}

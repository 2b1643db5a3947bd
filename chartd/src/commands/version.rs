use chrono::{TimeZone, Utc};
use std::process::ExitCode;

pub fn handle_version() -> ExitCode {
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let git_branch = option_env!("GIT_BRANCH").unwrap_or("unknown");
    let git_tag = option_env!("GIT_TAG").unwrap_or("unknown");
    let target_os = option_env!("CARGO_CFG_TARGET_OS").unwrap_or("unknown");
    let build_time = build_time_human(option_env!("BUILD_TIME").unwrap_or("unknown"));

    println!("chartd {}", env!("CARGO_PKG_VERSION"));
    println!("  Git tag:    {}", git_tag);
    println!("  Git branch: {}", git_branch);
    println!("  Git hash:   {}", git_hash);
    println!("  Built:      {} ({})", build_time, target_os);
    ExitCode::SUCCESS
}

/// Epoch seconds as a UTC date, anything else passed through
fn build_time_human(raw: &str) -> String {
    raw.parse::<i64>()
        .ok()
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| raw.to_string())
}

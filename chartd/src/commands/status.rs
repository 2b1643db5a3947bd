use anyhow::Result;
use serde_json::Value;
use shared::Config;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use crate::commands::control::running_pid;

/// Exit status when the daemon is not running
const NOT_RUNNING: u8 = 3;

pub async fn handle_status(config: &Config) -> Result<ExitCode> {
    let Some(pid) = running_pid(Path::new(&config.pid_file))? else {
        println!("chartd is not running");
        return Ok(ExitCode::from(NOT_RUNNING));
    };
    println!("chartd is running (pid {})", pid);

    match fetch_status(&config.status_addr).await {
        Ok(status) => print_status(&status),
        Err(e) => println!("Status endpoint unreachable: {:#}", e),
    }
    Ok(ExitCode::SUCCESS)
}

async fn fetch_status(addr: &str) -> Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let status = client
        .get(format!("http://{}/status", addr))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(status)
}

fn print_status(status: &Value) {
    println!("  Scheduler running: {}", status["running"]);
    println!("  Uptime: {}", status["uptime_human"].as_str().unwrap_or("-"));
    println!("  Scheduled jobs: {}", status["scheduled_jobs"]);
    println!(
        "  Jobs executed: {} ({} failed)",
        status["jobs_executed"], status["jobs_failed"]
    );
    let cache = &status["cache"];
    println!(
        "  Cache: {}/{} valid, {} hits, {} misses",
        cache["valid_entries"],
        cache["total_entries"],
        cache["stats"]["hits"],
        cache["stats"]["misses"]
    );
}

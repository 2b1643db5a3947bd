use anyhow::Result;
use shared::Config;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::pidfile::{process_alive, read_pid, remove_pid_file, send_signal};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// SIGTERM the daemon, then SIGKILL it if it outlives the stop timeout
pub async fn handle_stop(config: &Config) -> Result<ExitCode> {
    let path = Path::new(&config.pid_file);
    let Some(pid) = running_pid(path)? else {
        println!("chartd is not running");
        return Ok(ExitCode::SUCCESS);
    };

    println!("Stopping chartd (pid {})...", pid);
    send_signal(pid, "TERM")?;

    let timeout = Duration::from_secs(config.stop_timeout_secs);
    if wait_for_exit(pid, timeout).await {
        println!("chartd stopped");
        return Ok(ExitCode::SUCCESS);
    }

    warn!("chartd did not exit within {:?}, sending SIGKILL", timeout);
    send_signal(pid, "KILL")?;
    if !wait_for_exit(pid, Duration::from_secs(2)).await {
        println!("chartd (pid {}) is still alive after SIGKILL", pid);
        return Ok(ExitCode::FAILURE);
    }
    // a killed daemon leaves its PID file behind
    remove_pid_file(path)?;
    println!("chartd killed");
    Ok(ExitCode::SUCCESS)
}

/// Ask the daemon to reload
pub async fn handle_reload(config: &Config) -> Result<ExitCode> {
    let Some(pid) = running_pid(Path::new(&config.pid_file))? else {
        println!("chartd is not running");
        return Ok(ExitCode::FAILURE);
    };
    send_signal(pid, "HUP")?;
    println!("Reload requested (pid {})", pid);
    Ok(ExitCode::SUCCESS)
}

/// PID of the live daemon; a stale PID file is cleaned up
pub fn running_pid(path: &Path) -> Result<Option<u32>> {
    match read_pid(path)? {
        Some(pid) if process_alive(pid) => Ok(Some(pid)),
        Some(pid) => {
            warn!("Removing stale PID file {:?} (pid {})", path, pid);
            remove_pid_file(path)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

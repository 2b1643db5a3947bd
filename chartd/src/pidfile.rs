//! PID file single-instance lock
//!
//! The file holds the daemon's PID while it runs. `start` refuses to run when the file
//! names a live process; `stop`, `status` and `reload` use it to find the daemon.
//!
//! Liveness comes from `/proc` on Linux and from the `kill` binary elsewhere; signals
//! always go through `kill`. When `kill` cannot be run the PID is treated as alive, so
//! a stale file is then left for manual cleanup rather than risk removing the file of
//! a running daemon.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Held for the daemon's lifetime; removes the file on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pid = std::process::id();

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", pid)
                        .with_context(|| format!("Cannot write PID file {:?}", path))?;
                    info!("Wrote PID {} to {:?}", pid, path);
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_pid(&path)? {
                    Some(existing) if process_alive(existing) => {
                        bail!("chartd is already running (pid {}, {:?})", existing, path)
                    }
                    _ => {
                        warn!("Removing stale PID file {:?}", path);
                        remove_pid_file(&path)?;
                    }
                },
                Err(e) => {
                    return Err(e).with_context(|| format!("Cannot create PID file {:?}", path))
                }
            }
        }
        bail!("Could not acquire PID file {:?}", path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// PID recorded in `path`, `None` if there is no file
pub fn read_pid(path: &Path) -> Result<Option<u32>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let pid = raw
                .trim()
                .parse()
                .with_context(|| format!("PID file {:?} holds {:?}", path, raw.trim()))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Cannot read PID file {:?}", path)),
    }
}

pub fn remove_pid_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Cannot remove PID file {:?}", path)),
    }
}

pub fn process_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        return Path::new(&format!("/proc/{}", pid)).exists();
    }
    probe_with_kill("kill", pid)
}

/// `kill -0` through `program`; assumes alive when it cannot be run
fn probe_with_kill(program: &str, pid: u32) -> bool {
    match Command::new(program)
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Cannot run {} to check pid {}, assuming it is alive: {}", program, pid, e);
            true
        }
    }
}

/// Deliver `signal` (`TERM`, `KILL`, `HUP`) to `pid`
pub fn send_signal(pid: u32, signal: &str) -> Result<()> {
    let status = Command::new("kill")
        .args(["-s", signal, &pid.to_string()])
        .status()
        .context("Cannot run kill")?;
    if !status.success() {
        bail!("kill -s {} {} failed ({})", signal, pid, status);
    }
    Ok(())
}

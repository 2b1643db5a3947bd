use anyhow::Result;
use chart_freshness::prelude::*;
use std::process::ExitCode;
use tracing::{error, info};

use crate::pidfile::PidFile;
use crate::server;
use crate::state::AppState;

/// Run the service in the foreground until a stop signal or restart budget exhaustion
pub async fn handle_start(
    state: AppState,
    symbols: Vec<String>,
    timeframes: Vec<String>,
) -> Result<ExitCode> {
    let symbols = if symbols.is_empty() {
        state.config.symbols.clone()
    } else {
        symbols
    };
    let timeframes = if timeframes.is_empty() {
        state.config.timeframes.clone()
    } else {
        timeframes
    };

    let (service, handle) = SupervisingService::new(
        state.provider.clone(),
        state.service_config,
        symbols,
        timeframes,
    )?;
    let pid_file = PidFile::acquire(&state.config.pid_file)?;
    install(state.provider.clone())?;
    info!("chartd running, PID file {:?}", pid_file.path());

    let server = tokio::spawn({
        let addr = state.config.status_addr.clone();
        let provider = state.provider.clone();
        async move {
            if let Err(e) = server::serve(addr, provider).await {
                error!("Status server stopped: {:#}", e);
            }
        }
    });
    let signals = tokio::spawn(async move {
        if let Err(e) = forward_signals(handle).await {
            error!("Signal handling stopped: {:#}", e);
        }
    });

    let exit = service.run().await;
    server.abort();
    signals.abort();
    drop(pid_file);

    match exit {
        ServiceExit::Shutdown => {
            info!("chartd stopped");
            Ok(ExitCode::SUCCESS)
        }
        ServiceExit::RestartBudgetExhausted {
            restarts,
            last_error,
        } => {
            error!(
                "chartd giving up after {} restarts, last error: {}",
                restarts, last_error
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(unix)]
async fn forward_signals(handle: ServiceHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                handle.terminate().await;
                return Ok(());
            }
            _ = interrupt.recv() => {
                info!("SIGINT received, shutting down");
                handle.terminate().await;
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("SIGHUP received");
                handle.reload().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(handle: ServiceHandle) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    handle.terminate().await;
    Ok(())
}

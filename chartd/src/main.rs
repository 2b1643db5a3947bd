use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod pidfile;
mod server;
mod state;

use crate::commands::{handle_reload, handle_start, handle_status, handle_stop, handle_version};
use crate::state::AppState;

/// Keeps rendered market charts fresh and serves them over HTTP
#[derive(Parser, Debug)]
#[command(name = "chartd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the capture service in the foreground
    Start {
        /// Symbols to track on top of the defaults (comma separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Timeframes to track on top of the defaults (comma separated)
        #[arg(long, value_delimiter = ',')]
        timeframes: Vec<String>,
    },
    /// Stop a running service
    Stop,
    /// Show whether the service runs, with scheduler statistics
    Status,
    /// Ask a running service to reload
    Reload,
    /// Print build information
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Start {
            symbols,
            timeframes,
        } => {
            tracing::info!("Starting chartd...");
            let state = AppState::new(config)?;
            handle_start(state, symbols, timeframes).await
        }
        Command::Stop => handle_stop(&config).await,
        Command::Status => handle_status(&config).await,
        Command::Reload => handle_reload(&config).await,
        Command::Version => Ok(handle_version()),
    }
}

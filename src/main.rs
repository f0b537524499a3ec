//! pelato CLI entry point.
//!
//! Loads `.env`, initializes logging, wires Ctrl-C to a cancellation token and delegates
//! to the CLI module for command handling.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code reported after an interrupt.
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so flag defaults and RUST_LOG see its values
    let env_file = pelato::pipeline::load_env_file();

    // Parse CLI arguments first to get log_level
    let cli = pelato::cli::parse_cli();

    // Initialize tracing with environment filter
    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match env_file {
        Ok(Some(path)) => debug!(path = %path.display(), "Loaded environment file"),
        Ok(None) => debug!("No .env file found, using process environment"),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            interrupt.cancel();
        }
    });

    let result = pelato::cli::run_with_cli(cli, cancel.clone()).await;

    if cancel.is_cancelled() {
        return ExitCode::from(INTERRUPTED_EXIT_CODE);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

//! voxchat - command-line client for the voice assistant backend.
//!
//! Logs in, keeps the session tokens fresh, and manages conversations,
//! messages and voice sessions from the terminal.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voxchat_core::{ApiClient, ApiError, Config, SessionState};

use commands::Cli;

/// Log file name inside the cache directory
const LOG_FILE: &str = "voxchat.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a file in the cache directory so they never interleave with
/// command output; stderr is used when that directory is unavailable.
fn init_tracing(cache_dir: Option<&Path>) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = cache_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE)
            .build(dir)
            .ok()
    });

    let (writer, guard) = match file_appender {
        Some(appender) => tracing_appender::non_blocking(appender),
        None => tracing_appender::non_blocking(io::stderr()),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit with code 2 and help with 0, before anything is touched
    let cli = Cli::parse();

    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let guard = init_tracing(config.cache_dir().ok().as_deref());

    info!(base_url = config.api_base_url(), "voxchat starting");

    let session = SessionState::load(config.credential_store_or_memory());
    let api = ApiClient::with_timeout(config.api_base_url(), config.request_timeout(), session)?;

    if let Err(e) = commands::run(&api, &config, cli.command).await {
        match e.downcast_ref::<ApiError>() {
            Some(api_error) => eprintln!("Error: {}", api_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        drop(guard);
        std::process::exit(1);
    }

    drop(guard);
    Ok(())
}

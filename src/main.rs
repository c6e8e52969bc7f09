//! Autocap - Batch Subtitle Generation and Translation
//!
//! Entry point: parses arguments, loads configuration, wires up
//! logging, and dispatches to the command handlers.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autocap::cli::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = args.load_config()?;

    // NDJSON output owns stdout; logs go to the file only in that mode.
    setup_logging(args.verbose, args.ndjson, &config.paths.data_dir)?;

    info!("Starting autocap");
    cli::run(args, config).await?;
    Ok(())
}

/// Setup logging to console and a daily-rotated file under the data
/// directory.
fn setup_logging(verbose: bool, quiet_console: bool, data_dir: &Path) -> Result<()> {
    let log_dir = data_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "autocap.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(file_layer);

    if quiet_console {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    } else {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        registry
            .with(console_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    }

    info!(
        "Logging initialized - level: {}, file: {}",
        log_level,
        log_dir.join("autocap.log").display()
    );
    Ok(())
}

//! parfind - Massively Parallel Directory Traversal
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use parfind::config::{expand_home_path, CliArgs, Config};
use parfind::error::FindError;
use parfind::walker::Explorer;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Grace window between cancellation and forced exit on interrupt
const INTERRUPT_GRACE: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = CliArgs::parse();
    setup_logging();

    let config = Config::from_args(args).context("Invalid configuration")?;
    let seeds = config.directories.clone();

    let explorer = Explorer::new(config, Box::new(std::io::stdout()));

    for dir in seeds {
        let seed = expand_home_path(&dir);
        let meta = std::fs::metadata(&seed)
            .with_context(|| format!("{seed}: cannot access seed directory"))?;
        if !meta.is_dir() {
            return Err(FindError::NotADirectory { path: seed }.into());
        }
        explorer.seed(seed);
    }

    // First SIGINT cancels cooperatively; after the grace window the process
    // exits regardless of what is still draining.
    let cancel = explorer.cancellation_token();
    let interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        interrupt.cancel();
        std::thread::sleep(INTERRUPT_GRACE);
        std::process::exit(130);
    })
    .context("Failed to set signal handler")?;

    let stats = explorer.run().await;
    debug!(
        "done: {} dirs, {} entries, {} errors",
        stats.dirs_scanned, stats.entries_emitted, stats.errors
    );

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parfind=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

//! Capflow Ingest - capture pipeline daemon

use anyhow::{Context, Result};
use capflow_common::logging::{init_logging, LogConfig, LogLevel};
use capflow_ingest::config::Config;
use capflow_ingest::pipeline::Pipeline;
use capflow_ingest::pool::WorkerPool;
use capflow_ingest::watcher::Watcher;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Depth of the watcher-to-pool event queue.
const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "capflow-ingest")]
#[command(author, version, about = "Capture-to-index pipeline daemon")]
struct Cli {
    /// Path to a .env configuration file
    #[arg(short, long)]
    env_file: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }

    // Environment variables take precedence over the verbose flag
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose && std::env::var("LOG_LEVEL").is_err() {
        log_config.level = LogLevel::Debug;
    }
    if std::env::var("LOG_FILE_PREFIX").is_err() {
        log_config.log_file_prefix = "capflow-ingest".to_string();
    }
    init_logging(&log_config)?;

    // Fatal configuration errors abort before any watching begins
    let config = Arc::new(Config::load().context("Invalid configuration")?);
    config
        .ensure_directories()
        .context("Failed to create pipeline directories")?;

    info!(
        input = %config.input_dir.display(),
        lanes = config.lane_count,
        workers = config.worker_count,
        targets = config.targets.len(),
        "Starting capture pipeline"
    );

    let pipeline = Arc::new(Pipeline::new(config.clone()).context("Failed to initialize pipeline")?);

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let shutdown = CancellationToken::new();

    let watcher_handle = tokio::spawn(Watcher::new(&config).run(tx, shutdown.clone()));
    let pool_handle = tokio::spawn(
        WorkerPool::new(pipeline, config.worker_count).run(rx, shutdown.clone()),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, draining in-flight pipelines");
    shutdown.cancel();

    let _ = watcher_handle.await;
    if tokio::time::timeout(config.drain_timeout(), pool_handle)
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.drain_timeout_secs,
            "Drain timeout elapsed, exiting with work in flight"
        );
    }

    info!("Capture pipeline stopped");
    Ok(())
}

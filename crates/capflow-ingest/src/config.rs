//! Configuration management
//!
//! One immutable [`Config`] is built from the environment at startup and
//! passed explicitly to every component constructor. Validation failures are
//! fatal: the process must abort with a non-zero status before any watching
//! begins. The input directory is deliberately *not* required to exist here;
//! the watcher reports and retries a missing input directory on a timer.

use capflow_common::{CapflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// File extension of capture files in the input directory.
pub const CAPTURE_EXTENSION: &str = "pcap";

/// Default number of consecutive seconds a file's size must hold steady.
pub const DEFAULT_STABILITY_INTERVAL_SECS: u64 = 10;

/// Default delay between input directory poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Default number of record lines per chunk.
pub const DEFAULT_CHUNK_LINES: usize = 1000;

/// Default number of upload lanes.
pub const DEFAULT_LANE_COUNT: usize = 4;

/// Default worker pool width (concurrent file pipelines).
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default number of parallel chunk uploads per lane.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Default index name for the bulk write endpoint.
pub const DEFAULT_INDEX_NAME: &str = "pcap";

/// Default external converter program.
pub const DEFAULT_CONVERTER_PROGRAM: &str = "tshark";

/// Default converter arguments; the source path is appended as the final
/// argument.
pub const DEFAULT_CONVERTER_ARGS: &str = "-T ek -r";

/// Default timeout for a single converter invocation.
pub const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 300;

/// Default timeout for a single bulk write request.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Default shutdown drain timeout for in-flight pipelines.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Watched directory of incoming capture files
    pub input_dir: PathBuf,

    /// Directory for conversion artifacts (NDJSON record streams)
    pub output_dir: PathBuf,

    /// Staging directory for chunks awaiting distribution
    pub staging_dir: PathBuf,

    /// Upload lane directories; length must equal `lane_count`
    pub lane_dirs: Vec<PathBuf>,

    /// Number of upload lanes
    pub lane_count: usize,

    /// Seconds a file's size must remain unchanged to be considered stable
    pub stability_interval_secs: u64,

    /// Seconds between input directory poll cycles
    pub poll_interval_secs: u64,

    /// Record lines per chunk
    pub chunk_lines: usize,

    /// Concurrent file pipelines
    pub worker_count: usize,

    /// Parallel chunk uploads within one lane
    pub upload_concurrency: usize,

    /// Indexing target base URLs, round-robined across uploads
    pub targets: Vec<String>,

    /// Index name for the bulk write endpoint
    pub index_name: String,

    /// External converter program
    pub converter_program: String,

    /// Converter arguments, the source path is appended last
    pub converter_args: Vec<String>,

    /// Timeout for one converter invocation
    pub convert_timeout_secs: u64,

    /// Timeout for one bulk write request
    pub upload_timeout_secs: u64,

    /// How long shutdown waits for in-flight pipelines to finish
    pub drain_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables and defaults
    ///
    /// `.env` files are honored through `dotenvy` when present. Returns a
    /// fatal `Config` error when a required variable is missing or a value is
    /// malformed.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            input_dir: required_path("CAPFLOW_INPUT_DIR")?,
            output_dir: required_path("CAPFLOW_OUTPUT_DIR")?,
            staging_dir: required_path("CAPFLOW_STAGING_DIR")?,
            lane_dirs: required_var("CAPFLOW_LANE_DIRS")?
                .split(',')
                .map(|s| PathBuf::from(s.trim()))
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            lane_count: parsed_var("CAPFLOW_LANE_COUNT", DEFAULT_LANE_COUNT)?,
            stability_interval_secs: parsed_var(
                "CAPFLOW_STABILITY_INTERVAL",
                DEFAULT_STABILITY_INTERVAL_SECS,
            )?,
            poll_interval_secs: parsed_var("CAPFLOW_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?,
            chunk_lines: parsed_var("CAPFLOW_CHUNK_LINES", DEFAULT_CHUNK_LINES)?,
            worker_count: parsed_var("CAPFLOW_WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            upload_concurrency: parsed_var(
                "CAPFLOW_UPLOAD_CONCURRENCY",
                DEFAULT_UPLOAD_CONCURRENCY,
            )?,
            targets: required_var("CAPFLOW_TARGETS")?
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            index_name: std::env::var("CAPFLOW_INDEX")
                .unwrap_or_else(|_| DEFAULT_INDEX_NAME.to_string()),
            converter_program: std::env::var("CAPFLOW_CONVERTER")
                .unwrap_or_else(|_| DEFAULT_CONVERTER_PROGRAM.to_string()),
            converter_args: std::env::var("CAPFLOW_CONVERTER_ARGS")
                .unwrap_or_else(|_| DEFAULT_CONVERTER_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            convert_timeout_secs: parsed_var(
                "CAPFLOW_CONVERT_TIMEOUT",
                DEFAULT_CONVERT_TIMEOUT_SECS,
            )?,
            upload_timeout_secs: parsed_var("CAPFLOW_UPLOAD_TIMEOUT", DEFAULT_UPLOAD_TIMEOUT_SECS)?,
            drain_timeout_secs: parsed_var("CAPFLOW_DRAIN_TIMEOUT", DEFAULT_DRAIN_TIMEOUT_SECS)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks that every numeric knob is usable and that the lane list
    /// matches the configured lane count.
    pub fn validate(&self) -> Result<()> {
        if self.lane_count == 0 {
            return Err(CapflowError::Config(
                "CAPFLOW_LANE_COUNT must be at least 1".to_string(),
            ));
        }

        if self.lane_dirs.len() != self.lane_count {
            return Err(CapflowError::Config(format!(
                "CAPFLOW_LANE_DIRS lists {} directories but CAPFLOW_LANE_COUNT is {}",
                self.lane_dirs.len(),
                self.lane_count
            )));
        }

        if self.chunk_lines == 0 {
            return Err(CapflowError::Config(
                "CAPFLOW_CHUNK_LINES must be at least 1".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(CapflowError::Config(
                "CAPFLOW_WORKER_COUNT must be at least 1".to_string(),
            ));
        }

        if self.upload_concurrency == 0 {
            return Err(CapflowError::Config(
                "CAPFLOW_UPLOAD_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if self.targets.is_empty() {
            return Err(CapflowError::Config(
                "CAPFLOW_TARGETS must list at least one indexing target".to_string(),
            ));
        }

        if self.converter_program.trim().is_empty() {
            return Err(CapflowError::Config(
                "CAPFLOW_CONVERTER must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Create the output, staging, and lane directories
    ///
    /// The input directory is left to the watcher, which tolerates it going
    /// missing at runtime.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.staging_dir)?;
        for lane in &self.lane_dirs {
            std::fs::create_dir_all(lane)?;
        }
        Ok(())
    }

    pub fn stability_interval(&self) -> Duration {
        Duration::from_secs(self.stability_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CapflowError::Config(format!("{} is not set", name))),
    }
}

fn required_path(name: &str) -> Result<PathBuf> {
    required_var(name).map(PathBuf::from)
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| CapflowError::Config(format!("{} has an invalid value: {}", name, v))),
        Err(_) => Ok(default),
    }
}

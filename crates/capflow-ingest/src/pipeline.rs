//! Per-file stage runner
//!
//! Drives one capture file through Convert → Split → Distribute → Upload →
//! Cleanup, strictly in order and fail-fast: the first failing stage aborts
//! that file's pipeline, leaves the source file on disk, and the next process
//! run re-discovers it. Stage ledgers make the retry skip whatever already
//! completed; only full completion through Upload deletes the source file.
//!
//! All ledgers are loaded once when the pipeline is constructed and shared by
//! every worker, so concurrent file pipelines agree on what is done.

use capflow_common::{CapflowError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::convert::{base_name, Converter};
use crate::distribute::Distributor;
use crate::ledger::Ledger;
use crate::split::{chunk_prefix, chunks_in_dir, Splitter};
use crate::upload::Uploader;

/// Ledger of sources whose conversion completed (absolute path keys).
pub const PROCESSED_LEDGER: &str = "processed_files.log";

/// Ledger of bases whose artifact was fully chunked.
pub const SPLIT_LEDGER: &str = "split.log";

/// Ledger of chunks moved into a lane.
pub const DISTRIBUTE_LEDGER: &str = "distribute.log";

/// Per-lane ledger of confirmed uploads (filename keys).
pub const UPLOAD_LEDGER: &str = "upload.log";

/// Pipeline stage, used to tag failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Convert,
    Split,
    Distribute,
    Upload,
    Cleanup,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Convert => "convert",
            Stage::Split => "split",
            Stage::Distribute => "distribute",
            Stage::Upload => "upload",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Lane {
    dir: PathBuf,
    ledger: Ledger,
}

/// Drives capture files through the full pipeline
pub struct Pipeline {
    config: Arc<Config>,
    converter: Converter,
    splitter: Splitter,
    distributor: Distributor,
    uploader: Uploader,
    processed: Ledger,
    split_ledger: Ledger,
    distribute_ledger: Ledger,
    lanes: Vec<Lane>,
}

impl Pipeline {
    /// Build the pipeline, loading every ledger into memory
    ///
    /// Expects the output, staging, and lane directories to exist (see
    /// [`Config::ensure_directories`]).
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let processed = Ledger::load(config.output_dir.join(PROCESSED_LEDGER))?;
        let split_ledger = Ledger::load(config.staging_dir.join(SPLIT_LEDGER))?;
        let distribute_ledger = Ledger::load(config.staging_dir.join(DISTRIBUTE_LEDGER))?;

        let lanes = config
            .lane_dirs
            .iter()
            .map(|dir| {
                Ok(Lane {
                    dir: dir.clone(),
                    ledger: Ledger::load(dir.join(UPLOAD_LEDGER))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            converter: Converter::new(&config),
            splitter: Splitter::new(&config),
            distributor: Distributor::new(&config),
            uploader: Uploader::new(&config)?,
            processed,
            split_ledger,
            distribute_ledger,
            lanes,
            config,
        })
    }

    /// Process one capture file end to end
    ///
    /// Never returns an error: stage failures are logged and the file is
    /// left in place for a future run.
    pub async fn process(&self, source: &Path) {
        match self.run(source).await {
            Ok(()) => {
                info!(path = %source.display(), "Pipeline completed");
            },
            Err((stage, e)) => {
                error!(
                    stage = %stage,
                    path = %source.display(),
                    error = %e,
                    "Pipeline aborted, source left for retry"
                );
            },
        }
    }

    async fn run(&self, source: &Path) -> std::result::Result<(), (Stage, CapflowError)> {
        let base = base_name(source).map_err(|e| (Stage::Convert, e))?;
        let source_key = std::path::absolute(source)
            .map_err(|e| (Stage::Convert, e.into()))?
            .display()
            .to_string();

        self.convert_stage(source, &source_key).await?;
        self.split_stage(&base)?;

        self.distributor
            .distribute_base(&base, &self.distribute_ledger)
            .map_err(|e| (Stage::Distribute, e))?;

        self.upload_stage(&base).await?;

        // Terminal side effect: the pipeline is confirmed end-to-end
        std::fs::remove_file(source).map_err(|e| (Stage::Cleanup, e.into()))?;
        info!(path = %source.display(), "Source capture removed");

        Ok(())
    }

    async fn convert_stage(
        &self,
        source: &Path,
        source_key: &str,
    ) -> std::result::Result<(), (Stage, CapflowError)> {
        if self.processed.contains(source_key) {
            debug!(path = %source.display(), "Conversion already recorded, skipping");
            return Ok(());
        }

        self.converter
            .convert(source, &self.config.output_dir)
            .await
            .map_err(|e| (Stage::Convert, e))?;

        self.processed
            .record(source_key)
            .map_err(|e| (Stage::Convert, e))
    }

    fn split_stage(&self, base: &str) -> std::result::Result<(), (Stage, CapflowError)> {
        if self.split_ledger.contains(base) {
            debug!(base = %base, "Split already recorded, skipping");
            return Ok(());
        }

        let artifact = self.config.output_dir.join(format!("{}.ndjson", base));

        if artifact.exists() {
            self.splitter
                .split(&artifact, base)
                .map_err(|e| (Stage::Split, e))?;
            return self
                .split_ledger
                .record(base)
                .map_err(|e| (Stage::Split, e));
        }

        // The artifact can be gone with the ledger entry missing when a
        // previous run crashed between deleting it and recording the base.
        // Its chunks are then already staged or distributed.
        let staged = chunks_in_dir(&self.config.staging_dir, Some(base))
            .map_err(|e| (Stage::Split, e.into()))?;

        if !staged.is_empty() || self.distribute_ledger.contains_prefix(&chunk_prefix(base)) {
            warn!(
                base = %base,
                "Artifact consumed by an earlier run, marking split complete"
            );
            return self
                .split_ledger
                .record(base)
                .map_err(|e| (Stage::Split, e));
        }

        Err((
            Stage::Split,
            CapflowError::Split {
                base: base.to_string(),
                message: "conversion artifact missing".to_string(),
            },
        ))
    }

    async fn upload_stage(&self, base: &str) -> std::result::Result<(), (Stage, CapflowError)> {
        let mut attempted = 0;
        let mut failed = 0;

        for lane in &self.lanes {
            let report = self
                .uploader
                .upload_lane(&lane.dir, Some(base), &lane.ledger)
                .await
                .map_err(|e| (Stage::Upload, e))?;

            attempted += report.attempted;
            failed += report.failed;
        }

        if failed > 0 {
            return Err((
                Stage::Upload,
                CapflowError::Transport {
                    base: base.to_string(),
                    failed,
                    attempted,
                },
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Convert.to_string(), "convert");
        assert_eq!(Stage::Upload.to_string(), "upload");
        assert_eq!(Stage::Cleanup.to_string(), "cleanup");
    }
}

//! Lane distribution
//!
//! Assigns staged chunks to upload lanes round-robin: the sorted list of
//! undistributed chunks for a base is walked in sequence order and chunk `i`
//! is moved into lane `i mod N`. Assignment is a pure function of the sorted
//! list, so a restart reproduces it; per-base lane sizes differ by at most
//! one chunk.
//!
//! Ownership transfers by `rename`, never copy. The chunk identifier is
//! appended to the distribution ledger only after the move succeeds; a failed
//! move leaves the chunk in staging, undistributed, for the next run. A stale
//! file already sitting at the destination is removed with a warning before
//! the move.

use capflow_common::{CapflowError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::ledger::Ledger;
use crate::split::chunks_in_dir;

/// Lane index for the chunk at a position in the sorted undistributed list
pub fn lane_for(position: usize, lane_count: usize) -> usize {
    position % lane_count
}

/// Moves staged chunks into their assigned lanes
#[derive(Debug, Clone)]
pub struct Distributor {
    staging_dir: PathBuf,
    lane_dirs: Vec<PathBuf>,
}

impl Distributor {
    pub fn new(config: &Config) -> Self {
        Self {
            staging_dir: config.staging_dir.clone(),
            lane_dirs: config.lane_dirs.clone(),
        }
    }

    /// Distribute every undistributed staged chunk of one base
    ///
    /// Returns the number of chunks moved. Chunks already present in the
    /// ledger are skipped, so a re-run after a crash performs no duplicate
    /// moves.
    pub fn distribute_base(&self, base: &str, ledger: &Ledger) -> Result<usize> {
        let pending: Vec<String> = chunks_in_dir(&self.staging_dir, Some(base))?
            .into_iter()
            .filter(|name| !ledger.contains(name))
            .collect();

        if pending.is_empty() {
            debug!(base = %base, "No undistributed chunks");
            return Ok(0);
        }

        for (position, name) in pending.iter().enumerate() {
            let src = self.staging_dir.join(name);
            let lane_dir = &self.lane_dirs[lane_for(position, self.lane_dirs.len())];
            let dst = lane_dir.join(name);

            if dst.exists() {
                warn!(
                    chunk = %name,
                    lane = %lane_dir.display(),
                    "Removing stale chunk at destination before move"
                );
                std::fs::remove_file(&dst).map_err(|e| CapflowError::Distribute {
                    chunk: name.clone(),
                    message: format!("failed to clear stale destination: {}", e),
                })?;
            }

            std::fs::rename(&src, &dst).map_err(|e| CapflowError::Distribute {
                chunk: name.clone(),
                message: format!("move to {} failed: {}", lane_dir.display(), e),
            })?;

            ledger.record(name)?;
            debug!(chunk = %name, lane = %lane_dir.display(), "Distributed chunk");
        }

        info!(base = %base, chunks = pending.len(), "Distributed chunks across lanes");
        Ok(pending.len())
    }
}

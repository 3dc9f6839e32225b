//! Bulk upload coordinator
//!
//! For one lane at a time: list the chunk files present, drop the ones the
//! lane's upload ledger already records, and push the rest concurrently to
//! the indexing targets. Targets are assigned round-robin by chunk position.
//! A chunk file is deleted only after its upload succeeded *and* its filename
//! was appended to the lane ledger; any failure leaves the chunk in place for
//! the next coordinator run. There is no in-process retry or backoff.
//!
//! Wire contract: `POST <target>/<index>/_bulk` with
//! `Content-Type: application/x-ndjson` and the raw chunk bytes as the body.
//! Success is judged by the response status alone.

use capflow_common::{CapflowError, Result};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::ledger::Ledger;
use crate::split::chunks_in_dir;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Per-lane upload outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadReport {
    pub attempted: usize,
    pub uploaded: usize,
    pub failed: usize,
}

/// Pushes lane chunks to the indexing targets
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
    targets: Vec<String>,
    index_name: String,
    concurrency: usize,
}

impl Uploader {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upload_timeout())
            .build()
            .map_err(|e| CapflowError::Network(e.to_string()))?;

        Ok(Self {
            client,
            targets: config.targets.clone(),
            index_name: config.index_name.clone(),
            concurrency: config.upload_concurrency,
        })
    }

    /// Bulk endpoint for the target assigned to a chunk position
    fn bulk_url(&self, position: usize) -> String {
        let target = &self.targets[position % self.targets.len()];
        format!("{}/{}/_bulk", target, self.index_name)
    }

    /// Upload every pending chunk in one lane
    ///
    /// With a `base`, only that base's chunks are considered. Individual
    /// chunk failures are logged and counted, never propagated; the caller
    /// decides what an incomplete lane means for its pipeline.
    pub async fn upload_lane(
        &self,
        lane_dir: &Path,
        base: Option<&str>,
        ledger: &Ledger,
    ) -> Result<UploadReport> {
        let pending: Vec<String> = chunks_in_dir(lane_dir, base)?
            .into_iter()
            .filter(|name| !ledger.contains(name))
            .collect();

        if pending.is_empty() {
            debug!(lane = %lane_dir.display(), "No new chunks to upload");
            return Ok(UploadReport::default());
        }

        info!(
            lane = %lane_dir.display(),
            chunks = pending.len(),
            "Uploading chunks"
        );

        let uploaded = AtomicUsize::new(0);

        futures::stream::iter(pending.iter().enumerate())
            .for_each_concurrent(self.concurrency, |(position, name)| {
                let uploaded = &uploaded;
                async move {
                    if self.upload_chunk(position, lane_dir, name, ledger).await {
                        uploaded.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
            .await;

        let uploaded = uploaded.load(Ordering::Relaxed);
        Ok(UploadReport {
            attempted: pending.len(),
            uploaded,
            failed: pending.len() - uploaded,
        })
    }

    /// Upload one chunk; true on confirmed success
    async fn upload_chunk(
        &self,
        position: usize,
        lane_dir: &Path,
        name: &str,
        ledger: &Ledger,
    ) -> bool {
        let path = lane_dir.join(name);
        let url = self.bulk_url(position);

        let body = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(chunk = %name, error = %e, "Failed to read chunk file");
                return false;
            },
        };

        debug!(chunk = %name, url = %url, bytes = body.len(), "Submitting bulk write");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                if let Err(e) = ledger.record(name) {
                    // Without the ledger entry the chunk must stay for retry
                    error!(chunk = %name, error = %e, "Failed to record upload");
                    return false;
                }
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    error!(chunk = %name, error = %e, "Failed to delete uploaded chunk");
                }
                info!(chunk = %name, url = %url, "Uploaded chunk");
                true
            },
            Ok(resp) => {
                error!(
                    chunk = %name,
                    url = %url,
                    status = %resp.status(),
                    "Bulk write rejected"
                );
                false
            },
            Err(e) => {
                error!(chunk = %name, url = %url, error = %e, "Upload failed");
                false
            },
        }
    }
}

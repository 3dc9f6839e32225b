//! Bounded worker pool
//!
//! Consumes stable-file events from the watcher channel and runs one stage
//! runner per file, up to the configured width; completed tasks free their
//! slot immediately. On shutdown the pool stops pulling new events while
//! in-flight pipelines run to completion (the drain timeout is enforced by
//! the caller). Queued-but-unstarted files are simply abandoned; they are
//! still on disk and are re-discovered on the next run.

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::pipeline::Pipeline;

/// Bounded-concurrency executor of file pipelines
pub struct WorkerPool {
    pipeline: Arc<Pipeline>,
    width: usize,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<Pipeline>, width: usize) -> Self {
        Self { pipeline, width }
    }

    /// Run until the channel closes or shutdown is signalled
    pub async fn run(self, rx: mpsc::Receiver<PathBuf>, shutdown: CancellationToken) {
        info!(width = self.width, "Worker pool started");

        ReceiverStream::new(rx)
            .take_until(shutdown.cancelled_owned())
            .for_each_concurrent(self.width, |path| {
                let pipeline = self.pipeline.clone();
                async move {
                    pipeline.process(&path).await;
                }
            })
            .await;

        info!("Worker pool drained");
    }
}

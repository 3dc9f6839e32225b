//! Stability-based input directory watcher
//!
//! Polls the input directory by listing (no event notification), and emits a
//! capture file exactly once after it has been observed to stop growing. The
//! stability probe reads the file size, waits the configured interval, and
//! reads it again; the file is Stable only when both reads succeed and agree.
//! Growing or vanished files are simply re-probed on the next poll cycle.
//!
//! The probe's settling wait is blocking by design, so the watcher runs on
//! its own task and never shares an execution thread with the worker pool.

use crate::config::{Config, CAPTURE_EXTENSION};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before re-checking a missing input directory.
const MISSING_DIR_RETRY_SECS: u64 = 2;

/// Watches the input directory for stable capture files
pub struct Watcher {
    input_dir: PathBuf,
    stability_interval: Duration,
    poll_interval: Duration,
}

impl Watcher {
    pub fn new(config: &Config) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            stability_interval: config.stability_interval(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Run the poll-and-probe loop until shutdown
    ///
    /// Each file that transitions to Stable is sent over `tx` exactly once
    /// and then considered Claimed for the lifetime of this process. Files
    /// that failed downstream are re-discovered on the next process run, not
    /// within this one.
    pub async fn run(self, tx: mpsc::Sender<PathBuf>, shutdown: CancellationToken) {
        info!(
            dir = %self.input_dir.display(),
            stability_interval_secs = self.stability_interval.as_secs(),
            "Monitoring input directory"
        );

        let mut claimed = HashSet::new();

        while !shutdown.is_cancelled() {
            if !self.poll_once(&mut claimed, &tx, &shutdown).await {
                break;
            }

            tokio::select! {
                _ = sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Watcher stopped");
    }

    /// One poll cycle: list, diff against claimed files, probe the rest
    ///
    /// Returns `false` when the event channel has closed and the watcher
    /// should stop.
    async fn poll_once(
        &self,
        claimed: &mut HashSet<PathBuf>,
        tx: &mpsc::Sender<PathBuf>,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut files = match list_captures(&self.input_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(
                    dir = %self.input_dir.display(),
                    error = %e,
                    "Input directory is not readable, retrying"
                );
                tokio::select! {
                    _ = sleep(Duration::from_secs(MISSING_DIR_RETRY_SECS)) => {},
                    _ = shutdown.cancelled() => {},
                }
                return true;
            },
        };

        files.retain(|path| !claimed.contains(path));
        let mut new_files: Vec<_> = files.into_iter().collect();
        new_files.sort();

        for path in new_files {
            if shutdown.is_cancelled() {
                return true;
            }

            if is_stable(&path, self.stability_interval).await {
                info!(path = %path.display(), "Stable capture file detected");
                if tx.send(path.clone()).await.is_err() {
                    return false;
                }
                claimed.insert(path);
            } else {
                debug!(path = %path.display(), "File not yet stable");
            }
        }

        true
    }
}

/// Probe whether a file's size holds steady across the interval
///
/// Returns `false` when either size read fails (e.g. the file disappeared
/// mid-probe) or the sizes differ.
pub async fn is_stable(path: &Path, interval: Duration) -> bool {
    let prev_size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return false,
    };

    sleep(interval).await;

    match std::fs::metadata(path) {
        Ok(meta) => meta.len() == prev_size,
        Err(_) => false,
    }
}

/// List capture files currently present in the input directory
fn list_captures(dir: &Path) -> std::io::Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == CAPTURE_EXTENSION) && path.is_file() {
            files.insert(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_watcher(input_dir: &Path) -> Watcher {
        Watcher {
            input_dir: input_dir.to_path_buf(),
            stability_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_stable_file_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.pcap");
        std::fs::write(&path, b"finished capture").unwrap();

        assert!(is_stable(&path, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.pcap");

        assert!(!is_stable(&path, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_file_deleted_mid_probe_is_not_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanishing.pcap");
        std::fs::write(&path, b"partial").unwrap();

        let delete_path = path.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            let _ = std::fs::remove_file(&delete_path);
        });

        assert!(!is_stable(&path, Duration::from_millis(120)).await);
    }

    #[tokio::test]
    async fn test_growing_file_is_not_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.pcap");
        std::fs::write(&path, b"start").unwrap();

        let grow_path = path.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&grow_path)
                .unwrap();
            use std::io::Write;
            file.write_all(b"more data").unwrap();
        });

        assert!(!is_stable(&path, Duration::from_millis(120)).await);
    }

    #[tokio::test]
    async fn test_stable_file_emitted_exactly_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.pcap");
        std::fs::write(&path, b"finished capture").unwrap();

        let watcher = test_watcher(dir.path());
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let mut claimed = HashSet::new();

        // Two poll cycles must enqueue the file once
        assert!(watcher.poll_once(&mut claimed, &tx, &shutdown).await);
        assert!(watcher.poll_once(&mut claimed, &tx, &shutdown).await);

        assert_eq!(rx.try_recv().unwrap(), path);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_capture_files_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
        std::fs::write(dir.path().join("trace.pcapng"), b"wrong extension").unwrap();

        let watcher = test_watcher(dir.path());
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let mut claimed = HashSet::new();

        assert!(watcher.poll_once(&mut claimed, &tx, &shutdown).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_input_dir_is_not_fatal() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-created");

        let watcher = test_watcher(&missing);
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let mut claimed = HashSet::new();

        // Shutdown is pre-cancelled so the retry sleep returns immediately.
        shutdown.cancel();
        assert!(watcher.poll_once(&mut claimed, &tx, &shutdown).await);
    }
}

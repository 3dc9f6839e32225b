//! Append-only progress ledgers
//!
//! A [`Ledger`] is a durable, monotonic set of string keys backed by a
//! newline-delimited log file. The whole log is read into memory once at
//! load time; afterwards membership checks are in-memory and every new key is
//! appended to the log before being reported as recorded. Entries are never
//! removed or rewritten, so reloading the file after a crash rebuilds the
//! identical set and already-completed work is skipped without inspecting any
//! file contents.
//!
//! One ledger instance is the single writer for its file within a process;
//! concurrent recorders share it behind a mutex. Sharing one ledger file
//! between processes is not supported.
//!
//! The same type serves all four pipeline roles: converted sources (absolute
//! path keys), split bases, distributed chunks, and per-lane uploaded chunks
//! (filename keys).

use capflow_common::{CapflowError, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable idempotent set backed by an append-only log file
pub struct Ledger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    entries: HashSet<String>,
    file: File,
}

impl Ledger {
    /// Open a ledger, reading every existing entry into memory
    ///
    /// A missing file yields an empty ledger; the file is created on the
    /// first [`record`](Self::record).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                let key = line.trim();
                if !key.is_empty() {
                    entries.insert(key.to_string());
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            inner: Mutex::new(LedgerInner { entries, file }),
        })
    }

    /// Whether the key has already been recorded
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    /// Whether any recorded key starts with the given prefix
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.lock().entries.iter().any(|k| k.starts_with(prefix))
    }

    /// Record a completed unit of work
    ///
    /// The key is appended to the log and flushed before this returns, so a
    /// crash immediately afterwards still skips the unit on restart.
    /// Recording an already-present key is a no-op; the log never carries
    /// duplicate lines.
    pub fn record(&self, key: &str) -> Result<()> {
        let mut guard = self.lock();
        if guard.entries.contains(key) {
            return Ok(());
        }

        guard
            .file
            .write_all(format!("{}\n", key).as_bytes())
            .and_then(|_| guard.file.flush())
            .map_err(|e| CapflowError::Ledger {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        guard.entries.insert(key.to_string());
        Ok(())
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Path of the backing log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // A poisoned mutex only means another recorder panicked mid-append;
        // the in-memory set is still a subset of the log and safe to use.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("split.log")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.contains("anything"));
    }

    #[test]
    fn test_record_and_contains() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("split.log")).unwrap();

        ledger.record("capture-01").unwrap();
        assert!(ledger.contains("capture-01"));
        assert!(!ledger.contains("capture-02"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_reload_rebuilds_identical_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload.log");

        {
            let ledger = Ledger::load(&path).unwrap();
            ledger.record("a.chunk_0000").unwrap();
            ledger.record("a.chunk_0001").unwrap();
        }

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("a.chunk_0000"));
        assert!(reloaded.contains("a.chunk_0001"));
    }

    #[test]
    fn test_duplicate_record_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("distribute.log");

        let ledger = Ledger::load(&path).unwrap();
        ledger.record("a.chunk_0000").unwrap();
        ledger.record("a.chunk_0000").unwrap();
        assert_eq!(ledger.len(), 1);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[test]
    fn test_blank_lines_ignored_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("processed.log");
        std::fs::write(&path, "/in/a.pcap\n\n  \n/in/b.pcap\n").unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("/in/a.pcap"));
        assert!(ledger.contains("/in/b.pcap"));
    }

    #[test]
    fn test_contains_prefix() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("distribute.log")).unwrap();

        ledger.record("capture-01.chunk_0002").unwrap();
        assert!(ledger.contains_prefix("capture-01.chunk_"));
        assert!(!ledger.contains_prefix("capture-02.chunk_"));
    }
}

//! Chunk splitting
//!
//! Cuts a conversion artifact into fixed-size line-count chunks named
//! `<base>.chunk_<seq>` with a zero-padded, fixed-width sequence so that
//! lexicographic order equals numeric order. Chunks are written into the
//! staging directory; the artifact is deleted only after every chunk has been
//! written. An artifact with zero records yields zero chunks and still counts
//! as split.

use capflow_common::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;

/// Width of the zero-padded chunk sequence number.
pub const CHUNK_SEQ_WIDTH: usize = 4;

/// Marker separating the base name from the sequence number.
pub const CHUNK_MARKER: &str = ".chunk_";

/// Chunk filename for a base and sequence index
pub fn chunk_name(base: &str, seq: usize) -> String {
    format!("{}{}{:0width$}", base, CHUNK_MARKER, seq, width = CHUNK_SEQ_WIDTH)
}

/// Filename prefix shared by every chunk of a base
pub fn chunk_prefix(base: &str) -> String {
    format!("{}{}", base, CHUNK_MARKER)
}

/// Whether a filename denotes a chunk (of any base)
pub fn is_chunk_file(name: &str) -> bool {
    name.contains(CHUNK_MARKER)
}

/// Sorted chunk filenames present in a directory
///
/// With a `base`, only that base's chunks are listed. Ledger files and other
/// non-chunk entries are excluded.
pub fn chunks_in_dir(dir: &Path, base: Option<&str>) -> std::io::Result<Vec<String>> {
    let prefix = base.map(chunk_prefix);
    let mut chunks = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let matches = match &prefix {
            Some(p) => name.starts_with(p.as_str()),
            None => is_chunk_file(&name),
        };
        if matches {
            chunks.push(name);
        }
    }

    chunks.sort();
    Ok(chunks)
}

/// Splits conversion artifacts into staged chunks
#[derive(Debug, Clone)]
pub struct Splitter {
    staging_dir: PathBuf,
    chunk_lines: usize,
}

impl Splitter {
    pub fn new(config: &Config) -> Self {
        Self {
            staging_dir: config.staging_dir.clone(),
            chunk_lines: config.chunk_lines,
        }
    }

    /// Split one artifact into chunks and delete it
    ///
    /// Returns the written chunk paths in sequence order. On error the
    /// artifact is left in place; a retry overwrites any partial chunks
    /// because chunk names are deterministic.
    pub fn split(&self, artifact: &Path, base: &str) -> Result<Vec<PathBuf>> {
        let reader = BufReader::new(File::open(artifact)?);

        let mut chunks = Vec::new();
        let mut writer: Option<BufWriter<File>> = None;
        let mut lines_in_chunk = 0;

        for line in reader.lines() {
            let line = line?;

            if writer.is_none() {
                let path = self.staging_dir.join(chunk_name(base, chunks.len()));
                debug!(chunk = %path.display(), "Writing chunk");
                writer = Some(BufWriter::new(File::create(&path)?));
                chunks.push(path);
                lines_in_chunk = 0;
            }

            if let Some(w) = writer.as_mut() {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }

            lines_in_chunk += 1;
            if lines_in_chunk == self.chunk_lines {
                if let Some(mut w) = writer.take() {
                    w.flush()?;
                }
            }
        }

        if let Some(mut w) = writer.take() {
            w.flush()?;
        }

        std::fs::remove_file(artifact)?;

        info!(
            base = %base,
            chunks = chunks.len(),
            "Split artifact into chunks"
        );

        Ok(chunks)
    }
}

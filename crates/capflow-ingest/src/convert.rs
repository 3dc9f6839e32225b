//! External converter invocation
//!
//! The capture-to-records conversion is a black box: a configured program is
//! spawned with the source path appended to its argument list and its stdout
//! is captured into the conversion artifact (`<base>.ndjson`). The defaults
//! run `tshark -T ek -r <path>`.
//!
//! Every invocation is wrapped in an explicit timeout; a converter that
//! hangs is killed and reported as a stage failure rather than blocking a
//! worker indefinitely. A failed or timed-out conversion removes the partial
//! artifact so a retry starts clean.

use capflow_common::{CapflowError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::Config;

/// Spawns the external converter for one capture file at a time
#[derive(Debug, Clone)]
pub struct Converter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Converter {
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.converter_program.clone(),
            args: config.converter_args.clone(),
            timeout: config.convert_timeout(),
        }
    }

    /// Convert one capture file into an NDJSON artifact
    ///
    /// Returns the artifact path on success. On any failure the partial
    /// artifact is removed and the source file is left untouched.
    pub async fn convert(&self, source: &Path, output_dir: &Path) -> Result<PathBuf> {
        let base = base_name(source)?;
        let artifact = output_dir.join(format!("{}.ndjson", base));

        debug!(
            program = %self.program,
            source = %source.display(),
            artifact = %artifact.display(),
            "Invoking converter"
        );

        let out_file = std::fs::File::create(&artifact)?;

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the hung converter when the future drops
                let _ = std::fs::remove_file(&artifact);
                return Err(CapflowError::ConvertTimeout {
                    path: source.display().to_string(),
                    seconds: self.timeout.as_secs(),
                });
            },
        };

        if !output.status.success() {
            let _ = std::fs::remove_file(&artifact);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapflowError::Convert {
                path: source.display().to_string(),
                message: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        info!(
            source = %source.display(),
            artifact = %artifact.display(),
            "Converted capture"
        );

        Ok(artifact)
    }
}

/// Base name of a capture file: the file name without its extension
pub fn base_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| CapflowError::Convert {
            path: path.display().to_string(),
            message: "path has no file name".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn converter(program: &str, args: &[&str], timeout_secs: u64) -> Converter {
        Converter {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(Path::new("/in/session-01.pcap")).unwrap(), "session-01");
        assert_eq!(base_name(Path::new("plain")).unwrap(), "plain");
    }

    #[tokio::test]
    async fn test_convert_captures_stdout() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("session.pcap");
        std::fs::write(&source, "{\"a\":1}\n{\"a\":2}\n").unwrap();

        // `cat <path>` stands in for the real converter
        let artifact = converter("cat", &[], 10)
            .convert(&source, dir.path())
            .await
            .unwrap();

        assert_eq!(artifact, dir.path().join("session.ndjson"));
        let content = std::fs::read_to_string(&artifact).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_failed_converter_removes_artifact() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("session.pcap");
        std::fs::write(&source, b"data").unwrap();

        let err = converter("sh", &["-c", "exit 3"], 10)
            .convert(&source, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, CapflowError::Convert { .. }));
        assert!(!dir.path().join("session.ndjson").exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_hung_converter_times_out() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("session.pcap");
        std::fs::write(&source, b"data").unwrap();

        let slow = Converter {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            timeout: Duration::from_millis(100),
        };

        let err = slow.convert(&source, dir.path()).await.unwrap_err();
        assert!(matches!(err, CapflowError::ConvertTimeout { .. }));
        assert!(!dir.path().join("session.ndjson").exists());
    }

    #[tokio::test]
    async fn test_missing_converter_program() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("session.pcap");
        std::fs::write(&source, b"data").unwrap();

        let err = converter("capflow-no-such-converter", &[], 10)
            .convert(&source, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, CapflowError::Io(_)));
    }
}

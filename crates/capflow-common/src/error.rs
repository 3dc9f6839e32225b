//! Error types for Capflow
//!
//! The taxonomy mirrors how failures propagate through the pipeline: `Config`
//! errors are fatal at startup, stage errors (`Convert`, `Split`,
//! `Distribute`, `Transport`) abort a single file's pipeline, and everything
//! else is surfaced through logs while the process keeps running.

use thiserror::Error;

/// Result type alias for Capflow operations
pub type Result<T> = std::result::Result<T, CapflowError>;

/// Main error type for Capflow
#[derive(Error, Debug)]
pub enum CapflowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error at {path}: {message}")]
    Ledger { path: String, message: String },

    #[error("Converter failed for {path}: {message}")]
    Convert { path: String, message: String },

    #[error("Converter timed out after {seconds}s for {path}")]
    ConvertTimeout { path: String, seconds: u64 },

    #[error("Split failed for {base}: {message}")]
    Split { base: String, message: String },

    #[error("Distribute failed for {chunk}: {message}")]
    Distribute { chunk: String, message: String },

    #[error("Upload incomplete for {base}: {failed} of {attempted} chunks failed")]
    Transport {
        base: String,
        failed: usize,
        attempted: usize,
    },

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CapflowError::Config("CAPFLOW_INPUT_DIR is not set".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: CAPFLOW_INPUT_DIR is not set"
        );

        let err = CapflowError::Transport {
            base: "capture-01".to_string(),
            failed: 2,
            attempted: 5,
        };
        assert_eq!(
            err.to_string(),
            "Upload incomplete for capture-01: 2 of 5 chunks failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CapflowError = io_err.into();
        assert!(matches!(err, CapflowError::Io(_)));
    }
}

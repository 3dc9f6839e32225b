//! Capflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Capflow project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Capflow workspace
//! members:
//!
//! - **Error Handling**: The pipeline error taxonomy and result type
//! - **Logging**: Centralized tracing initialization (console, file, or both)
//!
//! # Example
//!
//! ```no_run
//! use capflow_common::{Result, CapflowError};
//!
//! fn check_lanes(lanes: &[String]) -> Result<()> {
//!     if lanes.is_empty() {
//!         return Err(CapflowError::Config("no lanes configured".into()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CapflowError, Result};

//! Capflow Ingest Library
//!
//! Pipeline orchestration for continuously-arriving packet-capture files:
//! watch a directory for stable captures, convert each into an NDJSON record
//! stream through an external converter, split the stream into bounded-size
//! chunks, distribute the chunks round-robin across a fixed set of upload
//! lanes, and bulk-push each chunk to an indexing endpoint.
//!
//! Every stage is idempotent across process restarts: append-only ledgers
//! record completed units of work (converted sources, split bases, distributed
//! chunks, uploaded chunks) and are reloaded into memory at startup, so a
//! restarted pipeline resumes exactly where it stopped without re-doing or
//! losing work.
//!
//! # Example
//!
//! ```no_run
//! use capflow_ingest::{config::Config, pipeline::Pipeline};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load()?);
//!     config.ensure_directories()?;
//!     let pipeline = Pipeline::new(config)?;
//!     pipeline.process(Path::new("/captures/session-01.pcap")).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod distribute;
pub mod ledger;
pub mod pipeline;
pub mod pool;
pub mod split;
pub mod upload;
pub mod watcher;

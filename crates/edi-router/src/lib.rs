//! EDI Router Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Drop-folder ingestion and partner delivery for ANSI X12 files.
//!
//! # Overview
//!
//! - **Directory watching**: [`ingest::DirectoryWatcher`] notices files landing
//!   in `incoming/`, waits for writes to settle, and hands them to the pipeline
//! - **Ingestion**: [`ingest::IngestionPipeline`] moves each file through
//!   `incoming -> processing -> archive` (or `errors` with a companion `.log`)
//! - **Envelope parsing**: [`x12::EnvelopeParser`] reads the ISA/GS/ST
//!   hierarchy, discovering delimiters from the interchange header
//! - **Transfers**: [`transfer::TransferClient`] uploads to and lists FTP or
//!   SFTP servers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edi_router::config::MonitorConfig;
//! use edi_router::ingest::{DirectoryWatcher, EventBus, IngestionPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MonitorConfig::load()?;
//!     let pipeline = Arc::new(IngestionPipeline::new(
//!         config.layout(),
//!         config.retry_policy(),
//!         EventBus::new(config.max_subscribers),
//!     ));
//!     DirectoryWatcher::new(pipeline, config.watcher_options()).run().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod transfer;
pub mod x12;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use error::{IngestError, TransferError, TransferResult, X12Error};
pub use ingest::{DirectoryWatcher, IngestionPipeline};
pub use transfer::{TransferClient, TransferTarget, UploadResult};
pub use x12::{EnvelopeParser, Interchange};

//! EDI Router Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error classification and logging setup for the EDI router workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ErrorKind`] classifies every failure in the workspace
//!   (I/O, structural, protocol, configuration, interrupted)
//! - **Logging**: [`logging`] configures `tracing` output to console and/or
//!   daily rolling files
//!
//! # Example
//!
//! ```no_run
//! use edi_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("router starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{EdiError, ErrorKind, Result};

//! Router error types
//!
//! One enum per subsystem. Each exposes `kind()` so callers can branch on
//! [`ErrorKind`] instead of matching individual variants.

use std::path::PathBuf;

use edi_common::ErrorKind;
use thiserror::Error;

use crate::ingest::ProcessingState;

/// Result type alias for transfer operations
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Structural failures while reading an X12 envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum X12Error {
    #[error("No ISA segment found")]
    MissingIsa,

    #[error("Truncated after ISA: no element separator")]
    TruncatedAfterIsa,

    #[error("Invalid ISA: expected 16 elements, found {found}")]
    IncompleteIsa { found: usize },

    #[error("Unexpected end of input after ISA16: segment terminator missing")]
    MissingSegmentTerminator,
}

impl X12Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Structural
    }
}

/// Failures inside the ingestion pipeline and directory watcher
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to move {} to {} after {attempts} attempts: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Envelope parse failed: {0}")]
    Envelope(#[from] X12Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted while {0}")]
    Interrupted(String),

    #[error("Illegal state transition {from} -> {to}")]
    IllegalTransition {
        from: ProcessingState,
        to: ProcessingState,
    },

    #[error("Cannot initialize directory {}: {source}", path.display())]
    Startup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch backend error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Directory watcher is already running")]
    AlreadyRunning,

    #[error("Subscriber limit of {0} reached")]
    SubscriberLimit(usize),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Move { .. } | IngestError::Io(_) | IngestError::Watch(_) => ErrorKind::Io,
            IngestError::Envelope(e) => e.kind(),
            IngestError::Interrupted(_) => ErrorKind::Interrupted,
            IngestError::Startup { .. } => ErrorKind::Configuration,
            IngestError::IllegalTransition { .. }
            | IngestError::AlreadyRunning
            | IngestError::SubscriberLimit(_) => ErrorKind::Configuration,
        }
    }
}

/// Failures of FTP/SFTP uploads and listings
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error(
        "SFTP to {host} requires host key verification: set a host key fingerprint \
         or explicitly opt in to trusting unknown host keys"
    )]
    MissingHostKeyPolicy { host: String },

    #[error("Invalid transfer target: {0}")]
    InvalidTarget(String),

    #[error("Host key mismatch: expected {expected}, server presented {actual}")]
    HostKeyMismatch { expected: String, actual: String },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote file exists and overwrite=false: {0}")]
    RemoteExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer task failed: {0}")]
    TaskFailed(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::UnsupportedProtocol(_)
            | TransferError::MissingHostKeyPolicy { .. }
            | TransferError::InvalidTarget(_) => ErrorKind::Configuration,
            TransferError::HostKeyMismatch { .. }
            | TransferError::Connection(_)
            | TransferError::Authentication(_)
            | TransferError::Protocol(_)
            | TransferError::RemoteExists(_)
            | TransferError::TaskFailed(_) => ErrorKind::Protocol,
            TransferError::Io(_) => ErrorKind::Io,
        }
    }
}

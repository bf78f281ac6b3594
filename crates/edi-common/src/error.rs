//! Error types shared by the EDI router crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, EdiError>;

/// Coarse classification of a failure.
///
/// Every domain error in the workspace maps onto one of these so callers can
/// decide what to do with a failure without matching on concrete variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local filesystem or socket I/O; may succeed on a later attempt
    Io,
    /// Malformed input data (e.g. a broken ISA envelope)
    Structural,
    /// Connection, authentication or wire-protocol failure
    Protocol,
    /// Caller or configuration mistake, detected before any I/O
    Configuration,
    /// The operation was aborted by a stop request
    Interrupted,
}

impl ErrorKind {
    /// Only plain I/O failures are worth retrying automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Structural => write!(f, "structural"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Common error type
#[derive(Error, Debug)]
pub enum EdiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

impl EdiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EdiError::Io(_) => ErrorKind::Io,
            EdiError::Config(_) | EdiError::InvalidValue { .. } => ErrorKind::Configuration,
        }
    }
}

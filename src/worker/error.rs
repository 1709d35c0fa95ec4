//! Worker Error Types

use crate::status::{Phase, StatusError};
use std::path::PathBuf;

/// Errors raised while a worker records its own status
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type for worker status operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors returned by a scanning engine
///
/// These end up verbatim in the unit's error list.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Unsupported locator '{locator}': {reason}")]
    UnsupportedLocator { locator: String, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Status reporting failed: {0}")]
    Reporting(#[from] WorkerError),

    #[error("{0}")]
    Engine(String),
}

impl ScanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }
}

//! Status Store Error Types

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt status file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Failed to serialise status for {path}: {message}")]
    Serialize { path: PathBuf, message: String },

    #[error("Job directory already exists: {0}")]
    JobExists(PathBuf),

    #[error("Job directory missing: {0}")]
    DirectoryMissing(PathBuf),

    #[error("Invalid job id '{job_id}': {reason}")]
    InvalidJobId { job_id: String, reason: String },
}

impl StatusError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StatusError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means the job directory (or a file in it) is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            StatusError::DirectoryMissing(_) => true,
            StatusError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for status store operations
pub type StatusResult<T> = Result<T, StatusError>;

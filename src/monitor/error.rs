//! Job Monitor Error Types

use crate::status::StatusError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' has a corrupt master status: {message}")]
    CorruptJob { job_id: String, message: String },

    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Result type for job monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

//! Spawner Error Types

use crate::status::StatusError;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Invalid job specification: {message}")]
    InvalidJobSpec { message: String },

    #[error(transparent)]
    Status(#[from] StatusError),
}

impl SpawnError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SpawnError::InvalidJobSpec {
            message: message.into(),
        }
    }
}

/// Result type for spawner operations
pub type SpawnResult<T> = Result<T, SpawnError>;

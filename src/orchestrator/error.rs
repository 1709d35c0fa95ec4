//! Orchestrator Error Types
//!
//! Only problems with the job as a whole reach callers; per-unit failures
//! live in the unit status files.

use crate::core::error_handling::ContextualError;
use crate::monitor::MonitorError;
use crate::orchestrator::config::ConfigError;
use crate::spawner::SpawnError;
use crate::status::StatusError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid job specification: {message}")]
    InvalidJobSpec { message: String },

    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' is corrupt: {message}")]
    CorruptJob { job_id: String, message: String },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("Cannot locate worker executable: {0}")]
    WorkerExecutable(#[source] std::io::Error),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<SpawnError> for OrchestratorError {
    fn from(error: SpawnError) -> Self {
        match error {
            SpawnError::InvalidJobSpec { message } => OrchestratorError::InvalidJobSpec { message },
            SpawnError::Status(e) => OrchestratorError::Status(e),
        }
    }
}

impl From<MonitorError> for OrchestratorError {
    fn from(error: MonitorError) -> Self {
        match error {
            MonitorError::JobNotFound { job_id } => OrchestratorError::JobNotFound { job_id },
            MonitorError::CorruptJob { job_id, message } => {
                OrchestratorError::CorruptJob { job_id, message }
            }
            MonitorError::Status(e) => OrchestratorError::Status(e),
        }
    }
}

impl ContextualError for OrchestratorError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvalidJobSpec { .. }
                | OrchestratorError::JobNotFound { .. }
                | OrchestratorError::InvalidConfig(_)
                | OrchestratorError::ShuttingDown
        )
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

//! Error reporting at the CLI boundary
//!
//! Module errors implement [`ContextualError`] so the command layer can decide
//! whether to show the error itself or just the failed operation.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)` with a helpful, actionable message; otherwise `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the user can act on
    /// (bad job id, invalid configuration, unknown job)
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<String>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors are logged with their own message; system errors
/// are logged with `operation_context` and the detail goes to debug level.
///
/// # Examples
/// ```rust,no_run
/// # use stackscan::core::error_handling::log_error_with_context;
/// # use stackscan::orchestrator::OrchestratorError;
/// let err = OrchestratorError::JobNotFound { job_id: "job-0000".into() };
/// log_error_with_context(&err, "Reading job status");
/// // Logs: "FATAL: Job 'job-0000' not found"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

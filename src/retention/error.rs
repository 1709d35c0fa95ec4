//! Retention Sweeper Error Types

use crate::monitor::MonitorError;
use crate::status::StatusError;

/// A problem with one job directory during a sweep
///
/// Sweep errors never abort the sweep; they are logged, collected in the
/// report and the directory is looked at again next interval.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Could not inspect job '{job_id}': {source}")]
    Inspect {
        job_id: String,
        #[source]
        source: MonitorError,
    },

    #[error("Could not remove job '{job_id}': {source}")]
    Remove {
        job_id: String,
        #[source]
        source: StatusError,
    },

    #[error("Could not list job root: {0}")]
    List(#[from] StatusError),
}

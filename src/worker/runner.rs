//! Worker process body
//!
//! [`run_worker`] drives one unit from `pending` to a terminal phase and maps
//! the outcome to the process exit code the spawner interprets.

use crate::core::time::Clock;
use crate::status::{FailureReason, StatusStore};
use crate::worker::engine::{ScanEngine, ScanProgress, ScanRequest};
use crate::worker::reporter::StatusReporter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a worker is told on its command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub job_root: PathBuf,
    pub job_id: String,
    pub unit_index: usize,
    pub name: String,
    pub locator: String,
    pub cadence: Duration,
}

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// `completed` was written
    Completed,
    /// The engine failed and `failed` was written
    Failed,
    /// A termination signal arrived and `failed`/`terminated` was written
    Terminated,
    /// The status file could not be written at all
    StatusWriteFailed,
}

impl WorkerExit {
    pub fn code(self) -> i32 {
        match self {
            WorkerExit::Completed => 0,
            WorkerExit::Failed => 1,
            WorkerExit::StatusWriteFailed => 2,
            WorkerExit::Terminated => 143,
        }
    }
}

/// Run one unit to completion
///
/// `shutdown` is the process's signal token; when it fires mid-scan the unit
/// is recorded as `failed` with reason `terminated`.
pub async fn run_worker(
    spec: &WorkerSpec,
    engine: &dyn ScanEngine,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
) -> WorkerExit {
    let store = StatusStore::new(&spec.job_root);
    if let Err(e) = store.require_job_dir(&spec.job_id) {
        log::error!("Cannot report status for unit {}: {}", spec.unit_index, e);
        return WorkerExit::StatusWriteFailed;
    }

    let reporter = Arc::new(StatusReporter::new(
        store.clone(),
        spec.job_id.clone(),
        spec.unit_index,
        spec.name.clone(),
        clock,
    ));
    if let Err(e) = reporter.flush() {
        log::error!("Initial status write failed for unit {}: {}", spec.unit_index, e);
        return WorkerExit::StatusWriteFailed;
    }

    let heartbeat_stop = CancellationToken::new();
    let heartbeat = reporter.spawn_heartbeat(spec.cadence, heartbeat_stop.clone());

    let request = ScanRequest {
        name: spec.name.clone(),
        locator: spec.locator.clone(),
    };
    let progress = ScanProgress::new(Arc::clone(&reporter));

    let outcome = tokio::select! {
        biased;

        _ = shutdown.cancelled() => None,
        result = engine.scan(&request, &progress) => Some(result),
    };

    heartbeat_stop.cancel();
    if let Err(e) = heartbeat.await {
        log::debug!("Heartbeat task ended abnormally: {}", e);
    }

    let (exit, written) = match outcome {
        None => {
            log::warn!("Unit {} ({}) terminated", spec.unit_index, spec.name);
            (
                WorkerExit::Terminated,
                reporter.fail(FailureReason::Terminated, "Worker terminated by signal"),
            )
        }
        Some(Err(e)) => {
            log::error!("Scan of {} failed: {}", spec.name, e);
            (
                WorkerExit::Failed,
                reporter.fail(FailureReason::ScanError, e.to_string()),
            )
        }
        Some(Ok(summary)) => match store.write_result(&spec.job_id, spec.unit_index, &summary) {
            Ok(()) => (WorkerExit::Completed, reporter.complete()),
            Err(e) => {
                log::error!("Could not store result for {}: {}", spec.name, e);
                (
                    WorkerExit::Failed,
                    reporter.fail(
                        FailureReason::ScanError,
                        format!("Could not store scan result: {}", e),
                    ),
                )
            }
        },
    };

    match written {
        Ok(()) => exit,
        Err(e) => {
            log::error!("Final status write failed for unit {}: {}", spec.unit_index, e);
            WorkerExit::StatusWriteFailed
        }
    }
}

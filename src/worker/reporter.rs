//! Status Reporter
//!
//! Owns a worker's in-memory [`UnitStatus`] and mirrors it to
//! `unit_<i>.json`. Every phase transition is written immediately; progress
//! updates are only persisted by the heartbeat, so a busy scan costs at most
//! one write per cadence interval.

use crate::core::sync::handle_mutex_poison;
use crate::core::time::Clock;
use crate::status::{FailureReason, Phase, StatusStore, UnitStatus};
use crate::worker::error::{WorkerError, WorkerResult};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct StatusReporter {
    store: StatusStore,
    job_id: String,
    state: Mutex<UnitStatus>,
    clock: Arc<dyn Clock>,
}

impl StatusReporter {
    /// Create a reporter for unit `unit_index`, owned by the current process
    pub fn new(
        store: StatusStore,
        job_id: impl Into<String>,
        unit_index: usize,
        name: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let status = UnitStatus::new(unit_index, name, std::process::id(), clock.utc_now());
        Self {
            store,
            job_id: job_id.into(),
            state: Mutex::new(status),
            clock,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn lock(&self) -> WorkerResult<MutexGuard<'_, UnitStatus>> {
        handle_mutex_poison(self.state.lock(), WorkerError::Lock)
    }

    // Writes happen with the lock held so snapshots reach disk in order
    fn persist(&self, status: &mut UnitStatus) -> WorkerResult<()> {
        status.touch(self.clock.utc_now());
        self.store.write_unit(&self.job_id, status)?;
        Ok(())
    }

    /// Copy of the current in-memory snapshot
    pub fn snapshot(&self) -> WorkerResult<UnitStatus> {
        Ok(self.lock()?.clone())
    }

    pub fn phase(&self) -> WorkerResult<Phase> {
        Ok(self.lock()?.phase)
    }

    /// Write the current snapshot unconditionally
    pub fn flush(&self) -> WorkerResult<()> {
        let mut status = self.lock()?;
        self.persist(&mut status)
    }

    /// Move to `next` and write the new snapshot
    ///
    /// Re-entering the current phase is a no-op; backward moves and moves out
    /// of a terminal phase are rejected.
    pub fn transition(&self, next: Phase) -> WorkerResult<()> {
        let mut status = self.lock()?;
        if status.phase == next {
            return Ok(());
        }
        if !status.phase.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition {
                from: status.phase,
                to: next,
            });
        }

        log::debug!(
            "Unit {} ({}) {} -> {}",
            status.unit_index,
            status.name,
            status.phase,
            next
        );
        status.phase = next;
        if next.is_terminal() {
            status.current_item = None;
        }
        self.persist(&mut status)
    }

    /// Record the number of items the scan will visit
    pub fn set_total(&self, total: u64) -> WorkerResult<()> {
        let mut status = self.lock()?;
        status.progress.total = Some(total);
        status.progress.current.get_or_insert(0);
        Ok(())
    }

    /// Count one more item done; `item` becomes the current item
    pub fn advance(&self, item: Option<String>) -> WorkerResult<()> {
        let mut status = self.lock()?;
        let current = status.progress.current.unwrap_or(0) + 1;
        status.progress.current = Some(current);
        status.current_item = item;
        Ok(())
    }

    /// Mark the unit failed and write it; no-op if already terminal
    pub fn fail(&self, reason: FailureReason, message: impl Into<String>) -> WorkerResult<()> {
        let mut status = self.lock()?;
        if status.is_terminal() {
            return Ok(());
        }
        let now = self.clock.utc_now();
        status.mark_failed(reason, message, now);
        self.persist(&mut status)
    }

    pub fn complete(&self) -> WorkerResult<()> {
        self.transition(Phase::Completed)
    }

    /// Refresh `last_update` and write, unless the unit is terminal
    ///
    /// Returns `Ok(false)` once there is nothing left to report.
    pub fn heartbeat(&self) -> WorkerResult<bool> {
        let mut status = self.lock()?;
        if status.is_terminal() {
            return Ok(false);
        }
        self.persist(&mut status)?;
        Ok(true)
    }

    /// Write a heartbeat every `cadence` until `stop` fires or the unit is terminal
    pub fn spawn_heartbeat(self: &Arc<Self>, cadence: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let reporter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = stop.cancelled() => break,

                    _ = interval.tick() => {
                        match reporter.heartbeat() {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => log::warn!("Heartbeat write failed: {}", e),
                        }
                    }
                }
            }
        })
    }
}

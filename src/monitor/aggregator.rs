//! Aggregator
//!
//! Reads a job directory and merges the unit files into one [`JobView`].
//! Reads are pure: nothing here writes to the store. The spawner feeds the
//! view back through [`Aggregator::rollup`] to refresh `master.json`.

use crate::core::time::{SystemClock, Clock};
use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::view::{JobView, UnitCondition, UnitView};
use crate::status::{
    FailureReason, JobState, MasterStatus, Phase, PhaseCounts, Progress, StatusError, StatusStore,
    UnitStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Aggregator {
    store: StatusStore,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(store: StatusStore, stale_after: Duration) -> Self {
        Self::with_clock(store, stale_after, Arc::new(SystemClock))
    }

    pub fn with_clock(store: StatusStore, stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            stale_after,
            clock,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    fn not_found(job_id: &str) -> MonitorError {
        MonitorError::JobNotFound {
            job_id: job_id.to_string(),
        }
    }

    /// Build the current view of `job_id`
    ///
    /// Fails only when the job directory is missing or `master.json` is
    /// corrupt. Problems with individual unit files degrade that unit to
    /// `failed` (`corrupt_status`).
    pub fn get_status(&self, job_id: &str) -> MonitorResult<JobView> {
        let dir = match self.store.job_dir(job_id) {
            Ok(dir) => dir,
            Err(StatusError::InvalidJobId { .. }) => return Err(Self::not_found(job_id)),
            Err(e) => return Err(e.into()),
        };
        if !dir.is_dir() {
            return Err(Self::not_found(job_id));
        }

        let master = match self.store.read_master(job_id) {
            Ok(master) => master,
            Err(StatusError::Corrupt { message, .. }) => {
                return Err(MonitorError::CorruptJob {
                    job_id: job_id.to_string(),
                    message,
                })
            }
            Err(e) if e.is_not_found() => return Err(Self::not_found(job_id)),
            Err(e) => return Err(e.into()),
        };

        let roster: Vec<usize> = match &master {
            Some(master) if master.total_units != master.units.len() => {
                return Err(MonitorError::CorruptJob {
                    job_id: job_id.to_string(),
                    message: format!(
                        "total_units is {} but the roster names {} units",
                        master.total_units,
                        master.units.len()
                    ),
                })
            }
            Some(master) => (0..master.total_units).collect(),
            // No roster yet: only the unit files that actually exist
            None => match self.store.list_unit_indices(job_id) {
                Ok(indices) => indices,
                Err(e) if e.is_not_found() => return Err(Self::not_found(job_id)),
                Err(e) => return Err(e.into()),
            },
        };
        let total_units = roster.len();

        let now = self.clock.utc_now();
        let mut units = Vec::with_capacity(total_units);
        for index in roster {
            let fallback_name = master
                .as_ref()
                .map(|m| m.unit_name(index))
                .unwrap_or_else(|| format!("unit_{}", index));
            let view = match self.store.read_unit(job_id, index) {
                Ok(Some(status)) => self.unit_view(index, status, now),
                Ok(None) => pending_view(index, fallback_name),
                Err(e) => {
                    log::warn!("Unit {} of job {} unreadable: {}", index, job_id, e);
                    corrupt_view(index, fallback_name, &e)
                }
            };
            units.push(view);
        }

        let mut counts = PhaseCounts::default();
        for unit in &units {
            counts.record(unit.phase);
        }
        let stale = units
            .iter()
            .filter(|u| u.condition == UnitCondition::Stale)
            .count();
        let last_update = units.iter().filter_map(|u| u.last_update).max();

        let all_terminal = total_units > 0 && units.iter().all(UnitView::is_terminal);
        let state = match &master {
            None => JobState::Initializing,
            Some(_) if all_terminal && counts.failed > 0 => JobState::Failed,
            Some(_) if all_terminal => JobState::Completed,
            // The spawner gave up on the job even though a unit file is stuck
            Some(master) if master.is_terminal() => master.status,
            Some(_) => JobState::InProgress,
        };

        let started_at = master
            .as_ref()
            .map(|m| m.started_at)
            .or_else(|| units.iter().filter_map(|u| u.last_update).min())
            .unwrap_or(now);
        let completed_at = match &master {
            Some(master) if state.is_terminal() => master.completed_at.or(last_update),
            _ => None,
        };
        let elapsed = (completed_at.unwrap_or(now) - started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        Ok(JobView {
            job_id: job_id.to_string(),
            state,
            total_units,
            counts,
            stale,
            units,
            started_at,
            completed_at,
            elapsed,
            last_update,
        })
    }

    fn is_stale(&self, last_update: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - last_update).to_std() {
            Ok(silence) => silence > self.stale_after,
            // last_update in the future
            Err(_) => false,
        }
    }

    fn unit_view(&self, index: usize, status: UnitStatus, now: DateTime<Utc>) -> UnitView {
        let condition = match status.phase {
            Phase::Completed => UnitCondition::Completed,
            Phase::Failed => UnitCondition::Failed,
            _ if self.is_stale(status.last_update, now) => UnitCondition::Stale,
            Phase::Pending => UnitCondition::Pending,
            _ => UnitCondition::Active,
        };
        UnitView {
            index,
            name: status.name,
            phase: status.phase,
            condition,
            progress: status.progress,
            current_item: status.current_item,
            pid: Some(status.pid),
            last_update: Some(status.last_update),
            errors: status.errors,
            failure_reason: status.failure_reason,
        }
    }

    /// Fold `view` into a new copy of `master`
    ///
    /// Counts and state come from the view; a master that was initializing
    /// becomes `in_progress` until every unit is terminal.
    pub fn rollup(&self, view: &JobView, master: &MasterStatus) -> MasterStatus {
        let now = self.clock.utc_now();
        let mut next = master.clone();
        next.counts = view.counts;
        next.last_aggregation = now.max(master.last_aggregation);
        next.status = if view.state.is_terminal() {
            view.state
        } else {
            JobState::InProgress
        };
        if next.status.is_terminal() && next.completed_at.is_none() {
            next.completed_at = Some(next.last_aggregation);
        }
        next
    }
}

fn pending_view(index: usize, name: String) -> UnitView {
    UnitView {
        index,
        name,
        phase: Phase::Pending,
        condition: UnitCondition::Pending,
        progress: Progress::default(),
        current_item: None,
        pid: None,
        last_update: None,
        errors: Vec::new(),
        failure_reason: None,
    }
}

fn corrupt_view(index: usize, name: String, error: &StatusError) -> UnitView {
    UnitView {
        phase: Phase::Failed,
        condition: UnitCondition::Failed,
        errors: vec![error.to_string()],
        failure_reason: Some(FailureReason::CorruptStatus),
        ..pending_view(index, name)
    }
}

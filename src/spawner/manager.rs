//! Spawner
//!
//! Creates a job's directory, then launches one worker per unit in index
//! order behind a semaphore gate. A background task per job owns the
//! supervisors and is the only writer of `master.json`.

use crate::core::time::{SystemClock, Clock};
use crate::monitor::Aggregator;
use crate::spawner::command::WorkerCommand;
use crate::spawner::error::{SpawnError, SpawnResult};
use crate::spawner::handle::JobHandle;
use crate::spawner::supervisor::{finalize_unit, supervise_unit, Ending, SupervisorContext, UnitOutcome};
use crate::spawner::types::{JobLimits, UnitSpec};
use crate::status::{JobState, MasterStatus, StatusError, StatusStore};
use futures::FutureExt;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Attempts at finding an unused job id before giving up
const JOB_ID_ATTEMPTS: usize = 3;

pub struct Spawner {
    store: StatusStore,
    command: WorkerCommand,
    aggregator: Aggregator,
    cadence: Duration,
    kill_grace: Duration,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl Spawner {
    pub fn new(
        store: StatusStore,
        command: WorkerCommand,
        aggregator: Aggregator,
        cadence: Duration,
        kill_grace: Duration,
    ) -> Self {
        Self {
            store,
            command,
            aggregator,
            cadence,
            kill_grace,
            clock: Arc::new(SystemClock),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Reject job specs that could never run
    pub fn validate(units: &[UnitSpec], limits: &JobLimits) -> SpawnResult<()> {
        if units.is_empty() {
            return Err(SpawnError::invalid("a job needs at least one unit"));
        }
        if limits.concurrency_limit == 0 {
            return Err(SpawnError::invalid("concurrency limit must be at least 1"));
        }
        if limits.unit_timeout.is_zero() {
            return Err(SpawnError::invalid("unit timeout must be greater than zero"));
        }
        for (index, unit) in units.iter().enumerate() {
            if unit.name.trim().is_empty() {
                return Err(SpawnError::invalid(format!("unit {} has an empty name", index)));
            }
            if unit.locator.trim().is_empty() {
                return Err(SpawnError::invalid(format!(
                    "unit {} ({}) has an empty locator",
                    index, unit.name
                )));
            }
        }
        Ok(())
    }

    /// `job-` followed by 16 hex digits of a SHA-256 over time, pid,
    /// a per-spawner sequence number and the unit locators
    pub fn generate_job_id(&self, units: &[UnitSpec]) -> String {
        let nanos = self.clock.utc_now().timestamp_nanos_opt().unwrap_or(0);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        for unit in units {
            hasher.update(unit.locator.as_bytes());
            hasher.update([0u8]);
        }
        let hash_hex = format!("{:x}", hasher.finalize());
        format!("job-{}", &hash_hex[..16])
    }

    fn create_job(&self, units: &[UnitSpec]) -> SpawnResult<String> {
        let mut last_error = None;
        for _ in 0..JOB_ID_ATTEMPTS {
            let job_id = self.generate_job_id(units);
            match self.store.create_job_dir(&job_id) {
                Ok(_) => return Ok(job_id),
                Err(e @ StatusError::JobExists(_)) => last_error = Some(e),
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error
            .map(SpawnError::from)
            .unwrap_or_else(|| SpawnError::invalid("could not allocate a job id")))
    }

    /// Create the job and start launching its workers
    ///
    /// Returns as soon as the directory and the initial `master.json` exist.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, units: Vec<UnitSpec>, limits: JobLimits) -> SpawnResult<JobHandle> {
        Self::validate(&units, &limits)?;

        let job_id = self.create_job(&units)?;
        let master = MasterStatus::initializing(
            job_id.clone(),
            units.iter().map(|u| u.name.clone()).collect(),
            limits.concurrency_limit,
            limits.unit_timeout.as_secs(),
            self.clock.utc_now(),
        );
        if let Err(e) = self.store.write_master(&master) {
            if let Err(cleanup) = self.store.remove_job(&job_id) {
                log::warn!("Could not remove half-created job {}: {}", job_id, cleanup);
            }
            return Err(e.into());
        }

        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(None);
        let live_workers = Arc::new(AtomicUsize::new(0));
        let peak_workers = Arc::new(AtomicUsize::new(0));

        let ctx = Arc::new(SupervisorContext {
            store: self.store.clone(),
            job_root: self.store.root().to_path_buf(),
            job_id: job_id.clone(),
            command: self.command.clone(),
            cadence: self.cadence,
            unit_timeout: limits.unit_timeout,
            kill_grace: self.kill_grace,
            cancel: cancel.clone(),
            live_workers: Arc::clone(&live_workers),
            peak_workers: Arc::clone(&peak_workers),
            clock: Arc::clone(&self.clock),
        });

        log::info!(
            "Submitted job {} ({} units, concurrency {}, timeout {}s)",
            job_id,
            units.len(),
            limits.concurrency_limit,
            limits.unit_timeout.as_secs()
        );
        tokio::spawn(drive_job(
            ctx,
            units,
            limits.concurrency_limit,
            master,
            self.aggregator.clone(),
            finished_tx,
        ));

        Ok(JobHandle::new(
            job_id,
            cancel,
            finished_rx,
            live_workers,
            peak_workers,
        ))
    }
}

/// Supervision loop for one job
async fn drive_job(
    ctx: Arc<SupervisorContext>,
    units: Vec<UnitSpec>,
    concurrency_limit: usize,
    mut master: MasterStatus,
    aggregator: Aggregator,
    finished: watch::Sender<Option<JobState>>,
) {
    let gate = Arc::new(Semaphore::new(concurrency_limit));
    let mut queue: VecDeque<(usize, UnitSpec)> = units.into_iter().enumerate().collect();
    let mut running: JoinSet<(usize, Option<UnitOutcome>)> = JoinSet::new();

    let mut ticker = tokio::time::interval(ctx.cadence);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    while !queue.is_empty() || !running.is_empty() {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled(), if !queue.is_empty() => {
                for (index, unit) in queue.drain(..) {
                    finalize_unit(Arc::clone(&ctx), index, unit.name, Ending::Cancelled, None, String::new()).await;
                }
                publish(&ctx, &aggregator, &mut master).await;
            }

            permit = Arc::clone(&gate).acquire_owned(), if !queue.is_empty() => {
                let Ok(permit) = permit else {
                    log::error!("Concurrency gate of job {} closed", ctx.job_id);
                    break;
                };
                if let Some((index, unit)) = queue.pop_front() {
                    let ctx = Arc::clone(&ctx);
                    running.spawn(async move {
                        let outcome = AssertUnwindSafe(supervise_unit(ctx, index, unit, permit))
                            .catch_unwind()
                            .await
                            .ok();
                        (index, outcome)
                    });
                }
            }

            Some(joined) = running.join_next() => {
                match joined {
                    Ok((index, Some(outcome))) => {
                        log::debug!("Unit {} of job {} settled as {}", index, ctx.job_id, outcome.phase);
                    }
                    Ok((index, None)) => {
                        log::error!("Supervisor of unit {} in job {} panicked", index, ctx.job_id);
                        finalize_unit(
                            Arc::clone(&ctx),
                            index,
                            master.unit_name(index),
                            Ending::WaitFailed("supervisor panicked".to_string()),
                            None,
                            String::new(),
                        )
                        .await;
                    }
                    Err(e) => log::error!("Supervisor task of job {} failed: {}", ctx.job_id, e),
                }
                publish(&ctx, &aggregator, &mut master).await;
            }

            _ = ticker.tick() => publish(&ctx, &aggregator, &mut master).await,
        }
    }

    // Units left behind if the loop broke early
    for (index, unit) in queue.drain(..) {
        finalize_unit(Arc::clone(&ctx), index, unit.name, Ending::Cancelled, None, String::new()).await;
    }

    publish(&ctx, &aggregator, &mut master).await;
    if !master.is_terminal() {
        log::warn!("Job {} ended without every unit terminal", ctx.job_id);
        master.status = JobState::Failed;
        master.completed_at = Some(ctx.clock.utc_now().max(master.last_aggregation));
        let store = ctx.store.clone();
        let final_master = master.clone();
        match tokio::task::spawn_blocking(move || store.write_master(&final_master)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Could not write final status of job {}: {}", ctx.job_id, e),
            Err(e) => log::error!("Final status writer of job {} failed: {}", ctx.job_id, e),
        }
    }

    log::info!(
        "Job {} {} ({} completed, {} failed)",
        ctx.job_id,
        master.status,
        master.counts.completed,
        master.counts.failed
    );
    // Nobody may be waiting
    let _ = finished.send(Some(master.status));
}

/// Recompute the rollup from the unit files and write `master.json`
///
/// Reads and the fsync'd write run on the blocking pool.
async fn publish(ctx: &SupervisorContext, aggregator: &Aggregator, master: &mut MasterStatus) {
    let job_id = ctx.job_id.clone();
    let store = ctx.store.clone();
    let aggregator = aggregator.clone();
    let previous = master.clone();

    let rolled = tokio::task::spawn_blocking(move || {
        let view = match aggregator.get_status(&job_id) {
            Ok(view) => view,
            Err(e) => {
                log::warn!("Could not aggregate job {}: {}", job_id, e);
                return None;
            }
        };
        let next = aggregator.rollup(&view, &previous);
        match store.write_master(&next) {
            Ok(()) => Some(next),
            Err(e) => {
                log::warn!("Could not update master status of job {}: {}", job_id, e);
                None
            }
        }
    })
    .await;

    match rolled {
        Ok(Some(next)) => *master = next,
        Ok(None) => {}
        Err(e) => log::error!("Rollup of job {} failed: {}", ctx.job_id, e),
    }
}

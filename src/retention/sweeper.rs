//! Retention Sweeper
//!
//! Periodically deletes job directories that finished longer ago than the
//! retention window. A job is only ever deleted once it is terminal and no
//! longer tracked as active by its owner.

use crate::core::time::{SystemClock, Clock};
use crate::monitor::{Aggregator, MonitorError};
use crate::retention::error::SweepError;
use crate::status::StatusStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default interval between sweeps (1 hour)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Default retention window (24 hours)
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Jobs the sweeper must leave alone
pub trait ActiveJobs: Send + Sync {
    fn is_active(&self, job_id: &str) -> bool;

    /// Called after a job's directory has been removed
    fn release(&self, _job_id: &str) {}
}

/// For sweepers running without an owning orchestrator
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActiveJobs;

impl ActiveJobs for NoActiveJobs {
    fn is_active(&self, _job_id: &str) -> bool {
        false
    }
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    /// Ids of removed jobs, including ones that vanished mid-sweep
    pub removed: Vec<String>,
    pub retained: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct RetentionSweeper {
    store: StatusStore,
    aggregator: Aggregator,
    retention: Duration,
    interval: Duration,
    active: Arc<dyn ActiveJobs>,
    clock: Arc<dyn Clock>,
}

enum Verdict {
    Keep,
    Remove,
    Vanished,
}

impl RetentionSweeper {
    pub fn new(store: StatusStore, aggregator: Aggregator, active: Arc<dyn ActiveJobs>) -> Self {
        Self {
            store,
            aggregator,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            active,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the job became terminal, or `None` while it is still running
    fn finished_at(&self, job_id: &str) -> Result<Option<DateTime<Utc>>, MonitorError> {
        match self.store.read_master(job_id) {
            Ok(Some(master)) if master.is_terminal() => {
                return Ok(Some(master.completed_at.unwrap_or(master.last_aggregation)));
            }
            Ok(_) => {}
            Err(e) => log::debug!("Master status of {} unreadable: {}", job_id, e),
        }

        // The spawner never finished the rollup; trust the unit files
        let view = self.aggregator.get_status(job_id)?;
        if !view.is_terminal() {
            return Ok(None);
        }
        Ok(Some(
            view.completed_at
                .or(view.last_update)
                .unwrap_or(view.started_at),
        ))
    }

    fn judge(&self, job_id: &str, now: DateTime<Utc>) -> Result<Verdict, SweepError> {
        if self.active.is_active(job_id) {
            return Ok(Verdict::Keep);
        }

        let finished_at = match self.finished_at(job_id) {
            Ok(Some(finished_at)) => finished_at,
            Ok(None) => return Ok(Verdict::Keep),
            Err(MonitorError::JobNotFound { .. }) => return Ok(Verdict::Vanished),
            Err(source) => {
                return Err(SweepError::Inspect {
                    job_id: job_id.to_string(),
                    source,
                })
            }
        };

        let age = (now - finished_at).to_std().unwrap_or(Duration::ZERO);
        if age < self.retention {
            Ok(Verdict::Keep)
        } else {
            Ok(Verdict::Remove)
        }
    }

    /// Run one pass over the job root
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let jobs = match self.store.list_jobs() {
            Ok(jobs) => jobs,
            Err(e) => {
                let error = SweepError::from(e);
                log::warn!("{}", error);
                report.errors.push(error.to_string());
                return report;
            }
        };

        let now = self.clock.utc_now();
        for job_id in jobs {
            report.examined += 1;
            let verdict = match self.judge(&job_id, now) {
                Ok(verdict) => verdict,
                Err(e) => {
                    log::warn!("{}", e);
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            match verdict {
                Verdict::Keep => report.retained += 1,
                Verdict::Vanished => {
                    self.active.release(&job_id);
                    report.removed.push(job_id);
                }
                Verdict::Remove => match self.store.remove_job(&job_id) {
                    Ok(_) => {
                        log::info!("Removed expired job {}", job_id);
                        self.active.release(&job_id);
                        report.removed.push(job_id);
                    }
                    Err(source) => {
                        let error = SweepError::Remove {
                            job_id: job_id.clone(),
                            source,
                        };
                        log::warn!("{}", error);
                        report.errors.push(error.to_string());
                    }
                },
            }
        }

        log::debug!(
            "Sweep examined {} jobs: {} removed, {} retained, {} errors",
            report.examined,
            report.removed.len(),
            report.retained,
            report.errors.len()
        );
        report
    }

    /// Sweep every interval until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        log::info!(
            "Retention sweeper starting (interval {}s, retention {}s)",
            self.interval.as_secs(),
            self.retention.as_secs()
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    log::info!("Retention sweeper shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let sweeper = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                        log::error!("Sweep task failed: {}", e);
                    }
                }
            }
        }
    }
}

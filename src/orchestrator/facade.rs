//! Orchestrator Facade
//!
//! The entry point callers use to submit, query and cancel jobs. Composes the
//! spawner, the aggregator and the retention sweeper, and keeps a registry of
//! the jobs this process is supervising.

use crate::core::sync::handle_mutex_poison;
use crate::monitor::{Aggregator, JobView};
use crate::orchestrator::config::OrchestratorConfig;
use crate::orchestrator::error::{OrchestratorError, OrchestratorResult};
use crate::retention::{ActiveJobs, RetentionSweeper, SweepReport};
use crate::spawner::{JobHandle, JobLimits, Spawner, UnitSpec, WorkerCommand};
use crate::status::{MasterStatus, StatusError, StatusStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Jobs supervised by this process
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl JobRegistry {
    pub fn insert(&self, handle: JobHandle) -> OrchestratorResult<()> {
        let mut jobs = handle_mutex_poison(self.jobs.lock(), OrchestratorError::Lock)?;
        jobs.insert(handle.job_id().to_string(), handle);
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> OrchestratorResult<Option<JobHandle>> {
        let jobs = handle_mutex_poison(self.jobs.lock(), OrchestratorError::Lock)?;
        Ok(jobs.get(job_id).cloned())
    }

    pub fn handles(&self) -> OrchestratorResult<Vec<JobHandle>> {
        let jobs = handle_mutex_poison(self.jobs.lock(), OrchestratorError::Lock)?;
        Ok(jobs.values().cloned().collect())
    }

    /// Ids of registered jobs whose supervision is still running
    pub fn running(&self) -> OrchestratorResult<Vec<String>> {
        let jobs = handle_mutex_poison(self.jobs.lock(), OrchestratorError::Lock)?;
        let mut ids: Vec<String> = jobs
            .values()
            .filter(|h| !h.is_finished())
            .map(|h| h.job_id().to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl ActiveJobs for JobRegistry {
    fn is_active(&self, job_id: &str) -> bool {
        match self.get(job_id) {
            Ok(handle) => handle.map(|h| !h.is_finished()).unwrap_or(false),
            Err(e) => {
                // Err on the side of keeping the directory
                log::warn!("{}", e);
                true
            }
        }
    }

    fn release(&self, job_id: &str) {
        match handle_mutex_poison(self.jobs.lock(), OrchestratorError::Lock) {
            Ok(mut jobs) => {
                jobs.remove(job_id);
            }
            Err(e) => log::warn!("{}", e),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: StatusStore,
    spawner: Spawner,
    aggregator: Aggregator,
    registry: Arc<JobRegistry>,
    sweeper: RetentionSweeper,
    shutdown: CancellationToken,
    sweeper_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build an orchestrator that launches workers with `command`
    ///
    /// Validates the configuration and creates the job root.
    pub fn new(config: OrchestratorConfig, command: WorkerCommand) -> OrchestratorResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.job_root).map_err(|source| StatusError::Io {
            path: config.job_root.clone(),
            source,
        })?;

        let store = StatusStore::new(&config.job_root);
        let aggregator = Aggregator::new(store.clone(), config.stale_after());
        let spawner = Spawner::new(
            store.clone(),
            command,
            aggregator.clone(),
            config.write_cadence,
            config.kill_grace,
        );
        let registry = Arc::new(JobRegistry::default());
        let sweeper = RetentionSweeper::new(
            store.clone(),
            aggregator.clone(),
            Arc::clone(&registry) as Arc<dyn ActiveJobs>,
        )
        .with_retention(config.retention)
        .with_interval(config.sweep_interval);

        log::debug!("Orchestrator using job root {}", config.job_root.display());
        Ok(Self {
            config,
            store,
            spawner,
            aggregator,
            registry,
            sweeper,
            shutdown: CancellationToken::new(),
            sweeper_task: Mutex::new(None),
        })
    }

    /// Orchestrator whose workers are this executable's `worker` subcommand
    pub fn with_current_exe(config: OrchestratorConfig) -> OrchestratorResult<Self> {
        let command = WorkerCommand::current_exe().map_err(OrchestratorError::WorkerExecutable)?;
        Self::new(config, command)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Start the background retention sweeper; later calls do nothing
    pub fn start_sweeper(&self) -> OrchestratorResult<()> {
        let mut task = handle_mutex_poison(self.sweeper_task.lock(), OrchestratorError::Lock)?;
        if task.is_none() && !self.shutdown.is_cancelled() {
            let sweeper = self.sweeper.clone();
            let shutdown = self.shutdown.child_token();
            *task = Some(tokio::spawn(async move { sweeper.run(shutdown).await }));
        }
        Ok(())
    }

    /// Submit a job with the configured limits; returns its id
    pub fn submit(&self, units: Vec<UnitSpec>) -> OrchestratorResult<String> {
        self.submit_with(units, self.config.limits())
    }

    pub fn submit_with(&self, units: Vec<UnitSpec>, limits: JobLimits) -> OrchestratorResult<String> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        let handle = self.spawner.submit(units, limits)?;
        let job_id = handle.job_id().to_string();
        self.registry.insert(handle)?;
        Ok(job_id)
    }

    /// Handle of a job supervised by this process
    pub fn handle(&self, job_id: &str) -> OrchestratorResult<Option<JobHandle>> {
        self.registry.get(job_id)
    }

    /// Full merged view of a job
    pub fn get_status(&self, job_id: &str) -> OrchestratorResult<JobView> {
        Ok(self.aggregator.get_status(job_id)?)
    }

    /// The last rollup written by the spawner; cheaper than [`Self::get_status`]
    pub fn get_summary(&self, job_id: &str) -> OrchestratorResult<MasterStatus> {
        let not_found = || OrchestratorError::JobNotFound {
            job_id: job_id.to_string(),
        };
        match self.store.read_master(job_id) {
            Ok(Some(master)) => Ok(master),
            Ok(None) => Err(not_found()),
            Err(StatusError::InvalidJobId { .. }) => Err(not_found()),
            Err(StatusError::Corrupt { message, .. }) => Err(OrchestratorError::CorruptJob {
                job_id: job_id.to_string(),
                message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a job; idempotent, and a no-op for jobs that already finished
    pub fn cancel(&self, job_id: &str) -> OrchestratorResult<()> {
        match self.registry.get(job_id)? {
            Some(handle) => {
                handle.cancel();
                Ok(())
            }
            None if self.store.job_exists(job_id) => {
                log::debug!("Job {} is not supervised by this process", job_id);
                Ok(())
            }
            None => Err(OrchestratorError::JobNotFound {
                job_id: job_id.to_string(),
            }),
        }
    }

    /// Wait until the job is terminal and return its final view
    ///
    /// Jobs supervised elsewhere are polled every write cadence.
    pub async fn wait(&self, job_id: &str) -> OrchestratorResult<JobView> {
        if let Some(handle) = self.registry.get(job_id)? {
            handle.wait().await;
            return self.get_status(job_id);
        }

        let mut interval = tokio::time::interval(self.config.write_cadence);
        loop {
            interval.tick().await;
            let view = self.get_status(job_id)?;
            if view.is_terminal() {
                return Ok(view);
            }
        }
    }

    /// Run one retention pass right now
    pub fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep_once()
    }

    /// Ids of jobs this process is still supervising
    pub fn active_jobs(&self) -> OrchestratorResult<Vec<String>> {
        self.registry.running()
    }

    /// Stop the sweeper, cancel running jobs and wait for them to settle
    pub async fn shutdown(&self) -> OrchestratorResult<()> {
        self.shutdown.cancel();

        let handles = self.registry.handles()?;
        for handle in &handles {
            if !handle.is_finished() {
                handle.cancel();
            }
        }
        for handle in handles {
            let state = handle.wait().await;
            log::debug!("Job {} settled as {}", handle.job_id(), state);
        }

        let task = handle_mutex_poison(self.sweeper_task.lock(), OrchestratorError::Lock)?.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("Retention sweeper ended abnormally: {}", e);
            }
        }
        log::info!("Orchestrator shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator(temp_dir: &TempDir) -> Orchestrator {
        let config = OrchestratorConfig::with_job_root(temp_dir.path().join("jobs"));
        Orchestrator::new(config, WorkerCommand::new("/bin/true")).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = OrchestratorConfig::with_job_root(temp_dir.path());
        config.concurrency_limit = 0;
        assert!(matches!(
            Orchestrator::new(config, WorkerCommand::new("/bin/true")),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_new_creates_job_root() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp_dir);
        assert!(orchestrator.store().root().is_dir());
    }

    #[tokio::test]
    async fn test_empty_submission_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp_dir);
        assert!(matches!(
            orchestrator.submit(Vec::new()),
            Err(OrchestratorError::InvalidJobSpec { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp_dir);
        assert!(matches!(
            orchestrator.get_status("job-nope"),
            Err(OrchestratorError::JobNotFound { .. })
        ));
        assert!(matches!(
            orchestrator.get_summary("job-nope"),
            Err(OrchestratorError::JobNotFound { .. })
        ));
        assert!(matches!(
            orchestrator.cancel("job-nope"),
            Err(OrchestratorError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_foreign_job_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp_dir);
        orchestrator.store().create_job_dir("job-elsewhere").unwrap();
        orchestrator.cancel("job-elsewhere").unwrap();
        orchestrator.cancel("job-elsewhere").unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp_dir);
        orchestrator.start_sweeper().unwrap();
        orchestrator.shutdown().await.unwrap();
        assert!(matches!(
            orchestrator.submit(vec![UnitSpec::new("a", "/tmp/a")]),
            Err(OrchestratorError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_registry_releases_finished_jobs_for_sweeping() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = OrchestratorConfig::with_job_root(temp_dir.path().join("jobs"));
        config.retention = Duration::from_millis(1);
        let orchestrator = Orchestrator::new(config, WorkerCommand::new("/bin/true")).unwrap();

        let job_id = orchestrator
            .submit(vec![UnitSpec::new("a", "/tmp/a")])
            .unwrap();
        let view = orchestrator.wait(&job_id).await.unwrap();
        assert!(view.is_terminal());
        assert!(orchestrator.active_jobs().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = orchestrator.sweep_now();
        assert_eq!(report.removed, vec![job_id.clone()]);
        assert!(orchestrator.registry.get(&job_id).unwrap().is_none());
    }
}

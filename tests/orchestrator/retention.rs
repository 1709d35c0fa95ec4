//! Sweeping finished jobs

use crate::common::{script_units, wait_until, TestEnv};
use stackscan::orchestrator::OrchestratorError;
use std::time::Duration;

const COMPLETING_WORKER: &str = "write_status scanning\nwrite_status completed\nexit 0";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweep_removes_expired_jobs_only() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.retention = Duration::from_millis(300);
    let orchestrator = env.script_orchestrator(config, COMPLETING_WORKER);

    let job_id = orchestrator.submit(script_units(2)).unwrap();
    orchestrator.wait(&job_id).await.unwrap();

    let report = orchestrator.sweep_now();
    assert_eq!(report.examined, 1);
    assert!(report.removed.is_empty());
    assert_eq!(report.retained, 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let report = orchestrator.sweep_now();
    assert_eq!(report.removed, vec![job_id.clone()]);
    assert!(report.errors.is_empty());
    assert!(matches!(
        orchestrator.get_status(&job_id),
        Err(OrchestratorError::JobNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_job_survives_sweeps() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.retention = Duration::from_millis(1);
    let orchestrator = env.script_orchestrator(config, "write_status scanning\nexec sleep 30");

    let job_id = orchestrator.submit(script_units(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let report = orchestrator.sweep_now();
    assert_eq!(report.retained, 1);
    assert!(env.store().job_exists(&job_id));

    orchestrator.cancel(&job_id).unwrap();
    orchestrator.wait(&job_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(orchestrator.sweep_now().removed, vec![job_id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_sweeper_reclaims_jobs() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.retention = Duration::from_millis(100);
    config.sweep_interval = Duration::from_millis(100);
    let orchestrator = env.script_orchestrator(config, COMPLETING_WORKER);
    orchestrator.start_sweeper().unwrap();

    let job_id = orchestrator.submit(script_units(1)).unwrap();
    orchestrator.wait(&job_id).await.unwrap();

    let store = env.store();
    assert!(wait_until(|| !store.job_exists(&job_id), Duration::from_secs(5)).await);
    orchestrator.shutdown().await.unwrap();
}

//! Jobs run by real worker processes

use crate::common::TestEnv;
use stackscan::monitor::UnitCondition;
use stackscan::orchestrator::OrchestratorError;
use stackscan::status::{JobState, Phase};
use stackscan::worker::ScanSummary;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_three_repositories_with_two_workers() {
    let env = TestEnv::new();
    let orchestrator = env.binary_orchestrator(env.config());

    let job_id = orchestrator.submit(env.sample_units(3)).unwrap();
    let handle = orchestrator.handle(&job_id).unwrap().unwrap();

    let view = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(view.state, JobState::Completed, "{:#?}", view);
    assert_eq!(view.counts.completed, 3);
    assert_eq!(view.counts.total(), 3);
    assert_eq!(view.completed_names(), vec!["repo0", "repo1", "repo2"]);
    assert!(view.units.iter().all(|u| u.condition == UnitCondition::Completed));
    assert!(handle.peak_workers() <= 2, "peak {}", handle.peak_workers());
    assert_eq!(handle.live_workers(), 0);

    let store = env.store();
    for index in 0..3 {
        let summary: ScanSummary = store.read_result(&job_id, index).unwrap().unwrap();
        assert_eq!(summary.files_scanned as usize, 3 + index + 1);
        assert_eq!(summary.manifests, vec!["Cargo.toml"]);
        assert_eq!(summary.extensions.get("rs").copied(), Some(3 + index as u64));

        let unit = store.read_unit(&job_id, index).unwrap().unwrap();
        assert_eq!(unit.phase, Phase::Completed);
        assert_eq!(unit.progress.current, unit.progress.total);
    }

    let master = orchestrator.get_summary(&job_id).unwrap();
    assert_eq!(master.status, JobState::Completed);
    assert_eq!(master.counts.completed, 3);
    assert!(master.completed_at.is_some());
    assert_eq!(master.units, vec!["repo0", "repo1", "repo2"]);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_locator_fails_only_its_unit() {
    let env = TestEnv::new();
    let orchestrator = env.binary_orchestrator(env.config());

    let mut units = env.sample_units(1);
    units.push(stackscan::spawner::UnitSpec::new(
        "remote",
        "https://example.com/org/remote.git",
    ));
    let job_id = orchestrator.submit(units).unwrap();

    let view = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(view.state, JobState::Failed);
    assert_eq!(view.unit(0).unwrap().phase, Phase::Completed);
    let remote = view.unit(1).unwrap();
    assert_eq!(remote.phase, Phase::Failed);
    assert!(!remote.errors.is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let env = TestEnv::new();
    let orchestrator = env.binary_orchestrator(env.config());
    assert!(matches!(
        orchestrator.get_status("job-0000000000000000"),
        Err(OrchestratorError::JobNotFound { .. })
    ));
    assert!(matches!(
        orchestrator.get_status("../escape"),
        Err(OrchestratorError::JobNotFound { .. })
    ));
}

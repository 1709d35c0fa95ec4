//! Timeouts, killed workers and cancellation

use crate::common::{script_units, wait_until, TestEnv};
use stackscan::spawner::JobLimits;
use stackscan::status::{FailureReason, JobState, Phase};
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hanging_worker_times_out() {
    let env = TestEnv::new();
    let orchestrator = env.script_orchestrator(env.config(), "write_status scanning\nexec sleep 30");

    let started = Instant::now();
    let job_id = orchestrator
        .submit_with(
            script_units(1),
            JobLimits {
                concurrency_limit: 1,
                unit_timeout: Duration::from_secs(1),
            },
        )
        .unwrap();
    let view = orchestrator.wait(&job_id).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(view.state, JobState::Failed);
    let unit = view.unit(0).unwrap();
    assert_eq!(unit.phase, Phase::Failed);
    assert_eq!(unit.failure_reason, Some(FailureReason::Timeout));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_killed_worker_is_crashed_and_sibling_completes() {
    let env = TestEnv::new();
    let body = "write_status scanning\n\
                if [ \"$IDX\" = \"0\" ]; then exec sleep 30; fi\n\
                sleep 0.5\n\
                write_status completed\n\
                exit 0";
    let orchestrator = env.script_orchestrator(env.config(), body);
    let store = env.store();

    let job_id = orchestrator.submit(script_units(2)).unwrap();
    let mut pid = 0;
    let found = wait_until(
        || match store.read_unit(&job_id, 0) {
            Ok(Some(unit)) if unit.phase == Phase::Scanning && unit.pid > 0 => {
                pid = unit.pid;
                true
            }
            _ => false,
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(found, "unit 0 never reported scanning");

    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    assert_eq!(rc, 0);

    let view = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(view.state, JobState::Failed);
    let killed = view.unit(0).unwrap();
    assert_eq!(killed.phase, Phase::Failed);
    assert_eq!(killed.failure_reason, Some(FailureReason::Crashed));
    assert!(killed.errors.iter().any(|e| e.contains("signal 9")), "{:?}", killed.errors);
    assert_eq!(view.unit(1).unwrap().phase, Phase::Completed);
    assert_eq!(view.counts.completed, 1);
    assert_eq!(view.counts.failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_is_idempotent() {
    let env = TestEnv::new();
    let orchestrator = env.script_orchestrator(env.config(), "write_status scanning\nexec sleep 30");
    let store = env.store();

    let job_id = orchestrator.submit(script_units(3)).unwrap();
    let first = store.unit_path(&job_id, 0).unwrap();
    assert!(wait_until(|| first.exists(), Duration::from_secs(5)).await);

    orchestrator.cancel(&job_id).unwrap();
    orchestrator.cancel(&job_id).unwrap();
    let view = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(view.state, JobState::Failed);
    for unit in &view.units {
        assert_eq!(unit.phase, Phase::Failed);
        assert_eq!(unit.failure_reason, Some(FailureReason::Cancelled));
    }

    // Finished jobs accept further cancels without effect
    orchestrator.cancel(&job_id).unwrap();
    let again = orchestrator.get_status(&job_id).unwrap();
    assert_eq!(again.state, JobState::Failed);
    assert_eq!(again.counts, view.counts);
}

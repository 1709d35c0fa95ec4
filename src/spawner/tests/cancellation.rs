//! Job cancellation

use super::{limits, units, wait_for_file, Harness};
use crate::status::{FailureReason, JobState, Phase};
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_running_and_queued_units() {
    let harness = Harness::new();
    let script = harness.script("hang", "write_status scanning\nexec sleep 30");
    let spawner = harness.shell_spawner(&script);

    let handle = spawner
        .submit(units(3), limits(1, Duration::from_secs(60)))
        .unwrap();
    let first_unit = harness.store.unit_path(handle.job_id(), 0).unwrap();
    assert!(wait_for_file(&first_unit, Duration::from_secs(5)).await);

    let started = Instant::now();
    handle.cancel();
    assert_eq!(handle.wait().await, JobState::Failed);
    assert!(started.elapsed() < Duration::from_secs(10));

    for index in 0..3 {
        let unit = harness.store.read_unit(handle.job_id(), index).unwrap().unwrap();
        assert_eq!(unit.phase, Phase::Failed, "unit {}", index);
        assert_eq!(unit.failure_reason, Some(FailureReason::Cancelled));
    }
    // Queued units were never launched
    let queued = harness.store.read_unit(handle.job_id(), 2).unwrap().unwrap();
    assert_eq!(queued.pid, 0);
    assert_eq!(handle.peak_workers(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_is_idempotent_and_safe_after_finish() {
    let harness = Harness::new();
    let script = harness.script("ok", "write_status completed\nexit 0");
    let spawner = harness.shell_spawner(&script);

    let handle = spawner
        .submit(units(1), limits(1, Duration::from_secs(30)))
        .unwrap();
    assert_eq!(handle.wait().await, JobState::Completed);

    handle.cancel();
    handle.cancel();
    assert_eq!(handle.wait().await, JobState::Completed);
    let unit = harness.store.read_unit(handle.job_id(), 0).unwrap().unwrap();
    assert_eq!(unit.phase, Phase::Completed);
}

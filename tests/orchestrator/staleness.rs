//! Workers that stop reporting

use crate::common::{script_units, wait_until, TestEnv};
use stackscan::monitor::UnitCondition;
use stackscan::status::{JobState, Phase};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_worker_is_reported_stale() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.staleness_multiplier = 2;
    let orchestrator = env.script_orchestrator(config, "write_status scanning\nexec sleep 30");

    let job_id = orchestrator.submit(script_units(1)).unwrap();
    let stale = wait_until(
        || {
            orchestrator
                .get_status(&job_id)
                .map(|view| view.stale == 1)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(stale, "unit never became stale");

    let view = orchestrator.get_status(&job_id).unwrap();
    assert_eq!(view.state, JobState::InProgress);
    let unit = view.unit(0).unwrap();
    assert_eq!(unit.phase, Phase::Scanning);
    assert_eq!(unit.condition, UnitCondition::Stale);
    assert_eq!(view.counts.in_progress, 1);

    orchestrator.cancel(&job_id).unwrap();
    let view = orchestrator.wait(&job_id).await.unwrap();
    assert_eq!(view.stale, 0);
    assert_eq!(view.unit(0).unwrap().condition, UnitCondition::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heartbeating_worker_stays_active() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.write_cadence = Duration::from_millis(200);
    config.staleness_multiplier = 10;
    let body = "i=0\n\
                while [ $i -lt 10 ]; do write_status scanning; sleep 0.2; i=$((i+1)); done\n\
                write_status completed\n\
                exit 0";
    let orchestrator = env.script_orchestrator(config, body);

    let job_id = orchestrator.submit(script_units(1)).unwrap();
    let mut saw_active = false;
    let mut saw_stale = false;
    while !orchestrator.get_status(&job_id).unwrap().is_terminal() {
        if let Some(unit) = orchestrator.get_status(&job_id).unwrap().unit(0).cloned() {
            saw_active |= unit.condition == UnitCondition::Active;
            saw_stale |= unit.condition == UnitCondition::Stale;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(saw_active);
    assert!(!saw_stale);
    assert_eq!(
        orchestrator.wait(&job_id).await.unwrap().state,
        JobState::Completed
    );
}

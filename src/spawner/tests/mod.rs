//! Process-level tests for the spawner
//!
//! Workers are small `/bin/sh` scripts that speak the status file protocol
//! directly, so each test controls exactly how its workers behave.

mod cancellation;

use crate::monitor::Aggregator;
use crate::spawner::{JobLimits, Spawner, UnitSpec, WorkerCommand};
use crate::status::StatusStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Shell functions available to every test script
///
/// Arguments arrive as `--job-root R --job-id J --unit-index I --name N ...`.
const SCRIPT_PREAMBLE: &str = r#"#!/bin/sh
ROOT="$2"
JOB="$4"
IDX="$6"
NAME="$8"
write_status() {
    NOW=$(date -u +%Y-%m-%dT%H:%M:%SZ)
    printf '{"unit_index":%s,"name":"%s","phase":"%s","started_at":"%s","last_update":"%s","pid":%s,"errors":[]}' \
        "$IDX" "$NAME" "$1" "$NOW" "$NOW" "$$" > "$ROOT/$JOB/.unit_$IDX.tmp" \
        && mv "$ROOT/$JOB/.unit_$IDX.tmp" "$ROOT/$JOB/unit_$IDX.json"
}
"#;

pub(super) struct Harness {
    pub temp_dir: TempDir,
    pub store: StatusStore,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = StatusStore::new(temp_dir.path().join("jobs"));
        Self { temp_dir, store }
    }

    /// Write a worker script whose body runs after the preamble
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.temp_dir.path().join(format!("{}.sh", name));
        std::fs::write(&path, format!("{}{}\n", SCRIPT_PREAMBLE, body)).unwrap();
        path
    }

    pub fn spawner_for(&self, command: WorkerCommand, kill_grace: Duration) -> Spawner {
        let aggregator = Aggregator::new(self.store.clone(), Duration::from_secs(60));
        Spawner::new(
            self.store.clone(),
            command,
            aggregator,
            Duration::from_millis(100),
            kill_grace,
        )
    }

    pub fn shell_spawner(&self, script: &Path) -> Spawner {
        self.spawner_for(
            WorkerCommand::new("/bin/sh").arg(script.as_os_str()),
            Duration::from_millis(500),
        )
    }
}

pub(super) fn units(count: usize) -> Vec<UnitSpec> {
    (0..count)
        .map(|i| UnitSpec::new(format!("repo{}", i), format!("/srv/repo{}", i)))
        .collect()
}

pub(super) fn limits(concurrency_limit: usize, unit_timeout: Duration) -> JobLimits {
    JobLimits {
        concurrency_limit,
        unit_timeout,
    }
}

/// Poll until `path` exists or `deadline` passes
pub(super) async fn wait_for_file(path: &Path, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    path.exists()
}

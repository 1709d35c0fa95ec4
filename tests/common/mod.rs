//! Common test utilities and helpers
//!
//! Fixtures shared by the integration tests: a temporary job root, sample
//! repositories on disk, and `/bin/sh` workers that speak the status file
//! protocol directly.

#![allow(dead_code)]

use stackscan::orchestrator::{Orchestrator, OrchestratorConfig};
use stackscan::spawner::{UnitSpec, WorkerCommand};
use stackscan::status::StatusStore;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Arguments arrive as `--job-root R --job-id J --unit-index I --name N ...`
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

pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn job_root(&self) -> PathBuf {
        self.temp_dir.path().join("jobs")
    }

    pub fn store(&self) -> StatusStore {
        StatusStore::new(self.job_root())
    }

    /// Fast cadence so tests observe heartbeats and staleness quickly
    pub fn config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::with_job_root(self.job_root());
        config.concurrency_limit = 2;
        config.unit_timeout = Duration::from_secs(30);
        config.write_cadence = Duration::from_millis(100);
        config.kill_grace = Duration::from_millis(500);
        config
    }

    /// Orchestrator whose workers are the real `stackscan worker` binary
    pub fn binary_orchestrator(&self, config: OrchestratorConfig) -> Orchestrator {
        let command = WorkerCommand::new(env!("CARGO_BIN_EXE_stackscan"))
            .arg("worker")
            .env("NO_COLOR", "1");
        Orchestrator::new(config, command).unwrap()
    }

    /// Orchestrator whose workers run `body` after the shell preamble
    pub fn script_orchestrator(&self, config: OrchestratorConfig, body: &str) -> Orchestrator {
        let script = self.temp_dir.path().join("worker.sh");
        std::fs::write(&script, format!("{}{}\n", SCRIPT_PREAMBLE, body)).unwrap();
        Orchestrator::new(config, WorkerCommand::new("/bin/sh").arg(script.as_os_str())).unwrap()
    }

    /// A small repository with a manifest and a few source files
    pub fn sample_repo(&self, name: &str, files: usize) -> PathBuf {
        let repo = self.temp_dir.path().join("repos").join(name);
        std::fs::create_dir_all(repo.join("src")).unwrap();
        std::fs::write(repo.join("Cargo.toml"), "[package]\nname = \"sample\"\n").unwrap();
        for i in 0..files {
            std::fs::write(repo.join("src").join(format!("file{}.rs", i)), "fn f() {}\n").unwrap();
        }
        repo
    }

    pub fn sample_units(&self, count: usize) -> Vec<UnitSpec> {
        (0..count)
            .map(|i| {
                let name = format!("repo{}", i);
                let repo = self.sample_repo(&name, 3 + i);
                UnitSpec::new(name, repo.to_string_lossy())
            })
            .collect()
    }
}

pub fn script_units(count: usize) -> Vec<UnitSpec> {
    (0..count)
        .map(|i| UnitSpec::new(format!("repo{}", i), format!("/srv/repo{}", i)))
        .collect()
}

/// Poll `condition` every 20ms until it holds or `deadline` passes
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}


//! Status file data types
//!
//! Serialised forms of the per-unit status files (`unit_<i>.json`) and the
//! job rollup (`master.json`). Field names are part of the on-disk contract
//! shared with worker processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single work unit
///
/// `Completed` and `Failed` are terminal. Phases are ordered so that a worker
/// can only move forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Cloning,
    Scanning,
    Analyzing,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Whether the unit is doing work (cloning, scanning or analyzing)
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Cloning | Phase::Scanning | Phase::Analyzing)
    }

    fn rank(self) -> u8 {
        match self {
            Phase::Pending => 0,
            Phase::Cloning => 1,
            Phase::Scanning => 2,
            Phase::Analyzing => 3,
            Phase::Completed => 4,
            Phase::Failed => 4,
        }
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    ///
    /// Terminal phases accept nothing. `Failed` is reachable from every
    /// non-terminal phase; every other move must go strictly forward.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Phase::Failed {
            return true;
        }
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Cloning => "cloning",
            Phase::Scanning => "scanning",
            Phase::Analyzing => "analyzing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a unit ended up `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The scanning engine returned an error
    ScanError,
    /// The worker exited non-zero or was killed by a signal
    Crashed,
    /// The per-unit deadline expired and the worker was killed
    Timeout,
    /// The job was cancelled
    Cancelled,
    /// The worker process could not be started
    LaunchFailed,
    /// The worker exited 0 without writing a terminal status
    MissingTerminalStatus,
    /// The worker received a termination signal
    Terminated,
    /// The status file could not be parsed
    CorruptStatus,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::ScanError => "scan_error",
            FailureReason::Crashed => "crashed",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::LaunchFailed => "launch_failed",
            FailureReason::MissingTerminalStatus => "missing_terminal_status",
            FailureReason::Terminated => "terminated",
            FailureReason::CorruptStatus => "corrupt_status",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files-scanned progress; either side may be unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub current: Option<u64>,
}

impl Progress {
    /// Completion ratio in `0.0..=1.0` when both sides are known
    pub fn ratio(&self) -> Option<f64> {
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                Some((current as f64 / total as f64).min(1.0))
            }
            _ => None,
        }
    }
}

/// Snapshot of one work unit, as stored in `unit_<i>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub unit_index: usize,
    pub name: String,
    pub phase: Phase,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub pid: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl UnitStatus {
    /// Create a `pending` snapshot owned by `pid`
    pub fn new(unit_index: usize, name: impl Into<String>, pid: u32, now: DateTime<Utc>) -> Self {
        Self {
            unit_index,
            name: name.into(),
            phase: Phase::Pending,
            progress: Progress::default(),
            current_item: None,
            started_at: now,
            last_update: now,
            pid,
            errors: Vec::new(),
            failure_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Advance `last_update`, never moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_update {
            self.last_update = now;
        }
    }

    /// Mark the snapshot failed, appending `error` to the error list
    pub fn mark_failed(&mut self, reason: FailureReason, error: impl Into<String>, now: DateTime<Utc>) {
        self.phase = Phase::Failed;
        self.failure_reason = Some(reason);
        self.current_item = None;
        let error = error.into();
        if !error.is_empty() {
            self.errors.push(error);
        }
        self.touch(now);
    }
}

/// Job-level state reported in `master.json` and job views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Initializing,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Initializing => "initializing",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase unit counts; always sums to the job's unit total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
}

impl PhaseCounts {
    pub fn total(&self) -> usize {
        self.completed + self.in_progress + self.pending + self.failed
    }

    pub fn record(&mut self, phase: Phase) {
        match phase {
            Phase::Pending => self.pending += 1,
            Phase::Cloning | Phase::Scanning | Phase::Analyzing => self.in_progress += 1,
            Phase::Completed => self.completed += 1,
            Phase::Failed => self.failed += 1,
        }
    }
}

/// Job rollup, as stored in `master.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterStatus {
    pub job_id: String,
    pub total_units: usize,
    pub status: JobState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_aggregation: DateTime<Utc>,
    #[serde(default)]
    pub counts: PhaseCounts,
    /// Unit names in index order
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub concurrency_limit: usize,
    #[serde(default)]
    pub unit_timeout_secs: u64,
    #[serde(default)]
    pub schema_version: u32,
}

impl MasterStatus {
    /// Rollup written at submission, before any worker has run
    pub fn initializing(
        job_id: impl Into<String>,
        units: Vec<String>,
        concurrency_limit: usize,
        unit_timeout_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let total_units = units.len();
        Self {
            job_id: job_id.into(),
            total_units,
            status: JobState::Initializing,
            started_at: now,
            completed_at: None,
            last_aggregation: now,
            counts: PhaseCounts {
                pending: total_units,
                ..PhaseCounts::default()
            },
            units,
            concurrency_limit,
            unit_timeout_secs,
            schema_version: crate::core::version::status_schema_version(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Name of the unit at `index`, falling back to `unit_<index>`
    pub fn unit_name(&self, index: usize) -> String {
        self.units
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("unit_{}", index))
    }
}

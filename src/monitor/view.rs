//! Aggregated job views

use crate::status::{FailureReason, JobState, Phase, PhaseCounts, Progress};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// How a unit looks to an observer, as opposed to what its file says
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCondition {
    /// No status file yet, or written but not started
    Pending,
    /// Working and reporting on time
    Active,
    /// Non-terminal but silent for longer than the staleness threshold
    Stale,
    Completed,
    Failed,
}

impl UnitCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitCondition::Pending => "pending",
            UnitCondition::Active => "active",
            UnitCondition::Stale => "stale",
            UnitCondition::Completed => "completed",
            UnitCondition::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitView {
    pub index: usize,
    pub name: String,
    pub phase: Phase,
    pub condition: UnitCondition,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl UnitView {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// Consistent snapshot of a whole job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub state: JobState,
    pub total_units: usize,
    pub counts: PhaseCounts,
    /// Units currently classified as stale
    pub stale: usize,
    pub units: Vec<UnitView>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Most recent `last_update` across all units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl JobView {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn in_progress_units(&self) -> impl Iterator<Item = &UnitView> {
        self.units.iter().filter(|u| u.phase.is_active())
    }

    pub fn completed_names(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| u.phase == Phase::Completed)
            .map(|u| u.name.as_str())
            .collect()
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &UnitView> {
        self.units.iter().filter(|u| u.phase == Phase::Failed)
    }

    pub fn unit(&self, index: usize) -> Option<&UnitView> {
        self.units.iter().find(|u| u.index == index)
    }
}

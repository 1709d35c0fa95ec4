//! Job submission types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One repository to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    /// Whatever the scanning engine needs to find the repository
    pub locator: String,
}

impl UnitSpec {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Per-job limits fixed at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    /// Workers of this job allowed to run at once
    pub concurrency_limit: usize,
    /// Wall-clock budget for a single worker
    pub unit_timeout: Duration,
}

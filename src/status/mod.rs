//! Status Store Component
//!
//! The per-job directory of JSON status files that serves as the only channel
//! between the orchestrating process and its workers.
//!
//! ```text
//! <job_root>/<job_id>/
//!   master.json      rollup, written by the spawner only
//!   unit_0.json      written by worker 0 (then by the spawner once it exits)
//!   unit_1.json
//!   result_0.json    scan summary left by a successful worker
//! ```
//!
//! Each unit file has exactly one writer at a time, so no locks are taken;
//! atomic replace guarantees readers never observe a partial document.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StatusError, StatusResult};
pub use store::{StatusStore, MASTER_FILE};
pub use types::{FailureReason, JobState, MasterStatus, Phase, PhaseCounts, Progress, UnitStatus};

//! Spawner Component
//!
//! Launches one worker process per unit under a per-job concurrency limit
//! and supervises each for its whole life:
//!
//! - waits for exit and makes sure the unit ends in a terminal phase,
//!   attaching the tail of the worker's stderr when it failed;
//! - enforces the per-unit deadline with SIGTERM, then SIGKILL after a
//!   grace period, signalling the worker's whole process group;
//! - stops launching and terminates running workers when the job is
//!   cancelled.
//!
//! Per-unit problems never surface as errors to the caller; they are
//! recorded in the unit's status file.

pub mod command;
pub mod error;
pub mod handle;
pub mod manager;
pub(crate) mod supervisor;
pub mod types;

pub use command::{WorkerCommand, WorkerInvocation};
pub use error::{SpawnError, SpawnResult};
pub use handle::JobHandle;
pub use manager::Spawner;
pub use supervisor::DIAGNOSTIC_TAIL_BYTES;
pub use types::{JobLimits, UnitSpec};

#[cfg(test)]
mod tests;

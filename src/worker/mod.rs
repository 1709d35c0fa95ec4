//! Worker Component
//!
//! A worker is a short-lived process that scans one repository and owns that
//! unit's status file while it runs. It writes a full snapshot on every phase
//! transition and on a fixed cadence in between, so the orchestrator can
//! tell a slow scan from a dead one.
//!
//! ```text
//! pending -> cloning -> scanning -> analyzing -> completed
//!    \__________\___________\___________\______-> failed
//! ```

pub mod engine;
pub mod error;
pub mod reporter;
pub mod runner;

pub use engine::{DirectoryScanEngine, ScanEngine, ScanProgress, ScanRequest, ScanSummary};
pub use error::{ScanError, WorkerError, WorkerResult};
pub use reporter::StatusReporter;
pub use runner::{run_worker, WorkerExit, WorkerSpec};

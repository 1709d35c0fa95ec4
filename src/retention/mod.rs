//! Retention Sweeper Component
//!
//! Background reclamation of finished job directories.

pub mod error;
pub mod sweeper;

pub use error::SweepError;
pub use sweeper::{
    ActiveJobs, NoActiveJobs, RetentionSweeper, SweepReport, DEFAULT_RETENTION_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

//! Orchestrator Component
//!
//! The facade callers use: submit a job, query it, cancel it, wait for it.
//! Owns the configuration and wires the spawner, the aggregator and the
//! retention sweeper together over one job root.

pub mod config;
pub mod error;
pub mod facade;

pub use config::{ConfigError, OrchestratorConfig};
pub use error::{OrchestratorError, OrchestratorResult};
pub use facade::{JobRegistry, Orchestrator};

//! Orchestrator integration test modules

pub mod end_to_end;
pub mod failures;
pub mod retention;
pub mod staleness;
pub mod store_concurrency;

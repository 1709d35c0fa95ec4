//! Orchestrator integration tests
//!
//! Tests are organized by functionality:
//! - `orchestrator::end_to_end` - real `stackscan worker` processes
//! - `orchestrator::failures` - timeouts, killed workers and cancellation
//! - `orchestrator::staleness` - silent workers surfacing as stale
//! - `orchestrator::retention` - sweeping finished jobs
//! - `orchestrator::store_concurrency` - readers racing an atomic writer

mod common;
mod orchestrator;

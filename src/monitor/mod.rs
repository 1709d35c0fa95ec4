//! Job Monitor Component
//!
//! On-demand aggregation of a job's status files into a single [`JobView`],
//! including staleness detection for workers that stopped reporting.

pub mod aggregator;
pub mod error;
pub mod view;

pub use aggregator::Aggregator;
pub use error::{MonitorError, MonitorResult};
pub use view::{JobView, UnitCondition, UnitView};

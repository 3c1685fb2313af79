//! Execution and resource model
//!
//! Phases and metrics are built once per analysis run, interned behind
//! stable integer ids, and shared read-only (`Arc`) by every later step.

mod metric;
mod phase;

pub use metric::{Metric, MetricId, MetricKind, MetricRegistry};
pub use phase::{ExecutionModel, ExecutionModelBuilder, Phase, PhaseId};

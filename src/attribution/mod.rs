//! Resource attribution engine
//!
//! ```text
//!  PhaseMetricMappingCache ──► ResourceAttributionStep ──► StepResult
//!          │                         │                        │
//!   AttributionRuleProvider   UpstreamProviders        PhaseResult (per leaf)
//!                                    │                        │
//!                        Active/Demand/SampleFactory ──► attribution iterators
//! ```
//!
//! The step only classifies metrics and binds factories. Upstream sources
//! are opened lazily each time an iterator is requested from a
//! [`PhaseResult`], so every pass over a result is independent.

mod blocking;
mod consumable;
pub mod persist;
mod step;

pub use blocking::BlockingMetricAttributionIterator;
pub use consumable::{
    drain, AttributedSlice, ConsumableMetricAttributionIterator,
    ExactConsumableMetricAttributionIterator, ExactShare, LockstepSlice, LockstepSources,
    ProportionalAttributionIterator, SharingFormula, VariableConsumableMetricAttributionIterator,
    VariableShare,
};
pub use persist::{read_result_file, write_result_file};
pub use step::{
    MetricAttributionIterator, PhaseResult, ResourceAttributionStep, StepResult,
    UpstreamProviders,
};

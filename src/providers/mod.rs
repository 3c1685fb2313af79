//! Upstream result providers
//!
//! The attribution engine consumes three upstream analyses through narrow,
//! read-only interfaces:
//!
//! | Provider | Yields per slice |
//! |---|---|
//! | [`ActivePhaseDetection`] | `bool`: is the phase running |
//! | [`DemandEstimation`] | [`ResourceDemand`]: aggregate exact and variable demand |
//! | [`ResourceSampling`] | [`MetricSample`]: observed value and capacity |
//!
//! Each provider opens a fresh single-pass [`TimesliceSource`] over an
//! inclusive range. Providers must be `Send + Sync`; sources are owned by a
//! single consumer.
//!
//! In-memory implementations ([`PeriodActivePhaseDetection`],
//! [`TabulatedDemandEstimation`], [`TabulatedSampling`]) back the CLI and
//! the tests.

mod active;
mod demand;
mod factory;
mod sampling;
mod series;

pub use active::{PeriodActivePhaseDetection, PhaseActiveIterator};
pub use demand::{ResourceDemand, TabulatedDemandEstimation};
pub use factory::{ActiveFactory, DemandFactory, SampleFactory, SourceFactory};
pub use sampling::{MetricSample, TabulatedSampling};
pub use series::{DenseSeries, SeriesSource};

use crate::model::{Metric, Phase};
use crate::timeslice::TimesliceRange;

/// A forward-only iterator yielding exactly one item per slice of `range()`
pub trait TimesliceSource: Iterator {
    /// The inclusive range this source was opened over
    fn range(&self) -> TimesliceRange;
}

pub type ActiveSource = Box<dyn TimesliceSource<Item = bool> + Send>;
pub type DemandSource = Box<dyn TimesliceSource<Item = ResourceDemand> + Send>;
pub type SampleSource = Box<dyn TimesliceSource<Item = MetricSample> + Send>;

/// Is a phase active at each time slice
pub trait ActivePhaseDetection: Send + Sync {
    fn active_iterator(&self, phase: &Phase, range: TimesliceRange) -> ActiveSource;
}

/// Aggregate demand for a metric across all phases sharing it
pub trait DemandEstimation: Send + Sync {
    fn demand_iterator(&self, metric: &Metric, range: TimesliceRange) -> DemandSource;
}

/// Observed usage and capacity of a metric
pub trait ResourceSampling: Send + Sync {
    fn sample_iterator(&self, metric: &Metric, range: TimesliceRange) -> SampleSource;
}

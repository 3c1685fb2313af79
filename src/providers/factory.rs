//! Deferred source construction
//!
//! A factory binds a provider, an entity (phase or metric) and a range, and
//! opens a fresh single-pass source every time [`SourceFactory::open`] is
//! called. Building factories performs no upstream work, so the attribution
//! step stays O(phases x metrics); every `open` is an independent pass.

use super::{
    ActivePhaseDetection, ActiveSource, DemandEstimation, DemandSource, ResourceSampling,
    SampleSource,
};
use crate::model::{Metric, Phase};
use crate::timeslice::TimesliceRange;
use std::fmt;
use std::sync::Arc;

/// Opens fresh sources over a fixed range
pub trait SourceFactory: Send + Sync {
    type Source;

    /// The range every opened source covers
    fn range(&self) -> TimesliceRange;

    fn open(&self) -> Self::Source;
}

/// Opens active-phase sources for one phase
#[derive(Clone)]
pub struct ActiveFactory {
    provider: Arc<dyn ActivePhaseDetection>,
    phase: Arc<Phase>,
    range: TimesliceRange,
}

impl ActiveFactory {
    pub fn new(provider: Arc<dyn ActivePhaseDetection>, phase: Arc<Phase>) -> Self {
        let range = phase.span();
        Self {
            provider,
            phase,
            range,
        }
    }
}

impl SourceFactory for ActiveFactory {
    type Source = ActiveSource;

    fn range(&self) -> TimesliceRange {
        self.range
    }

    fn open(&self) -> ActiveSource {
        self.provider.active_iterator(&self.phase, self.range)
    }
}

impl fmt::Debug for ActiveFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveFactory")
            .field("phase", &self.phase.path())
            .field("range", &self.range)
            .finish()
    }
}

/// Opens demand sources for one metric over a phase's span
#[derive(Clone)]
pub struct DemandFactory {
    provider: Arc<dyn DemandEstimation>,
    metric: Arc<Metric>,
    range: TimesliceRange,
}

impl DemandFactory {
    pub fn new(
        provider: Arc<dyn DemandEstimation>,
        metric: Arc<Metric>,
        range: TimesliceRange,
    ) -> Self {
        Self {
            provider,
            metric,
            range,
        }
    }

    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }
}

impl SourceFactory for DemandFactory {
    type Source = DemandSource;

    fn range(&self) -> TimesliceRange {
        self.range
    }

    fn open(&self) -> DemandSource {
        self.provider.demand_iterator(&self.metric, self.range)
    }
}

impl fmt::Debug for DemandFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandFactory")
            .field("metric", &self.metric.path())
            .field("range", &self.range)
            .finish()
    }
}

/// Opens sample sources for one metric over a phase's span
#[derive(Clone)]
pub struct SampleFactory {
    provider: Arc<dyn ResourceSampling>,
    metric: Arc<Metric>,
    range: TimesliceRange,
}

impl SampleFactory {
    pub fn new(
        provider: Arc<dyn ResourceSampling>,
        metric: Arc<Metric>,
        range: TimesliceRange,
    ) -> Self {
        Self {
            provider,
            metric,
            range,
        }
    }

    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }
}

impl SourceFactory for SampleFactory {
    type Source = SampleSource;

    fn range(&self) -> TimesliceRange {
        self.range
    }

    fn open(&self) -> SampleSource {
        self.provider.sample_iterator(&self.metric, self.range)
    }
}

impl fmt::Debug for SampleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleFactory")
            .field("metric", &self.metric.path())
            .field("range", &self.range)
            .finish()
    }
}

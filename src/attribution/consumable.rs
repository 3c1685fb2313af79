//! Consumable metric attribution
//!
//! For each slice of a phase's span, combine the phase's active status, the
//! metric's aggregate demand and its observed sample/capacity into the usage
//! attributed to the phase and the capacity available to it.
//!
//! Two sharing formulas exist:
//!
//! ```text
//! Exact (phase reserves `d`):
//!   fraction  = d / total_exact
//!   usage     = min(d, sample   * fraction)
//!   available = min(d, capacity * fraction)
//!
//! Variable (phase has weight `w`):
//!   fraction  = w / total_variable
//!   usage     = max(0, sample   - total_exact) * fraction
//!   available = max(0, capacity - total_exact) * fraction
//! ```
//!
//! Inactive slices attribute `0` usage and `0` capacity. Exact reservations
//! are taken off the top; variable phases share what remains.
//!
//! # Lockstep
//!
//! Demand, sample and active sources are single-pass and must cover the
//! identical range. [`LockstepSources`] owns all three, checks their ranges
//! on construction and advances them together.

use crate::error::{AttributionError, Result};
use crate::model::Metric;
use crate::providers::{
    ActiveSource, DemandSource, MetricSample, ResourceDemand, SampleSource, TimesliceSource,
};
use crate::timeslice::{TimesliceId, TimesliceRange};
use std::sync::Arc;

/// Per-slice attribution protocol shared by all consumable variants
///
/// Before the first [`compute_next`](Self::compute_next) call `timeslice()`
/// is one before the first slice of the phase and both values are `0`.
pub trait ConsumableMetricAttributionIterator: Send {
    /// Slice the current values belong to
    fn timeslice(&self) -> TimesliceId;

    /// Usage attributed to the phase at the current slice, `>= 0`
    fn attributed_usage(&self) -> f64;

    /// Capacity available to the phase at the current slice, `>= 0`
    fn available_capacity(&self) -> f64;

    fn has_next(&self) -> bool;

    /// Advance exactly one slice
    fn compute_next(&mut self) -> Result<()>;
}

/// One slice worth of upstream inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockstepSlice {
    pub timeslice: TimesliceId,
    pub demand: ResourceDemand,
    pub sample: MetricSample,
    pub active: bool,
}

/// Demand, sample and active sources advanced together
pub struct LockstepSources {
    demand: DemandSource,
    sample: SampleSource,
    active: ActiveSource,
    range: TimesliceRange,
    next: TimesliceId,
}

impl LockstepSources {
    /// Fails with [`AttributionError::RangeMismatch`] unless all three
    /// sources cover the same range
    pub fn new(demand: DemandSource, sample: SampleSource, active: ActiveSource) -> Result<Self> {
        let range = demand.range();
        if sample.range() != range || active.range() != range {
            return Err(AttributionError::RangeMismatch {
                demand: range.to_string(),
                sample: sample.range().to_string(),
                active: active.range().to_string(),
            });
        }
        Ok(Self {
            demand,
            sample,
            active,
            range,
            next: range.first(),
        })
    }

    pub fn range(&self) -> TimesliceRange {
        self.range
    }

    pub fn has_next(&self) -> bool {
        self.next <= self.range.last()
    }

    /// Consume exactly one item from each source
    pub fn advance(&mut self) -> Result<LockstepSlice> {
        let timeslice = self.next;
        let exhausted = |source_name| AttributionError::SourceExhausted {
            source_name,
            timeslice,
        };

        if !self.has_next() {
            return Err(exhausted("lockstep"));
        }
        let demand = self.demand.next().ok_or_else(|| exhausted("demand"))?;
        let sample = self.sample.next().ok_or_else(|| exhausted("sample"))?;
        let active = self.active.next().ok_or_else(|| exhausted("active"))?;

        self.next += 1;
        Ok(LockstepSlice {
            timeslice,
            demand,
            sample,
            active,
        })
    }
}

/// Proportional-sharing formula applied to active slices
pub trait SharingFormula: Send {
    /// Returns `(attributed_usage, available_capacity)`
    fn share(&self, metric: &Metric, slice: &LockstepSlice) -> Result<(f64, f64)>;
}

/// Fixed reservation of `exact_demand`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactShare {
    pub exact_demand: f64,
}

impl SharingFormula for ExactShare {
    fn share(&self, metric: &Metric, slice: &LockstepSlice) -> Result<(f64, f64)> {
        if self.exact_demand == 0.0 {
            return Ok((0.0, 0.0));
        }
        let fraction = self.exact_demand / positive_total(metric, "exact", slice.demand.exact, slice)?;
        Ok((
            self.exact_demand.min(slice.sample.value * fraction),
            self.exact_demand.min(slice.sample.capacity * fraction),
        ))
    }
}

/// Share of the remainder weighted by `relative_demand`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableShare {
    pub relative_demand: f64,
}

impl SharingFormula for VariableShare {
    fn share(&self, metric: &Metric, slice: &LockstepSlice) -> Result<(f64, f64)> {
        if self.relative_demand == 0.0 {
            return Ok((0.0, 0.0));
        }
        let total_exact = slice.demand.exact;
        let variable_sample = (slice.sample.value - total_exact).max(0.0);
        let variable_capacity = (slice.sample.capacity - total_exact).max(0.0);
        let fraction =
            self.relative_demand / positive_total(metric, "variable", slice.demand.variable, slice)?;
        Ok((variable_sample * fraction, variable_capacity * fraction))
    }
}

// A phase holding a non-zero demand implies a positive total; anything else
// is an upstream inconsistency, never a silent NaN.
fn positive_total(
    metric: &Metric,
    kind: &'static str,
    total: f64,
    slice: &LockstepSlice,
) -> Result<f64> {
    if total > 0.0 && total.is_finite() {
        Ok(total)
    } else {
        Err(AttributionError::ZeroDemand {
            metric: metric.path().to_string(),
            kind,
            total,
            timeslice: slice.timeslice,
        })
    }
}

/// Attribution iterator parameterized by its sharing formula
pub struct ProportionalAttributionIterator<F> {
    formula: F,
    metric: Arc<Metric>,
    sources: LockstepSources,
    timeslice: TimesliceId,
    attributed_usage: f64,
    available_capacity: f64,
}

pub type ExactConsumableMetricAttributionIterator = ProportionalAttributionIterator<ExactShare>;
pub type VariableConsumableMetricAttributionIterator =
    ProportionalAttributionIterator<VariableShare>;

impl<F: SharingFormula> ProportionalAttributionIterator<F> {
    pub fn new(formula: F, metric: Arc<Metric>, sources: LockstepSources) -> Self {
        let timeslice = sources.range().first() - 1;
        Self {
            formula,
            metric,
            sources,
            timeslice,
            attributed_usage: 0.0,
            available_capacity: 0.0,
        }
    }

    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }
}

impl ExactConsumableMetricAttributionIterator {
    pub fn exact(exact_demand: f64, metric: Arc<Metric>, sources: LockstepSources) -> Self {
        Self::new(ExactShare { exact_demand }, metric, sources)
    }
}

impl VariableConsumableMetricAttributionIterator {
    pub fn variable(relative_demand: f64, metric: Arc<Metric>, sources: LockstepSources) -> Self {
        Self::new(VariableShare { relative_demand }, metric, sources)
    }
}

impl<F: SharingFormula> ConsumableMetricAttributionIterator for ProportionalAttributionIterator<F> {
    fn timeslice(&self) -> TimesliceId {
        self.timeslice
    }

    fn attributed_usage(&self) -> f64 {
        self.attributed_usage
    }

    fn available_capacity(&self) -> f64 {
        self.available_capacity
    }

    fn has_next(&self) -> bool {
        self.sources.has_next()
    }

    fn compute_next(&mut self) -> Result<()> {
        let slice = self.sources.advance()?;

        let (usage, capacity) = if slice.active {
            self.formula.share(&self.metric, &slice)?
        } else {
            (0.0, 0.0)
        };

        self.attributed_usage = usage;
        self.available_capacity = capacity;
        self.timeslice = slice.timeslice;
        Ok(())
    }
}

impl<F> std::fmt::Debug for ProportionalAttributionIterator<F>
where
    F: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProportionalAttributionIterator")
            .field("formula", &self.formula)
            .field("metric", &self.metric.path())
            .field("range", &self.sources.range())
            .field("timeslice", &self.timeslice)
            .finish()
    }
}

/// One attributed slice, as collected by [`drain`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributedSlice {
    pub timeslice: TimesliceId,
    pub attributed_usage: f64,
    pub available_capacity: f64,
}

/// Run an iterator to exhaustion, collecting every slice
pub fn drain(iterator: &mut dyn ConsumableMetricAttributionIterator) -> Result<Vec<AttributedSlice>> {
    let mut slices = Vec::new();
    while iterator.has_next() {
        iterator.compute_next()?;
        slices.push(AttributedSlice {
            timeslice: iterator.timeslice(),
            attributed_usage: iterator.attributed_usage(),
            available_capacity: iterator.available_capacity(),
        });
    }
    Ok(slices)
}

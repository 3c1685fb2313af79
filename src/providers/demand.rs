//! Demand estimation from per-metric demand tables

use super::series::DenseSeries;
use super::{ActivePhaseDetection, DemandEstimation, DemandSource};
use crate::mapping::PhaseMetricMappingCache;
use crate::model::{Metric, MetricId};
use crate::rules::{AttributionRuleProvider, ConsumableAttributionRule};
use crate::timeslice::{TimesliceId, TimesliceRange};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Aggregate demand for one metric at one slice, summed over all phases
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceDemand {
    /// Sum of exact demands of active phases with an `Exact` rule
    pub exact: f64,
    /// Sum of relative weights of active phases with a `Variable` rule
    pub variable: f64,
}

/// Demand estimation backed by precomputed per-metric series
#[derive(Debug, Default)]
pub struct TabulatedDemandEstimation {
    series: HashMap<MetricId, DenseSeries<ResourceDemand>>,
}

impl TabulatedDemandEstimation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the demand series of a metric starting at `start`
    pub fn set_series(&mut self, metric: MetricId, start: TimesliceId, demand: Vec<ResourceDemand>) {
        self.series.insert(metric, DenseSeries::new(start, demand));
    }

    /// Derive demand by summing the consumable rules of every mapped leaf
    /// phase over the slices in which that phase is active
    pub fn derive_from_rules(
        mapping: &PhaseMetricMappingCache,
        rules: &dyn AttributionRuleProvider,
        active: &dyn ActivePhaseDetection,
    ) -> Self {
        let mut estimation = Self::new();

        for metric in mapping.mapped_metrics() {
            if !metric.is_consumable() {
                continue;
            }
            let mut per_slice: BTreeMap<TimesliceId, ResourceDemand> = BTreeMap::new();

            for phase in mapping.phases_for(&metric) {
                let rule = rules.consumable_rule(phase, &metric);
                if rule.is_none() {
                    continue;
                }
                let slices = phase.span().iter();
                for (slice, is_active) in slices.zip(active.active_iterator(phase, phase.span())) {
                    if !is_active {
                        continue;
                    }
                    let entry = per_slice.entry(slice).or_default();
                    match rule {
                        ConsumableAttributionRule::Exact { exact_demand } => {
                            entry.exact += exact_demand
                        }
                        ConsumableAttributionRule::Variable { relative_demand } => {
                            entry.variable += relative_demand
                        }
                        ConsumableAttributionRule::None => {}
                    }
                }
            }

            let (Some((&start, _)), Some((&end, _))) =
                (per_slice.first_key_value(), per_slice.last_key_value())
            else {
                continue;
            };
            let values = (start..=end)
                .map(|t| per_slice.get(&t).copied().unwrap_or_default())
                .collect();
            debug!(metric = %metric.path(), start, end, "derived demand series");
            estimation.set_series(metric.id(), start, values);
        }

        debug!(metrics = estimation.series.len(), "derived demand series from rules");
        estimation
    }
}

impl DemandEstimation for TabulatedDemandEstimation {
    fn demand_iterator(&self, metric: &Metric, range: TimesliceRange) -> DemandSource {
        match self.series.get(&metric.id()) {
            Some(series) => Box::new(series.source(range)),
            None => Box::new(DenseSeries::<ResourceDemand>::new(range.first(), Vec::new()).source(range)),
        }
    }
}

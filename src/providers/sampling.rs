//! Resource sampling from per-metric sample tables

use super::series::DenseSeries;
use super::{ResourceSampling, SampleSource};
use crate::model::{Metric, MetricId};
use crate::timeslice::{TimesliceId, TimesliceRange};
use std::collections::HashMap;

/// Observed usage of a metric at one slice, with the machine's capacity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSample {
    pub value: f64,
    pub capacity: f64,
}

impl MetricSample {
    pub fn new(value: f64, capacity: f64) -> Self {
        Self { value, capacity }
    }
}

/// Sampling backed by per-metric tables
///
/// Slices without data read as a zero sample with zero capacity.
#[derive(Debug, Default)]
pub struct TabulatedSampling {
    series: HashMap<MetricId, DenseSeries<MetricSample>>,
}

impl TabulatedSampling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_series(&mut self, metric: MetricId, start: TimesliceId, samples: Vec<MetricSample>) {
        self.series.insert(metric, DenseSeries::new(start, samples));
    }

    /// Store sample values against a constant capacity
    pub fn set_values(
        &mut self,
        metric: MetricId,
        start: TimesliceId,
        values: &[f64],
        capacity: f64,
    ) {
        let samples = values
            .iter()
            .map(|&value| MetricSample::new(value, capacity))
            .collect();
        self.set_series(metric, start, samples);
    }
}

impl ResourceSampling for TabulatedSampling {
    fn sample_iterator(&self, metric: &Metric, range: TimesliceRange) -> SampleSource {
        match self.series.get(&metric.id()) {
            Some(series) => Box::new(series.source(range)),
            None => Box::new(DenseSeries::<MetricSample>::new(range.first(), Vec::new()).source(range)),
        }
    }
}

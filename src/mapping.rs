//! Leaf phase to metric mapping
//!
//! Precomputed once per run: which metrics are potentially relevant to each
//! leaf phase. Leaf phases without any mapped metric still appear so that the
//! attribution step emits an (empty) result for them.

use crate::error::{AttributionError, Result};
use crate::model::{ExecutionModel, Metric, MetricId, MetricRegistry, Phase, PhaseId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct PhaseMetricMappingCache {
    leaf_phases: Vec<Arc<Phase>>,
    mapping: BTreeMap<PhaseId, Vec<Arc<Metric>>>,
}

impl PhaseMetricMappingCache {
    /// Map every metric of the registry to every leaf phase of the model
    pub fn all_to_all(model: &ExecutionModel, registry: &MetricRegistry) -> Self {
        let metrics: Vec<Arc<Metric>> = registry.metrics().cloned().collect();
        let leaf_phases: Vec<Arc<Phase>> = model.leaf_phases().cloned().collect();
        let mapping = leaf_phases
            .iter()
            .map(|p| (p.id(), metrics.clone()))
            .collect();
        Self {
            leaf_phases,
            mapping,
        }
    }

    /// Build from explicit (leaf phase, metric) pairs
    ///
    /// Every leaf phase of the model is included. Pairs naming a non-leaf
    /// phase, or ids unknown to the model or registry, are rejected.
    pub fn from_pairs(
        model: &ExecutionModel,
        registry: &MetricRegistry,
        pairs: impl IntoIterator<Item = (PhaseId, MetricId)>,
    ) -> Result<Self> {
        let leaf_phases: Vec<Arc<Phase>> = model.leaf_phases().cloned().collect();
        let mut mapping: BTreeMap<PhaseId, Vec<Arc<Metric>>> = BTreeMap::new();

        for (phase_id, metric_id) in pairs {
            let phase = model.phase(phase_id).ok_or_else(|| {
                AttributionError::InvalidModel(format!("unknown {} in mapping", phase_id))
            })?;
            if !phase.is_leaf() {
                return Err(AttributionError::InvalidModel(format!(
                    "phase \"{}\" is not a leaf phase",
                    phase.path()
                )));
            }
            let metric = registry.metric(metric_id).ok_or_else(|| {
                AttributionError::InvalidModel(format!("unknown {} in mapping", metric_id))
            })?;

            let metrics = mapping.entry(phase_id).or_default();
            if !metrics.iter().any(|m| m.id() == metric_id) {
                metrics.push(Arc::clone(metric));
            }
        }

        for metrics in mapping.values_mut() {
            metrics.sort_by_key(|m| m.id());
        }

        Ok(Self {
            leaf_phases,
            mapping,
        })
    }

    pub fn leaf_phases(&self) -> &[Arc<Phase>] {
        &self.leaf_phases
    }

    /// Metrics mapped to `phase`; empty when none were registered
    pub fn metrics_for(&self, phase: &Phase) -> &[Arc<Metric>] {
        self.mapping
            .get(&phase.id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every metric mapped to at least one leaf phase, ordered by id
    pub fn mapped_metrics(&self) -> Vec<Arc<Metric>> {
        let mut metrics: BTreeMap<MetricId, Arc<Metric>> = BTreeMap::new();
        for metric in self.mapping.values().flatten() {
            metrics
                .entry(metric.id())
                .or_insert_with(|| Arc::clone(metric));
        }
        metrics.into_values().collect()
    }

    /// Leaf phases that have `metric` mapped
    pub fn phases_for(&self, metric: &Metric) -> impl Iterator<Item = &Arc<Phase>> + '_ {
        let metric_id = metric.id();
        self.leaf_phases.iter().filter(move |p| {
            self.mapping
                .get(&p.id())
                .is_some_and(|ms| ms.iter().any(|m| m.id() == metric_id))
        })
    }
}

//! Resource metrics
//!
//! A metric is either *blocking* (a machine-wide set of slices during which
//! the resource is unavailable) or *consumable* (sampled usage against a
//! capacity, shareable among phases).

use crate::error::{AttributionError, Result};
use crate::timeslice::TimeslicePeriodList;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Stable identity of a metric within one [`MetricRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(pub u32);

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric#{}", self.0)
    }
}

/// The two metric variants
#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// Unavailable during `blocked` slices
    Blocking { blocked: TimeslicePeriodList },
    /// Sampled value plus capacity per slice
    Consumable,
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Blocking { .. } => "blocking",
            MetricKind::Consumable => "consumable",
        }
    }
}

#[derive(Debug)]
pub struct Metric {
    id: MetricId,
    path: String,
    kind: MetricKind,
}

impl Metric {
    pub fn id(&self) -> MetricId {
        self.id
    }

    /// Slash-separated path, e.g. `/host-1/cpu`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> &MetricKind {
        &self.kind
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.kind, MetricKind::Blocking { .. })
    }

    pub fn is_consumable(&self) -> bool {
        matches!(self.kind, MetricKind::Consumable)
    }

    /// Blocked slices of a blocking metric
    pub fn blocked_timeslices(&self) -> Option<&TimeslicePeriodList> {
        match &self.kind {
            MetricKind::Blocking { blocked } => Some(blocked),
            MetricKind::Consumable => None,
        }
    }

    /// Fail unless this is a blocking metric
    pub fn expect_blocking(&self) -> Result<&TimeslicePeriodList> {
        self.blocked_timeslices()
            .ok_or_else(|| AttributionError::MetricKindMismatch {
                metric: self.path.clone(),
                expected: "blocking",
                actual: self.kind.name(),
            })
    }

    /// Fail unless this is a consumable metric
    pub fn expect_consumable(&self) -> Result<()> {
        if self.is_consumable() {
            Ok(())
        } else {
            Err(AttributionError::MetricKindMismatch {
                metric: self.path.clone(),
                expected: "consumable",
                actual: self.kind.name(),
            })
        }
    }
}

impl PartialEq for Metric {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Metric {}

impl Hash for Metric {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Arena of all metrics known to an analysis run
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: Vec<Arc<Metric>>,
    by_path: HashMap<String, MetricId>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric and return its id
    pub fn register(&mut self, path: impl Into<String>, kind: MetricKind) -> Result<MetricId> {
        let path = path.into();
        if self.by_path.contains_key(&path) {
            return Err(AttributionError::InvalidModel(format!(
                "duplicate metric path \"{}\"",
                path
            )));
        }
        let id = MetricId(u32::try_from(self.metrics.len()).map_err(|_| {
            AttributionError::InvalidModel("too many metrics".to_string())
        })?);
        self.by_path.insert(path.clone(), id);
        self.metrics.push(Arc::new(Metric { id, path, kind }));
        Ok(id)
    }

    pub fn metric(&self, id: MetricId) -> Option<&Arc<Metric>> {
        self.metrics.get(id.0 as usize)
    }

    pub fn metric_by_path(&self, path: &str) -> Option<&Arc<Metric>> {
        self.by_path.get(path).and_then(|id| self.metric(*id))
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

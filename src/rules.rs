//! Attribution rules
//!
//! A rule states, per (phase, metric) pair, whether and how a metric is
//! attributed to a phase:
//!
//! - consumable metrics: not at all, an exact reserved amount, or a share of
//!   the remaining pool proportional to a relative weight;
//! - blocking metrics: not at all, or "applies".
//!
//! Unconfigured pairs resolve to `None`.

use crate::error::{AttributionError, Result};
use crate::model::{Metric, MetricId, Phase, PhaseId};
use fnv::FnvHashMap;
use std::fmt;

/// How a consumable metric is attributed to a phase
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ConsumableAttributionRule {
    /// Not attributed to this phase
    #[default]
    None,
    /// Phase reserves a fixed absolute amount
    Exact { exact_demand: f64 },
    /// Phase shares the remainder, weighted by `relative_demand`
    Variable { relative_demand: f64 },
}

impl ConsumableAttributionRule {
    pub fn exact(exact_demand: f64) -> Result<Self> {
        Ok(Self::Exact {
            exact_demand: validate_demand(exact_demand)?,
        })
    }

    pub fn variable(relative_demand: f64) -> Result<Self> {
        Ok(Self::Variable {
            relative_demand: validate_demand(relative_demand)?,
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for ConsumableAttributionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Exact { exact_demand } => write!(f, "exact {}", exact_demand),
            Self::Variable { relative_demand } => write!(f, "variable {}", relative_demand),
        }
    }
}

/// Whether a blocking metric is attributed to a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockingAttributionRule {
    #[default]
    None,
    Applies,
}

fn validate_demand(demand: f64) -> Result<f64> {
    if demand.is_finite() && demand >= 0.0 {
        Ok(demand)
    } else {
        Err(AttributionError::InvalidDemand(demand))
    }
}

/// Lookup of attribution rules, total over every (phase, metric) pair
pub trait AttributionRuleProvider: Send + Sync {
    fn consumable_rule(&self, phase: &Phase, metric: &Metric) -> ConsumableAttributionRule;

    fn blocking_rule(&self, phase: &Phase, metric: &Metric) -> BlockingAttributionRule;
}

/// In-memory rule table keyed by (phase id, metric id)
#[derive(Debug, Default)]
pub struct RuleTable {
    consumable: FnvHashMap<(PhaseId, MetricId), ConsumableAttributionRule>,
    blocking: FnvHashMap<(PhaseId, MetricId), BlockingAttributionRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a consumable rule; the metric must be consumable
    pub fn set_consumable(
        &mut self,
        phase: &Phase,
        metric: &Metric,
        rule: ConsumableAttributionRule,
    ) -> Result<()> {
        metric.expect_consumable()?;
        self.consumable.insert((phase.id(), metric.id()), rule);
        Ok(())
    }

    /// Configure a blocking rule; the metric must be blocking
    pub fn set_blocking(
        &mut self,
        phase: &Phase,
        metric: &Metric,
        rule: BlockingAttributionRule,
    ) -> Result<()> {
        metric.expect_blocking()?;
        self.blocking.insert((phase.id(), metric.id()), rule);
        Ok(())
    }

    /// Number of configured (phase, metric) pairs
    pub fn len(&self) -> usize {
        self.consumable.len() + self.blocking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttributionRuleProvider for RuleTable {
    fn consumable_rule(&self, phase: &Phase, metric: &Metric) -> ConsumableAttributionRule {
        self.consumable
            .get(&(phase.id(), metric.id()))
            .copied()
            .unwrap_or_default()
    }

    fn blocking_rule(&self, phase: &Phase, metric: &Metric) -> BlockingAttributionRule {
        self.blocking
            .get(&(phase.id(), metric.id()))
            .copied()
            .unwrap_or_default()
    }
}

//! Scenario files
//!
//! A scenario describes a complete attribution run in one TOML or JSON file:
//! the phase hierarchy, the metrics with their samples, the attribution
//! rules and, optionally, an explicit phase-metric mapping. Building a
//! scenario wires the in-memory providers so the engine can run without any
//! upstream pipeline.
//!
//! ```toml
//! [[phases]]
//! path = "/job"
//! first = 0
//! last = 9
//!
//! [[phases]]
//! path = "/job/map"
//! parent = "/job"
//! first = 0
//! last = 4
//! inactive = [2]
//!
//! [[metrics]]
//! path = "/host1/cpu"
//! kind = "consumable"
//! capacity = 8.0
//! samples = [4.0, 6.0, 8.0, 2.0, 1.0]
//!
//! [[rules]]
//! phase = "/job/map"
//! metric = "/host1/cpu"
//! exact = 2.0
//! ```

use crate::attribution::{ResourceAttributionStep, StepResult, UpstreamProviders};
use crate::codec::ModelContext;
use crate::mapping::PhaseMetricMappingCache;
use crate::model::{ExecutionModel, MetricKind, MetricRegistry, PhaseId};
use crate::providers::{PeriodActivePhaseDetection, TabulatedDemandEstimation, TabulatedSampling};
use crate::rules::{BlockingAttributionRule, ConsumableAttributionRule, RuleTable};
use crate::timeslice::{TimesliceId, TimeslicePeriodList, TimesliceRange};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Explicit (phase, metric) pairs; every metric maps to every leaf phase when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<MappingSpec>>,
}

/// A phase; parents must be listed before their children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub first: TimesliceId,
    pub last: TimesliceId,
    /// Slices of the span in which the phase is not active
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inactive: Vec<TimesliceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKindSpec {
    Blocking,
    Consumable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    pub path: String,
    pub kind: MetricKindSpec,
    /// Blocked slices of a blocking metric
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<TimesliceId>,
    /// Constant capacity of a consumable metric
    #[serde(default)]
    pub capacity: f64,
    /// Sample values of a consumable metric, one per slice from `samples_start`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<f64>,
    #[serde(default)]
    pub samples_start: TimesliceId,
}

/// A rule; exactly one of `exact`, `variable` or `applies` must be set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub phase: String,
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingSpec {
    pub phase: String,
    pub metric: String,
}

/// Everything an attribution run needs, built from a [`Scenario`]
#[derive(Debug)]
pub struct BuiltScenario {
    pub model: ExecutionModel,
    pub registry: MetricRegistry,
    pub mapping: PhaseMetricMappingCache,
    pub rules: RuleTable,
    pub providers: UpstreamProviders,
}

impl BuiltScenario {
    /// Identity context for decoding result files written against this scenario
    pub fn context(&self) -> ModelContext<'_> {
        ModelContext::new(&self.model, &self.registry)
    }

    /// Run the attribution step on `workers` threads
    pub fn attribute(&self, workers: usize) -> crate::Result<StepResult> {
        ResourceAttributionStep::execute_parallel(
            &self.mapping,
            &self.rules,
            &self.providers,
            workers,
        )
    }
}

impl Scenario {
    /// Parse a scenario, choosing JSON for `.json` files and TOML otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        };
        scenario.with_context(|| format!("In scenario file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid TOML scenario")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid JSON scenario")
    }

    /// Build the model, registry, mapping, rules and in-memory providers
    pub fn build(&self) -> Result<BuiltScenario> {
        let model = self.build_model()?;
        let (registry, sampling) = self.build_metrics()?;
        let mapping = self.build_mapping(&model, &registry)?;
        let rules = self.build_rules(&model, &registry)?;

        let mut active = PeriodActivePhaseDetection::new();
        for spec in self.phases.iter().filter(|p| !p.inactive.is_empty()) {
            if let Some(phase) = model.phase_by_path(&spec.path) {
                active.set_inactive_slices(phase, spec.inactive.iter().copied());
            }
        }
        let demand = TabulatedDemandEstimation::derive_from_rules(&mapping, &rules, &active);
        let providers = UpstreamProviders::new(Arc::new(active), Arc::new(demand), Arc::new(sampling));

        info!(
            phases = model.len(),
            leaf_phases = mapping.leaf_phases().len(),
            metrics = registry.len(),
            rules = rules.len(),
            "built scenario"
        );

        Ok(BuiltScenario {
            model,
            registry,
            mapping,
            rules,
            providers,
        })
    }

    fn build_model(&self) -> Result<ExecutionModel> {
        let mut builder = ExecutionModel::builder();
        let mut ids: Vec<(&str, PhaseId)> = Vec::with_capacity(self.phases.len());

        for spec in &self.phases {
            let parent = match &spec.parent {
                Some(parent) => Some(
                    ids.iter()
                        .find(|(path, _)| *path == parent.as_str())
                        .map(|(_, id)| *id)
                        .with_context(|| {
                            format!(
                                "Parent \"{}\" of phase \"{}\" must be listed before it",
                                parent, spec.path
                            )
                        })?,
                ),
                None => None,
            };
            let span = TimesliceRange::new(spec.first, spec.last)
                .with_context(|| format!("Phase \"{}\"", spec.path))?;
            let id = builder
                .add_phase(spec.path.clone(), span, parent)
                .with_context(|| format!("Phase \"{}\"", spec.path))?;
            ids.push((&spec.path, id));
        }

        Ok(builder.build())
    }

    fn build_metrics(&self) -> Result<(MetricRegistry, TabulatedSampling)> {
        let mut registry = MetricRegistry::new();
        let mut sampling = TabulatedSampling::new();

        for spec in &self.metrics {
            let kind = match spec.kind {
                MetricKindSpec::Blocking => {
                    if !spec.samples.is_empty() {
                        bail!("Blocking metric \"{}\" cannot have samples", spec.path);
                    }
                    MetricKind::Blocking {
                        blocked: TimeslicePeriodList::from_slices(spec.blocked.iter().copied()),
                    }
                }
                MetricKindSpec::Consumable => {
                    if !spec.blocked.is_empty() {
                        bail!("Consumable metric \"{}\" cannot have blocked slices", spec.path);
                    }
                    if !(spec.capacity.is_finite() && spec.capacity >= 0.0) {
                        bail!("Metric \"{}\" has invalid capacity {}", spec.path, spec.capacity);
                    }
                    if let Some(bad) = spec.samples.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                        bail!("Metric \"{}\" has invalid sample {}", spec.path, bad);
                    }
                    MetricKind::Consumable
                }
            };
            let id = registry
                .register(spec.path.clone(), kind)
                .with_context(|| format!("Metric \"{}\"", spec.path))?;
            if spec.kind == MetricKindSpec::Consumable {
                sampling.set_values(id, spec.samples_start, &spec.samples, spec.capacity);
            }
            debug!(metric = %spec.path, kind = ?spec.kind, samples = spec.samples.len(), "registered metric");
        }

        Ok((registry, sampling))
    }

    fn build_mapping(
        &self,
        model: &ExecutionModel,
        registry: &MetricRegistry,
    ) -> Result<PhaseMetricMappingCache> {
        let Some(pairs) = &self.mapping else {
            return Ok(PhaseMetricMappingCache::all_to_all(model, registry));
        };
        let ids = pairs
            .iter()
            .map(|pair| {
                let phase = model
                    .phase_by_path(&pair.phase)
                    .with_context(|| format!("Unknown phase \"{}\" in mapping", pair.phase))?;
                let metric = registry
                    .metric_by_path(&pair.metric)
                    .with_context(|| format!("Unknown metric \"{}\" in mapping", pair.metric))?;
                Ok((phase.id(), metric.id()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PhaseMetricMappingCache::from_pairs(model, registry, ids)?)
    }

    fn build_rules(&self, model: &ExecutionModel, registry: &MetricRegistry) -> Result<RuleTable> {
        let mut table = RuleTable::new();

        for spec in &self.rules {
            let phase = model
                .phase_by_path(&spec.phase)
                .with_context(|| format!("Unknown phase \"{}\" in rule", spec.phase))?;
            let metric = registry
                .metric_by_path(&spec.metric)
                .with_context(|| format!("Unknown metric \"{}\" in rule", spec.metric))?;
            let describe = || format!("Rule for \"{}\" on \"{}\"", spec.phase, spec.metric);

            match (spec.exact, spec.variable, spec.applies) {
                (Some(exact), None, None) => table
                    .set_consumable(phase, metric, ConsumableAttributionRule::exact(exact)?)
                    .with_context(describe)?,
                (None, Some(weight), None) => table
                    .set_consumable(phase, metric, ConsumableAttributionRule::variable(weight)?)
                    .with_context(describe)?,
                (None, None, Some(applies)) => {
                    let rule = if applies {
                        BlockingAttributionRule::Applies
                    } else {
                        BlockingAttributionRule::None
                    };
                    table
                        .set_blocking(phase, metric, rule)
                        .with_context(describe)?
                }
                _ => bail!(
                    "{} must set exactly one of exact, variable, applies",
                    describe()
                ),
            }
        }

        Ok(table)
    }
}

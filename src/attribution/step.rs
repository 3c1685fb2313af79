//! Resource attribution step
//!
//! For every leaf phase: classify its mapped metrics by rule, and bind each
//! attributed consumable metric to deferred demand/sample factories over the
//! phase's span. No upstream source is opened here; iterators are built on
//! demand by [`PhaseResult`].

use super::blocking::BlockingMetricAttributionIterator;
use super::consumable::{
    ConsumableMetricAttributionIterator, ExactConsumableMetricAttributionIterator,
    LockstepSources, VariableConsumableMetricAttributionIterator,
};
use crate::error::{AttributionError, Result};
use crate::mapping::PhaseMetricMappingCache;
use crate::model::{Metric, MetricId, MetricKind, Phase, PhaseId};
use crate::providers::{
    ActiveFactory, ActivePhaseDetection, ActiveSource, DemandEstimation, DemandFactory,
    ResourceSampling, SampleFactory, SourceFactory,
};
use crate::rules::{AttributionRuleProvider, BlockingAttributionRule, ConsumableAttributionRule};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The three upstream providers an attribution run reads from
#[derive(Clone)]
pub struct UpstreamProviders {
    pub active: Arc<dyn ActivePhaseDetection>,
    pub demand: Arc<dyn DemandEstimation>,
    pub sampling: Arc<dyn ResourceSampling>,
}

impl UpstreamProviders {
    pub fn new(
        active: Arc<dyn ActivePhaseDetection>,
        demand: Arc<dyn DemandEstimation>,
        sampling: Arc<dyn ResourceSampling>,
    ) -> Self {
        Self {
            active,
            demand,
            sampling,
        }
    }
}

impl std::fmt::Debug for UpstreamProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamProviders").finish_non_exhaustive()
    }
}

type MetricSet = BTreeMap<MetricId, Arc<Metric>>;

/// Attribution iterator for either metric kind
pub enum MetricAttributionIterator {
    Blocking(BlockingMetricAttributionIterator),
    Consumable(Box<dyn ConsumableMetricAttributionIterator>),
}

/// Immutable attribution result of one leaf phase
#[derive(Debug)]
pub struct PhaseResult {
    phase: Arc<Phase>,
    blocking_metrics: MetricSet,
    unused_blocking_metrics: MetricSet,
    unused_consumable_metrics: MetricSet,
    rules: BTreeMap<MetricId, ConsumableAttributionRule>,
    demand_factories: BTreeMap<MetricId, DemandFactory>,
    sample_factories: BTreeMap<MetricId, SampleFactory>,
    active_factory: ActiveFactory,
}

impl PhaseResult {
    /// Assemble a phase result, checking every structural invariant
    ///
    /// - rule, demand-factory and sample-factory maps have identical keys
    /// - no stored consumable rule is `None`
    /// - metric kinds match the set they are filed under
    /// - no metric is filed in more than one set
    /// - every factory covers exactly the phase's span
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        phase: Arc<Phase>,
        blocking_metrics: MetricSet,
        unused_blocking_metrics: MetricSet,
        unused_consumable_metrics: MetricSet,
        rules: BTreeMap<MetricId, ConsumableAttributionRule>,
        demand_factories: BTreeMap<MetricId, DemandFactory>,
        sample_factories: BTreeMap<MetricId, SampleFactory>,
        active_factory: ActiveFactory,
    ) -> Result<Self> {
        let violation = |msg: String| {
            Err(AttributionError::InvariantViolation(format!(
                "phase \"{}\": {}",
                phase.path(),
                msg
            )))
        };

        if !rules.keys().eq(demand_factories.keys()) || !rules.keys().eq(sample_factories.keys())
        {
            return violation(
                "attribution rules, demand iterators, and sample iterators must be defined for the same metrics"
                    .to_string(),
            );
        }
        if let Some((id, _)) = rules.iter().find(|(_, rule)| rule.is_none()) {
            return violation(format!("{} is stored with rule None", id));
        }
        for metric in blocking_metrics.values().chain(unused_blocking_metrics.values()) {
            if !metric.is_blocking() {
                return violation(format!("\"{}\" filed as blocking", metric.path()));
            }
        }
        for metric in unused_consumable_metrics
            .values()
            .chain(demand_factories.values().map(DemandFactory::metric))
        {
            if !metric.is_consumable() {
                return violation(format!("\"{}\" filed as consumable", metric.path()));
            }
        }
        let mut seen = BTreeSet::new();
        let all_keys = blocking_metrics
            .keys()
            .chain(unused_blocking_metrics.keys())
            .chain(unused_consumable_metrics.keys())
            .chain(rules.keys());
        for id in all_keys {
            if !seen.insert(*id) {
                return violation(format!("{} is filed in more than one metric set", id));
            }
        }
        let span = phase.span();
        if active_factory.range() != span
            || demand_factories.values().any(|f| f.range() != span)
            || sample_factories.values().any(|f| f.range() != span)
        {
            return violation(format!("iterator factories must cover the phase span {}", span));
        }

        Ok(Self {
            phase,
            blocking_metrics,
            unused_blocking_metrics,
            unused_consumable_metrics,
            rules,
            demand_factories,
            sample_factories,
            active_factory,
        })
    }

    /// Bind rules to fresh factories over `providers`
    ///
    /// Shared by the attribution step and by deserialization, which rebuilds
    /// factories against the loading run's providers.
    pub fn bind(
        phase: Arc<Phase>,
        blocking_metrics: MetricSet,
        unused_blocking_metrics: MetricSet,
        unused_consumable_metrics: MetricSet,
        consumable: BTreeMap<MetricId, (Arc<Metric>, ConsumableAttributionRule)>,
        providers: &UpstreamProviders,
    ) -> Result<Self> {
        let span = phase.span();
        let mut rules = BTreeMap::new();
        let mut demand_factories = BTreeMap::new();
        let mut sample_factories = BTreeMap::new();

        for (id, (metric, rule)) in consumable {
            rules.insert(id, rule);
            demand_factories.insert(
                id,
                DemandFactory::new(Arc::clone(&providers.demand), Arc::clone(&metric), span),
            );
            sample_factories.insert(
                id,
                SampleFactory::new(Arc::clone(&providers.sampling), metric, span),
            );
        }

        let active_factory = ActiveFactory::new(Arc::clone(&providers.active), Arc::clone(&phase));
        Self::new(
            phase,
            blocking_metrics,
            unused_blocking_metrics,
            unused_consumable_metrics,
            rules,
            demand_factories,
            sample_factories,
            active_factory,
        )
    }

    pub fn phase(&self) -> &Arc<Phase> {
        &self.phase
    }

    /// Blocking metrics attributed to the phase
    pub fn blocking_metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.blocking_metrics.values()
    }

    /// Consumable metrics attributed to the phase
    pub fn consumable_metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.demand_factories.values().map(DemandFactory::metric)
    }

    /// Mapped blocking metrics whose rule is `None`
    pub fn unused_blocking_metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.unused_blocking_metrics.values()
    }

    /// Mapped consumable metrics whose rule is `None`
    pub fn unused_consumable_metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.unused_consumable_metrics.values()
    }

    /// All attributed metrics, blocking first
    pub fn metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.blocking_metrics().chain(self.consumable_metrics())
    }

    /// All mapped-but-unused metrics, blocking first
    pub fn unused_metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.unused_blocking_metrics()
            .chain(self.unused_consumable_metrics())
    }

    /// Rule of an attributed consumable metric
    pub fn rule(&self, metric: &Metric) -> Option<ConsumableAttributionRule> {
        self.rules.get(&metric.id()).copied()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&Arc<Metric>, ConsumableAttributionRule)> {
        self.demand_factories
            .iter()
            .filter_map(|(id, f)| self.rules.get(id).map(|r| (f.metric(), *r)))
    }

    pub fn is_attributed(&self, metric: &Metric) -> bool {
        self.blocking_metrics.contains_key(&metric.id()) || self.rules.contains_key(&metric.id())
    }

    /// Blocking iterator for an attributed blocking metric
    pub fn blocking_iterator(&self, metric: &Metric) -> Result<BlockingMetricAttributionIterator> {
        match self.blocking_metrics.get(&metric.id()) {
            Some(metric) => BlockingMetricAttributionIterator::new(&self.phase, metric),
            None => Err(AttributionError::MetricNotFound(metric.path().to_string())),
        }
    }

    /// Fresh consumable iterator for an attributed consumable metric
    ///
    /// Every call opens new upstream sources, so passes are independent.
    pub fn consumable_iterator(
        &self,
        metric: &Metric,
    ) -> Result<Box<dyn ConsumableMetricAttributionIterator>> {
        let id = metric.id();
        let not_found = || AttributionError::MetricNotFound(metric.path().to_string());

        let rule = self.rules.get(&id).copied().ok_or_else(not_found)?;
        let demand = self.demand_factories.get(&id).ok_or_else(not_found)?;
        let sample = self.sample_factories.get(&id).ok_or_else(not_found)?;
        let metric = Arc::clone(demand.metric());

        let open_sources = || {
            LockstepSources::new(demand.open(), sample.open(), self.active_factory.open())
        };

        match rule {
            ConsumableAttributionRule::Exact { exact_demand } => Ok(Box::new(
                ExactConsumableMetricAttributionIterator::exact(exact_demand, metric, open_sources()?),
            )),
            ConsumableAttributionRule::Variable { relative_demand } => Ok(Box::new(
                VariableConsumableMetricAttributionIterator::variable(
                    relative_demand,
                    metric,
                    open_sources()?,
                ),
            )),
            ConsumableAttributionRule::None => Err(AttributionError::InvariantViolation(
                "metrics with rule None should not have results".to_string(),
            )),
        }
    }

    /// Fresh pass over the phase's active status across its span
    pub fn active_iterator(&self) -> ActiveSource {
        self.active_factory.open()
    }

    /// Attribution iterator for any attributed metric
    pub fn iterator(&self, metric: &Metric) -> Result<MetricAttributionIterator> {
        match metric.kind() {
            MetricKind::Blocking { .. } => self
                .blocking_iterator(metric)
                .map(MetricAttributionIterator::Blocking),
            MetricKind::Consumable => self
                .consumable_iterator(metric)
                .map(MetricAttributionIterator::Consumable),
        }
    }
}

/// Attribution results of every leaf phase of a run
#[derive(Debug, Default)]
pub struct StepResult {
    results: BTreeMap<PhaseId, PhaseResult>,
}

impl StepResult {
    pub fn new(results: impl IntoIterator<Item = PhaseResult>) -> Self {
        Self {
            results: results.into_iter().map(|r| (r.phase.id(), r)).collect(),
        }
    }

    /// Result of `phase`; fails for phases outside the mapping cache
    pub fn get(&self, phase: &Phase) -> Result<&PhaseResult> {
        self.results
            .get(&phase.id())
            .ok_or_else(|| AttributionError::PhaseNotFound(phase.path().to_string()))
    }

    /// Phases with a result, in id order
    pub fn phases(&self) -> impl Iterator<Item = &Arc<Phase>> {
        self.results.values().map(PhaseResult::phase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Orchestrates attribution over all leaf phases
pub struct ResourceAttributionStep;

impl ResourceAttributionStep {
    pub fn execute(
        mapping: &PhaseMetricMappingCache,
        rules: &dyn AttributionRuleProvider,
        providers: &UpstreamProviders,
    ) -> Result<StepResult> {
        let results = mapping
            .leaf_phases()
            .iter()
            .map(|phase| create_phase_result(phase, mapping, rules, providers))
            .collect::<Result<Vec<_>>>()?;
        let result = StepResult::new(results);
        log_summary(&result);
        Ok(result)
    }

    /// Same result as [`execute`](Self::execute), computed on `workers` scoped threads
    pub fn execute_parallel(
        mapping: &PhaseMetricMappingCache,
        rules: &dyn AttributionRuleProvider,
        providers: &UpstreamProviders,
        workers: usize,
    ) -> Result<StepResult> {
        let phases = mapping.leaf_phases();
        if workers <= 1 || phases.len() <= 1 {
            return Self::execute(mapping, rules, providers);
        }

        let chunk_size = phases.len().div_ceil(workers);
        let outcome = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = phases
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|phase| create_phase_result(phase, mapping, rules, providers))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(AttributionError::InvariantViolation(
                            "attribution worker panicked".to_string(),
                        ))
                    })
                })
                .collect::<Result<Vec<Vec<PhaseResult>>>>()
        })
        .map_err(|_| {
            AttributionError::InvariantViolation("attribution worker panicked".to_string())
        })??;

        let result = StepResult::new(outcome.into_iter().flatten());
        log_summary(&result);
        Ok(result)
    }
}

fn create_phase_result(
    phase: &Arc<Phase>,
    mapping: &PhaseMetricMappingCache,
    rules: &dyn AttributionRuleProvider,
    providers: &UpstreamProviders,
) -> Result<PhaseResult> {
    let mut blocking = MetricSet::new();
    let mut unused_blocking = MetricSet::new();
    let mut unused_consumable = MetricSet::new();
    let mut consumable = BTreeMap::new();

    for metric in mapping.metrics_for(phase) {
        match metric.kind() {
            MetricKind::Blocking { .. } => match rules.blocking_rule(phase, metric) {
                BlockingAttributionRule::None => {
                    unused_blocking.insert(metric.id(), Arc::clone(metric));
                }
                BlockingAttributionRule::Applies => {
                    blocking.insert(metric.id(), Arc::clone(metric));
                }
            },
            MetricKind::Consumable => match rules.consumable_rule(phase, metric) {
                ConsumableAttributionRule::None => {
                    unused_consumable.insert(metric.id(), Arc::clone(metric));
                }
                rule => {
                    consumable.insert(metric.id(), (Arc::clone(metric), rule));
                }
            },
        }
    }

    debug!(
        phase = phase.path(),
        blocking = blocking.len(),
        consumable = consumable.len(),
        unused = unused_blocking.len() + unused_consumable.len(),
        "classified phase metrics"
    );

    PhaseResult::bind(
        Arc::clone(phase),
        blocking,
        unused_blocking,
        unused_consumable,
        consumable,
        providers,
    )
}

fn log_summary(result: &StepResult) {
    let (blocking, consumable) = result.iter().fold((0, 0), |(b, c), r| {
        (b + r.blocking_metrics.len(), c + r.rules.len())
    });
    info!(
        phases = result.len(),
        blocking, consumable, "resource attribution complete"
    );
}

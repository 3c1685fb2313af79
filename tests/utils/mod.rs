// Shared helpers for attribution integration tests

#![allow(dead_code)]

use phasemeter::attribution::{drain, AttributedSlice, StepResult};
use phasemeter::scenario::{BuiltScenario, Scenario};

/// Build a scenario from inline TOML
pub fn build(toml: &str) -> BuiltScenario {
    Scenario::from_toml_str(toml)
        .expect("scenario parses")
        .build()
        .expect("scenario builds")
}

/// Drain the consumable iterator of `metric` for `phase`
pub fn consumable_slices(
    built: &BuiltScenario,
    result: &StepResult,
    phase: &str,
    metric: &str,
) -> Vec<AttributedSlice> {
    let phase = built.model.phase_by_path(phase).expect("phase exists");
    let metric = built.registry.metric_by_path(metric).expect("metric exists");
    let mut iterator = result
        .get(phase)
        .expect("phase has a result")
        .consumable_iterator(metric)
        .expect("metric is attributed");
    drain(iterator.as_mut()).expect("iterator drains")
}

pub fn usage(slices: &[AttributedSlice]) -> Vec<f64> {
    slices.iter().map(|s| s.attributed_usage).collect()
}

pub fn capacity(slices: &[AttributedSlice]) -> Vec<f64> {
    slices.iter().map(|s| s.available_capacity).collect()
}

/// Metric paths of an iterator of metrics, in iteration order
pub fn paths<'a, M>(metrics: impl Iterator<Item = &'a M>) -> Vec<String>
where
    M: AsRef<phasemeter::model::Metric> + 'a,
{
    metrics.map(|m| m.as_ref().path().to_string()).collect()
}

/// Scenario A: a sole exact claimant
pub const SCENARIO_A: &str = r#"
[[phases]]
path = "/p"
first = 0
last = 2

[[metrics]]
path = "/m"
kind = "consumable"
capacity = 10.0
samples = [4.0, 8.0, 10.0]

[[rules]]
phase = "/p"
metric = "/m"
exact = 2.0
"#;

/// Scenario B: two variable claimants with weights 2 and 4
pub const SCENARIO_B: &str = r#"
[[phases]]
path = "/p"
first = 0
last = 0

[[phases]]
path = "/q"
first = 0
last = 0

[[metrics]]
path = "/m"
kind = "consumable"
capacity = 12.0
samples = [9.0]

[[rules]]
phase = "/p"
metric = "/m"
variable = 2.0

[[rules]]
phase = "/q"
metric = "/m"
variable = 4.0
"#;

/// Scenario C: blocking metric blocked at slices 2 and 3
pub const SCENARIO_C: &str = r#"
[[phases]]
path = "/p"
first = 0
last = 4

[[metrics]]
path = "/gc"
kind = "blocking"
blocked = [2, 3]

[[rules]]
phase = "/p"
metric = "/gc"
applies = true
"#;

/// A mixed job with a composite root, exact and variable sharing, blocking
/// and unused metrics
pub const MIXED: &str = r#"
[[phases]]
path = "/job"
first = 0
last = 7

[[phases]]
path = "/job/load"
parent = "/job"
first = 0
last = 3

[[phases]]
path = "/job/compute"
parent = "/job"
first = 2
last = 7
inactive = [5]

[[phases]]
path = "/job/flush"
parent = "/job"
first = 6
last = 7

[[metrics]]
path = "/node/cpu"
kind = "consumable"
capacity = 8.0
samples = [2.0, 3.0, 8.0, 7.5, 6.0, 1.0, 4.0, 4.0]

[[metrics]]
path = "/node/disk"
kind = "consumable"
capacity = 100.0
samples = [90.0, 80.0, 10.0, 10.0, 0.0, 0.0, 50.0, 60.0]

[[metrics]]
path = "/node/gc"
kind = "blocking"
blocked = [3, 4, 6]

[[rules]]
phase = "/job/load"
metric = "/node/cpu"
exact = 1.0

[[rules]]
phase = "/job/load"
metric = "/node/disk"
variable = 1.0

[[rules]]
phase = "/job/compute"
metric = "/node/cpu"
variable = 3.0

[[rules]]
phase = "/job/compute"
metric = "/node/gc"
applies = true

[[rules]]
phase = "/job/flush"
metric = "/node/cpu"
exact = 0.5

[[rules]]
phase = "/job/flush"
metric = "/node/disk"
variable = 2.0
"#;

//! Property-based tests for the attribution engine
//!
//! Covers the per-slice sharing formulas, inactivity zeroing, the binary
//! primitives and the persisted result format.

mod utils;

use phasemeter::attribution::{
    drain, ConsumableMetricAttributionIterator, LockstepSources, ProportionalAttributionIterator,
    StepResult,
};
use phasemeter::codec::{ByteReader, ByteWriter};
use phasemeter::model::{MetricKind, MetricRegistry};
use phasemeter::providers::{DenseSeries, MetricSample, ResourceDemand};
use phasemeter::timeslice::TimesliceRange;
use proptest::prelude::*;
use std::sync::Arc;

/// One slice of upstream input: (sample, capacity, active)
fn slice_inputs() -> impl Strategy<Value = Vec<(f64, f64, bool)>> {
    prop::collection::vec((0.0f64..100.0, 0.0f64..100.0, any::<bool>()), 1..24)
}

fn sources(
    inputs: &[(f64, f64, bool)],
    demand: ResourceDemand,
) -> LockstepSources {
    let range = TimesliceRange::new(0, inputs.len() as i64 - 1).unwrap();
    let samples: Vec<MetricSample> = inputs
        .iter()
        .map(|&(value, capacity, _)| MetricSample::new(value, capacity))
        .collect();
    let active: Vec<bool> = inputs.iter().map(|&(_, _, active)| active).collect();
    LockstepSources::new(
        Box::new(DenseSeries::new(0, vec![demand; inputs.len()]).source(range)),
        Box::new(DenseSeries::new(0, samples).source(range)),
        Box::new(DenseSeries::new(0, active).source(range)),
    )
    .unwrap()
}

fn consumable_metric() -> Arc<phasemeter::model::Metric> {
    let mut registry = MetricRegistry::new();
    let id = registry.register("/m", MetricKind::Consumable).unwrap();
    Arc::clone(registry.metric(id).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_exact_share_never_exceeds_reservation(
        inputs in slice_inputs(),
        exact in 0.1f64..20.0,
        others in 0.0f64..20.0,
        weights in 0.0f64..5.0,
    ) {
        let demand = ResourceDemand { exact: exact + others, variable: weights };
        let mut iterator = ProportionalAttributionIterator::exact(
            exact,
            consumable_metric(),
            sources(&inputs, demand),
        );
        let slices = drain(&mut iterator).unwrap();

        prop_assert_eq!(slices.len(), inputs.len());
        for (slice, &(value, capacity, active)) in slices.iter().zip(&inputs) {
            prop_assert!(slice.attributed_usage >= 0.0);
            prop_assert!(slice.attributed_usage <= exact + 1e-9);
            prop_assert!(slice.available_capacity <= exact + 1e-9);
            prop_assert!(slice.attributed_usage <= value + 1e-9);
            prop_assert!(slice.available_capacity <= capacity + 1e-9);
            if !active {
                prop_assert_eq!(slice.attributed_usage, 0.0);
                prop_assert_eq!(slice.available_capacity, 0.0);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_variable_shares_split_the_remainder(
        inputs in slice_inputs(),
        weight_a in 0.1f64..10.0,
        weight_b in 0.1f64..10.0,
        exact in 0.0f64..50.0,
    ) {
        let demand = ResourceDemand { exact, variable: weight_a + weight_b };
        let mut a = ProportionalAttributionIterator::variable(
            weight_a,
            consumable_metric(),
            sources(&inputs, demand),
        );
        let mut b = ProportionalAttributionIterator::variable(
            weight_b,
            consumable_metric(),
            sources(&inputs, demand),
        );
        let a = drain(&mut a).unwrap();
        let b = drain(&mut b).unwrap();

        for ((x, y), &(value, capacity, active)) in a.iter().zip(&b).zip(&inputs) {
            prop_assert!(x.attributed_usage >= 0.0 && y.attributed_usage >= 0.0);
            prop_assert!(x.available_capacity >= 0.0 && y.available_capacity >= 0.0);
            if active {
                let remainder = (value - exact).max(0.0);
                let headroom = (capacity - exact).max(0.0);
                prop_assert!((x.attributed_usage + y.attributed_usage - remainder).abs() < 1e-9);
                prop_assert!((x.available_capacity + y.available_capacity - headroom).abs() < 1e-9);
            } else {
                prop_assert_eq!(x.attributed_usage + y.attributed_usage, 0.0);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_zero_weight_attributes_nothing(
        inputs in slice_inputs(),
        variable in 0.0f64..10.0,
    ) {
        // Totals may be zero here; a zero weight never divides by them
        let demand = ResourceDemand { exact: 0.0, variable };
        let mut iterator = ProportionalAttributionIterator::variable(
            0.0,
            consumable_metric(),
            sources(&inputs, demand),
        );
        while iterator.has_next() {
            iterator.compute_next().unwrap();
            prop_assert_eq!(iterator.attributed_usage(), 0.0);
            prop_assert_eq!(iterator.available_capacity(), 0.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_var_u32_round_trip(values in prop::collection::vec(any::<u32>(), 0..32)) {
        let mut writer = ByteWriter::new();
        for &value in &values {
            writer.write_var_u32(value);
        }
        prop_assert!(writer.len() <= values.len() * 5);

        let bytes = writer.into_bytes();
        let mut reader = ByteReader::new(&bytes);
        for &value in &values {
            prop_assert_eq!(reader.read_var_u32().unwrap(), value);
        }
        prop_assert_eq!(reader.remaining(), 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_f64_round_trip_is_bit_exact(value in any::<f64>()) {
        let mut writer = ByteWriter::new();
        writer.write_f64(value);
        prop_assert_eq!(writer.len(), 8);
        let bytes = writer.into_bytes();
        let decoded = ByteReader::new(&bytes).read_f64().unwrap();
        prop_assert_eq!(decoded.to_bits(), value.to_bits());
    }
}

/// Rule choice for one (phase, metric) pair
#[derive(Debug, Clone)]
enum RuleChoice {
    None,
    Exact(f64),
    Variable(f64),
}

fn rule_choice() -> impl Strategy<Value = RuleChoice> {
    prop_oneof![
        Just(RuleChoice::None),
        (0.5f64..4.0).prop_map(RuleChoice::Exact),
        (0.5f64..4.0).prop_map(RuleChoice::Variable),
    ]
}

fn generated_scenario(rules: &[RuleChoice], blocks: &[bool]) -> String {
    let mut toml = String::from(
        r#"
[[phases]]
path = "/a"
first = 0
last = 5

[[phases]]
path = "/b"
first = 2
last = 7
inactive = [4]

[[metrics]]
path = "/cpu"
kind = "consumable"
capacity = 16.0
samples = [3.0, 5.0, 9.0, 12.0, 16.0, 7.0, 2.0, 1.0]

[[metrics]]
path = "/mem"
kind = "consumable"
capacity = 64.0

[[metrics]]
path = "/gc"
kind = "blocking"
blocked = [1, 4, 5]
"#,
    );
    let pairs = [("/a", "/cpu"), ("/a", "/mem"), ("/b", "/cpu"), ("/b", "/mem")];
    for ((phase, metric), rule) in pairs.iter().zip(rules) {
        let body = match rule {
            RuleChoice::None => continue,
            RuleChoice::Exact(d) => format!("exact = {:?}", d),
            RuleChoice::Variable(w) => format!("variable = {:?}", w),
        };
        toml.push_str(&format!(
            "\n[[rules]]\nphase = \"{}\"\nmetric = \"{}\"\n{}\n",
            phase, metric, body
        ));
    }
    for (phase, applies) in ["/a", "/b"].iter().zip(blocks) {
        if *applies {
            toml.push_str(&format!(
                "\n[[rules]]\nphase = \"{}\"\nmetric = \"/gc\"\napplies = true\n",
                phase
            ));
        }
    }
    toml
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_result_set_round_trip(
        rules in prop::collection::vec(rule_choice(), 4),
        blocks in prop::collection::vec(any::<bool>(), 2),
        workers in 1usize..4,
    ) {
        let built = utils::build(&generated_scenario(&rules, &blocks));
        let result = built.attribute(workers).unwrap();
        let bytes = result.to_bytes().unwrap();
        let decoded = StepResult::from_bytes(&bytes, &built.context(), &built.providers).unwrap();

        prop_assert_eq!(decoded.to_bytes().unwrap(), bytes);
        for (a, b) in result.iter().zip(decoded.iter()) {
            prop_assert_eq!(a.phase().id(), b.phase().id());
            prop_assert_eq!(utils::paths(a.metrics()), utils::paths(b.metrics()));
            for (metric, rule) in a.rules() {
                prop_assert_eq!(b.rule(metric), Some(rule));
            }
        }
    }

    #[test]
    fn prop_inactive_and_unattributed_partition(
        rules in prop::collection::vec(rule_choice(), 4),
        blocks in prop::collection::vec(any::<bool>(), 2),
    ) {
        let built = utils::build(&generated_scenario(&rules, &blocks));
        let result = built.attribute(1).unwrap();
        let b = built.model.phase_by_path("/b").unwrap();
        let phase_result = result.get(b).unwrap();

        prop_assert_eq!(
            phase_result.metrics().count() + phase_result.unused_metrics().count(),
            3
        );
        for (metric, _) in phase_result.rules() {
            let mut iterator = phase_result.consumable_iterator(metric).unwrap();
            let slices = drain(iterator.as_mut()).unwrap();
            prop_assert_eq!(slices.len(), 6);
            // Slice 4 is inactive for /b
            prop_assert_eq!(slices[2].timeslice, 4);
            prop_assert_eq!(slices[2].attributed_usage, 0.0);
            prop_assert_eq!(slices[2].available_capacity, 0.0);
        }
    }
}

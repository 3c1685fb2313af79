// Synthetic scenarios shared by the benchmarks

use phasemeter::scenario::{MetricKindSpec, MetricSpec, PhaseSpec, RuleSpec, Scenario};

/// A job of `phases` staggered leaf phases sharing `metrics` consumable
/// metrics and one blocking metric over `slices` time slices
pub fn synthetic_scenario(phases: usize, metrics: usize, slices: i64) -> Scenario {
    let mut scenario = Scenario::default();
    let window = (slices / 2).max(1);

    for p in 0..phases {
        let first = (p as i64 * 7) % (slices - window + 1).max(1);
        scenario.phases.push(PhaseSpec {
            path: format!("/job/phase{p}"),
            parent: None,
            first,
            last: first + window - 1,
            inactive: (first..first + window).filter(|s| s % 11 == p as i64 % 11).collect(),
        });
    }

    for m in 0..metrics {
        scenario.metrics.push(MetricSpec {
            path: format!("/node/res{m}"),
            kind: MetricKindSpec::Consumable,
            blocked: Vec::new(),
            capacity: 100.0,
            samples: (0..slices).map(|s| ((s * 37 + m as i64 * 13) % 100) as f64).collect(),
            samples_start: 0,
        });
        for p in 0..phases {
            let (exact, variable) = if (p + m) % 3 == 0 {
                (Some(1.0 + (p % 4) as f64), None)
            } else {
                (None, Some(1.0 + (m % 5) as f64))
            };
            scenario.rules.push(RuleSpec {
                phase: format!("/job/phase{p}"),
                metric: format!("/node/res{m}"),
                exact,
                variable,
                applies: None,
            });
        }
    }

    scenario.metrics.push(MetricSpec {
        path: "/node/gc".to_string(),
        kind: MetricKindSpec::Blocking,
        blocked: (0..slices).filter(|s| s % 9 < 2).collect(),
        capacity: 0.0,
        samples: Vec::new(),
        samples_start: 0,
    });
    for p in (0..phases).step_by(2) {
        scenario.rules.push(RuleSpec {
            phase: format!("/job/phase{p}"),
            metric: "/node/gc".to_string(),
            exact: None,
            variable: None,
            applies: Some(true),
        });
    }

    scenario
}

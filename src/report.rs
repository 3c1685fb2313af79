//! Attribution reports
//!
//! Drives every iterator of a [`StepResult`] to exhaustion and aggregates the
//! per-slice values into one summary per leaf phase, rendered as a text
//! table, pretty JSON or CSV.

use crate::attribution::{drain, StepResult};
use crate::config::ReportFormat;
use crate::error::Result;
use crate::timeslice::TimesliceId;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Format tag embedded in JSON reports
pub const JSON_FORMAT: &str = "phasemeter-json-v1";

/// Totals of one consumable metric over a phase's span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumableReport {
    pub metric: String,
    /// Rule as written in scenarios, e.g. `exact 2`
    pub rule: String,
    pub attributed_usage: f64,
    pub available_capacity: f64,
}

/// Blocked slice count of one blocking metric over a phase's span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingReport {
    pub metric: String,
    pub blocked_slices: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    pub first: TimesliceId,
    pub last: TimesliceId,
    pub active_slices: u64,
    pub consumable: Vec<ConsumableReport>,
    pub blocking: Vec<BlockingReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unused: Vec<String>,
}

impl PhaseReport {
    fn span_slices(&self) -> i64 {
        self.last - self.first + 1
    }
}

/// Summary of a whole attribution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionReport {
    pub format: String,
    pub phases: Vec<PhaseReport>,
}

impl AttributionReport {
    /// Aggregate every phase result; `include_unused` lists mapped metrics with rule `None`
    pub fn from_step_result(result: &StepResult, include_unused: bool) -> Result<Self> {
        let mut phases = Vec::with_capacity(result.len());

        for phase_result in result.iter() {
            let phase = phase_result.phase();
            let active_slices = phase_result.active_iterator().filter(|active| *active).count();

            let mut consumable = Vec::new();
            for (metric, rule) in phase_result.rules() {
                let mut iterator = phase_result.consumable_iterator(metric)?;
                let slices = drain(iterator.as_mut())?;
                consumable.push(ConsumableReport {
                    metric: metric.path().to_string(),
                    rule: rule.to_string(),
                    attributed_usage: slices.iter().map(|s| s.attributed_usage).sum(),
                    available_capacity: slices.iter().map(|s| s.available_capacity).sum(),
                });
            }

            let mut blocking = Vec::new();
            for metric in phase_result.blocking_metrics() {
                let blocked = phase_result
                    .blocking_iterator(metric)?
                    .filter(|blocked| *blocked)
                    .count();
                blocking.push(BlockingReport {
                    metric: metric.path().to_string(),
                    blocked_slices: blocked as u64,
                });
            }

            let unused = if include_unused {
                phase_result
                    .unused_metrics()
                    .map(|m| m.path().to_string())
                    .collect()
            } else {
                Vec::new()
            };

            phases.push(PhaseReport {
                phase: phase.path().to_string(),
                first: phase.first_timeslice(),
                last: phase.last_timeslice(),
                active_slices: active_slices as u64,
                consumable,
                blocking,
                unused,
            });
        }

        Ok(Self {
            format: JSON_FORMAT.to_string(),
            phases,
        })
    }

    pub fn render(&self, format: ReportFormat, precision: usize) -> serde_json::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text(precision)),
            ReportFormat::Json => self.to_json(),
            ReportFormat::Csv => Ok(self.to_csv()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self, precision: usize) -> String {
        let mut out = String::new();
        if self.phases.is_empty() {
            out.push_str("No leaf phases attributed.\n");
            return out;
        }

        for phase in &self.phases {
            let _ = writeln!(
                out,
                "{} [{}, {}] active {}/{}",
                phase.phase,
                phase.first,
                phase.last,
                phase.active_slices,
                phase.span_slices()
            );
            for c in &phase.consumable {
                let _ = writeln!(
                    out,
                    "  {:<32} {:<16} usage {:>12.prec$}  capacity {:>12.prec$}",
                    c.metric,
                    c.rule,
                    c.attributed_usage,
                    c.available_capacity,
                    prec = precision
                );
            }
            for b in &phase.blocking {
                let _ = writeln!(
                    out,
                    "  {:<32} {:<16} blocked {}/{}",
                    b.metric,
                    "blocking",
                    b.blocked_slices,
                    phase.span_slices()
                );
            }
            if !phase.unused.is_empty() {
                let _ = writeln!(out, "  unused: {}", phase.unused.join(", "));
            }
        }
        out
    }

    /// One row per (phase, metric); unused metrics appear only when collected
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "phase,metric,kind,rule,attributed_usage,available_capacity,blocked_slices,active_slices\n",
        );
        for phase in &self.phases {
            let name = escape_field(&phase.phase);
            for c in &phase.consumable {
                let _ = writeln!(
                    out,
                    "{},{},consumable,{},{},{},,{}",
                    name,
                    escape_field(&c.metric),
                    c.rule,
                    c.attributed_usage,
                    c.available_capacity,
                    phase.active_slices
                );
            }
            for b in &phase.blocking {
                let _ = writeln!(
                    out,
                    "{},{},blocking,applies,,,{},{}",
                    name,
                    escape_field(&b.metric),
                    b.blocked_slices,
                    phase.active_slices
                );
            }
            for metric in &phase.unused {
                let _ = writeln!(
                    out,
                    "{},{},unused,none,,,,{}",
                    name,
                    escape_field(metric),
                    phase.active_slices
                );
            }
        }
        out
    }
}

/// Quote fields containing commas, quotes or newlines
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

//! Binary persistence of attribution results
//!
//! # Result set layout
//!
//! ```text
//! ResultSet            := VarUInt(count) Result*
//! Result               := Phase BlockingMetricSet UnusedBlockingSet UnusedConsumableSet ConsumableEntries
//! BlockingMetricSet    := VarUInt(n) Metric{n}
//! UnusedBlockingSet    := VarUInt(n) Metric{n}
//! UnusedConsumableSet  := VarUInt(n) Metric{n}
//! ConsumableEntries    := VarUInt(n) (Metric Rule){n}
//! Rule                 := Tag(0=None | 1=Exact | 2=Variable) [Double]
//! ```
//!
//! Only rules and metric classification are stored. Iterator factories are
//! rebuilt on load against the providers of the loading run.
//!
//! # File envelope
//!
//! ```text
//! File := "PMAR" Version(u8 = 1) ResultSet SHA-256(ResultSet)
//! ```

use super::step::{PhaseResult, StepResult, UpstreamProviders};
use crate::codec::{ByteReader, ByteWriter, IdentityContext};
use crate::error::{CodecError, Result};
use crate::model::{Metric, MetricId};
use crate::rules::ConsumableAttributionRule;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"PMAR";
pub const FORMAT_VERSION: u8 = 1;
const CHECKSUM_LEN: usize = 32;

const TAG_NONE: u8 = 0;
const TAG_EXACT: u8 = 1;
const TAG_VARIABLE: u8 = 2;

pub fn write_rule(out: &mut ByteWriter, rule: &ConsumableAttributionRule) {
    match rule {
        ConsumableAttributionRule::None => out.write_u8(TAG_NONE),
        ConsumableAttributionRule::Exact { exact_demand } => {
            out.write_u8(TAG_EXACT);
            out.write_f64(*exact_demand);
        }
        ConsumableAttributionRule::Variable { relative_demand } => {
            out.write_u8(TAG_VARIABLE);
            out.write_f64(*relative_demand);
        }
    }
}

pub fn read_rule(input: &mut ByteReader<'_>) -> std::result::Result<ConsumableAttributionRule, CodecError> {
    let offset = input.position();
    let tag = input.read_u8()?;
    let payload = |input: &mut ByteReader<'_>| -> std::result::Result<f64, CodecError> {
        let value = input.read_f64()?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(CodecError::InvalidRule(value))
        }
    };
    match tag {
        TAG_NONE => Ok(ConsumableAttributionRule::None),
        TAG_EXACT => Ok(ConsumableAttributionRule::Exact {
            exact_demand: payload(input)?,
        }),
        TAG_VARIABLE => Ok(ConsumableAttributionRule::Variable {
            relative_demand: payload(input)?,
        }),
        tag => Err(CodecError::UnknownTag { tag, offset }),
    }
}

fn write_metric_set<'a>(
    out: &mut ByteWriter,
    metrics: impl Iterator<Item = &'a Arc<Metric>>,
) -> std::result::Result<(), CodecError> {
    let metrics: Vec<_> = metrics.collect();
    out.write_len(metrics.len())?;
    for metric in metrics {
        out.write_metric(metric);
    }
    Ok(())
}

fn read_metric_set(
    input: &mut ByteReader<'_>,
    ctx: &dyn IdentityContext,
    blocking: bool,
    set: &'static str,
) -> std::result::Result<BTreeMap<MetricId, Arc<Metric>>, CodecError> {
    let n = input.read_len()?;
    let mut metrics = BTreeMap::new();
    for _ in 0..n {
        let metric = check_kind(input.read_metric(ctx)?, blocking)?;
        if metrics.contains_key(&metric.id()) {
            return Err(duplicate(&metric, set));
        }
        metrics.insert(metric.id(), metric);
    }
    Ok(metrics)
}

fn duplicate(metric: &Metric, set: &'static str) -> CodecError {
    CodecError::DuplicateMetric {
        metric: metric.path().to_string(),
        set,
    }
}

fn check_kind(metric: Arc<Metric>, blocking: bool) -> std::result::Result<Arc<Metric>, CodecError> {
    if metric.is_blocking() == blocking {
        return Ok(metric);
    }
    let (expected, actual) = if blocking {
        ("blocking", "consumable")
    } else {
        ("consumable", "blocking")
    };
    Err(CodecError::KindMismatch {
        metric: metric.path().to_string(),
        expected,
        actual,
    })
}

impl PhaseResult {
    pub fn encode(&self, out: &mut ByteWriter) -> std::result::Result<(), CodecError> {
        out.write_phase(self.phase());
        write_metric_set(out, self.blocking_metrics())?;
        write_metric_set(out, self.unused_blocking_metrics())?;
        write_metric_set(out, self.unused_consumable_metrics())?;

        let entries: Vec<_> = self.rules().collect();
        out.write_len(entries.len())?;
        for (metric, rule) in entries {
            out.write_metric(metric);
            write_rule(out, &rule);
        }
        Ok(())
    }

    pub fn decode(
        input: &mut ByteReader<'_>,
        ctx: &dyn IdentityContext,
        providers: &UpstreamProviders,
    ) -> Result<Self> {
        let phase = input.read_phase(ctx)?;
        let blocking = read_metric_set(input, ctx, true, "blocking metrics")?;
        let unused_blocking = read_metric_set(input, ctx, true, "unused blocking metrics")?;
        let unused_consumable = read_metric_set(input, ctx, false, "unused consumable metrics")?;

        let n = input.read_len()?;
        let mut consumable = BTreeMap::new();
        for _ in 0..n {
            let metric = check_kind(input.read_metric(ctx)?, false)?;
            let rule = read_rule(input)?;
            if consumable.contains_key(&metric.id()) {
                return Err(duplicate(&metric, "consumable entries").into());
            }
            consumable.insert(metric.id(), (metric, rule));
        }

        PhaseResult::bind(
            phase,
            blocking,
            unused_blocking,
            unused_consumable,
            consumable,
            providers,
        )
    }
}

impl StepResult {
    pub fn encode(&self, out: &mut ByteWriter) -> std::result::Result<(), CodecError> {
        out.write_len(self.len())?;
        for result in self.iter() {
            result.encode(out)?;
        }
        Ok(())
    }

    pub fn decode(
        input: &mut ByteReader<'_>,
        ctx: &dyn IdentityContext,
        providers: &UpstreamProviders,
    ) -> Result<Self> {
        let n = input.read_len()?;
        let mut results = Vec::with_capacity(n.min(1024));
        let mut seen = BTreeSet::new();
        for _ in 0..n {
            let result = PhaseResult::decode(input, ctx, providers)?;
            if !seen.insert(result.phase().id()) {
                return Err(CodecError::DuplicatePhase(result.phase().path().to_string()).into());
            }
            results.push(result);
        }
        Ok(StepResult::new(results))
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, CodecError> {
        let mut out = ByteWriter::new();
        self.encode(&mut out)?;
        Ok(out.into_bytes())
    }

    /// Decode a complete result set; trailing bytes are an error
    pub fn from_bytes(
        bytes: &[u8],
        ctx: &dyn IdentityContext,
        providers: &UpstreamProviders,
    ) -> Result<Self> {
        let mut input = ByteReader::new(bytes);
        let result = Self::decode(&mut input, ctx, providers)?;
        if input.remaining() > 0 {
            return Err(CodecError::TrailingBytes(input.remaining()).into());
        }
        Ok(result)
    }
}

/// Hex SHA-256 of an encoded result set
pub fn payload_checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Wrap an encoded result set in the versioned, checksummed file envelope
pub fn encode_envelope(payload: &[u8]) -> Vec<u8> {
    let mut out = ByteWriter::new();
    out.write_bytes(MAGIC);
    out.write_u8(FORMAT_VERSION);
    out.write_bytes(payload);
    out.write_bytes(&Sha256::digest(payload));
    out.into_bytes()
}

/// Validate the envelope and return the enclosed result set bytes
pub fn decode_envelope(bytes: &[u8]) -> std::result::Result<&[u8], CodecError> {
    let mut input = ByteReader::new(bytes);
    if input.read_bytes(MAGIC.len()).map_err(|_| CodecError::BadMagic)? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = input.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    if input.remaining() < CHECKSUM_LEN {
        return Err(CodecError::Truncated {
            offset: input.position(),
            needed: CHECKSUM_LEN - input.remaining(),
        });
    }
    let payload = input.read_bytes(input.remaining() - CHECKSUM_LEN)?;
    let stored = input.read_bytes(CHECKSUM_LEN)?;
    let computed = Sha256::digest(payload);
    if computed.as_slice() != stored {
        return Err(CodecError::ChecksumMismatch {
            expected: hex::encode(stored),
            found: hex::encode(computed),
        });
    }
    Ok(payload)
}

/// Persist a result set to `path`
pub fn write_result_file(path: impl AsRef<Path>, result: &StepResult) -> Result<()> {
    let payload = result.to_bytes()?;
    let bytes = encode_envelope(&payload);
    std::fs::write(path.as_ref(), &bytes).map_err(CodecError::from)?;
    debug!(
        path = %path.as_ref().display(),
        phases = result.len(),
        bytes = bytes.len(),
        checksum = %payload_checksum(&payload),
        "wrote attribution result file"
    );
    Ok(())
}

/// Load a result set from `path`, binding it to the given providers
pub fn read_result_file(
    path: impl AsRef<Path>,
    ctx: &dyn IdentityContext,
    providers: &UpstreamProviders,
) -> Result<StepResult> {
    let bytes = std::fs::read(path.as_ref()).map_err(CodecError::from)?;
    let payload = decode_envelope(&bytes)?;
    let result = StepResult::from_bytes(payload, ctx, providers)?;
    debug!(
        path = %path.as_ref().display(),
        phases = result.len(),
        "loaded attribution result file"
    );
    Ok(result)
}

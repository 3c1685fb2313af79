//! Error types for the attribution engine
//!
//! Two families live here:
//!
//! - [`AttributionError`]: lookup failures (scoped to a single query) and
//!   invariant violations (programmer or data-consistency errors that abort
//!   the attribution run).
//! - [`CodecError`]: failures while encoding or decoding persisted result sets.
//!
//! Ingestion errors live next to the parser in [`crate::monitor::MonitorError`].

use crate::timeslice::TimesliceId;
use thiserror::Error;

/// Errors raised while building or querying attribution results
#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("No result found for phase \"{0}\"")]
    PhaseNotFound(String),

    #[error("No results found for metric \"{0}\"")]
    MetricNotFound(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Iterator ranges do not match: demand {demand}, sample {sample}, active {active}")]
    RangeMismatch {
        demand: String,
        sample: String,
        active: String,
    },

    #[error("{source_name} source exhausted before timeslice {timeslice}")]
    SourceExhausted {
        source_name: &'static str,
        timeslice: TimesliceId,
    },

    #[error("Total {kind} demand for metric \"{metric}\" is {total} at timeslice {timeslice}")]
    ZeroDemand {
        metric: String,
        kind: &'static str,
        total: f64,
        timeslice: TimesliceId,
    },

    #[error("Invalid timeslice range: last ({last}) precedes first ({first})")]
    InvalidRange {
        first: TimesliceId,
        last: TimesliceId,
    },

    #[error("Timeslice range [{first}, {last}] reaches the limits of the timeslice axis")]
    RangeOutOfBounds {
        first: TimesliceId,
        last: TimesliceId,
    },

    #[error("Invalid demand {0}: must be finite and non-negative")]
    InvalidDemand(f64),

    #[error("Metric \"{metric}\" is {actual}, expected {expected}")]
    MetricKindMismatch {
        metric: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid execution model: {0}")]
    InvalidModel(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by the binary result-set codec
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unexpected end of input at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("Variable-length integer at offset {0} overflows 32 bits")]
    VarIntOverflow(usize),

    #[error("Unknown rule tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("Unknown phase id {0}")]
    UnknownPhase(u32),

    #[error("Unknown metric id {0}")]
    UnknownMetric(u32),

    #[error("Metric \"{metric}\" decoded as {expected} but is {actual}")]
    KindMismatch {
        metric: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Metric \"{metric}\" listed twice in {set}")]
    DuplicateMetric { metric: String, set: &'static str },

    #[error("Phase \"{0}\" has more than one result")]
    DuplicatePhase(String),

    #[error("Collection of {0} entries exceeds the encodable maximum")]
    LengthOverflow(usize),

    #[error("Invalid rule payload: {0}")]
    InvalidRule(f64),

    #[error("Not a result file (bad magic bytes)")]
    BadMagic,

    #[error("Unsupported result file version {0}")]
    UnsupportedVersion(u8),

    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch { expected: String, found: String },

    #[error("{0} trailing bytes after result set")]
    TrailingBytes(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for attribution operations
pub type Result<T> = std::result::Result<T, AttributionError>;

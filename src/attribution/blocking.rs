//! Blocking metric attribution
//!
//! A blocking metric carries a machine-wide set of blocked slices. Attributing
//! it to a phase is pure interval arithmetic: the phase's span minus the
//! blocked set gives the slices in which the phase was not blocked.

use crate::error::Result;
use crate::model::{Metric, Phase};
use crate::providers::PhaseActiveIterator;
use crate::timeslice::{TimesliceId, TimeslicePeriodList};
use std::sync::Arc;

/// Walks a phase's span reporting, per slice, whether the metric was blocked
#[derive(Debug, Clone)]
pub struct BlockingMetricAttributionIterator {
    unblocked: PhaseActiveIterator,
    timeslice: TimesliceId,
}

impl BlockingMetricAttributionIterator {
    /// Fails if `metric` is not a blocking metric
    pub fn new(phase: &Phase, metric: &Metric) -> Result<Self> {
        let blocked = metric.expect_blocking()?;
        let unblocked = TimeslicePeriodList::from_range(phase.span()).subtract(blocked);
        Ok(Self {
            unblocked: PhaseActiveIterator::new(Arc::new(unblocked), phase.span()),
            timeslice: phase.first_timeslice() - 1,
        })
    }

    pub fn has_next(&self) -> bool {
        self.unblocked.has_next()
    }

    /// Advance one slice and report whether it is blocked
    pub fn next_is_blocked(&mut self) -> bool {
        self.timeslice += 1;
        !self.unblocked.next_is_active()
    }

    /// The slice reported by the last `next_is_blocked` call
    pub fn timeslice(&self) -> TimesliceId {
        self.timeslice
    }
}

impl Iterator for BlockingMetricAttributionIterator {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.has_next() {
            Some(self.next_is_blocked())
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.unblocked.size_hint()
    }
}

//! Active-phase detection backed by period lists

use super::{ActivePhaseDetection, ActiveSource, TimesliceSource};
use crate::model::{Phase, PhaseId};
use crate::timeslice::{TimesliceId, TimeslicePeriodList, TimesliceRange};
use std::collections::HashMap;
use std::sync::Arc;

/// Walks a range slice by slice, reporting membership in a period list
///
/// Used both as the active-phase source and, fed with the non-blocked
/// periods of a phase, underneath blocking attribution.
#[derive(Debug, Clone)]
pub struct PhaseActiveIterator {
    active: Arc<TimeslicePeriodList>,
    range: TimesliceRange,
    next: TimesliceId,
}

impl PhaseActiveIterator {
    pub fn new(active: Arc<TimeslicePeriodList>, range: TimesliceRange) -> Self {
        Self {
            active,
            range,
            next: range.first(),
        }
    }

    pub fn has_next(&self) -> bool {
        self.next <= self.range.last()
    }

    /// Advance one slice and report whether it is active
    ///
    /// Past the end of the range every slice reads as inactive.
    pub fn next_is_active(&mut self) -> bool {
        self.next().unwrap_or(false)
    }
}

impl Iterator for PhaseActiveIterator {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if !self.has_next() {
            return None;
        }
        let active = self.active.contains(self.next);
        self.next += 1;
        Some(active)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.range.remaining_from(self.next)).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl TimesliceSource for PhaseActiveIterator {
    fn range(&self) -> TimesliceRange {
        self.range
    }
}

/// Active-phase detection from explicit per-phase period lists
///
/// Phases without an entry are active over their whole span.
#[derive(Debug, Default)]
pub struct PeriodActivePhaseDetection {
    active: HashMap<PhaseId, Arc<TimeslicePeriodList>>,
}

impl PeriodActivePhaseDetection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the active periods of a phase
    pub fn set_active(&mut self, phase: PhaseId, periods: TimeslicePeriodList) {
        self.active.insert(phase, Arc::new(periods));
    }

    /// Mark `inactive` slices of the phase's span as inactive
    pub fn set_inactive_slices(
        &mut self,
        phase: &Phase,
        inactive: impl IntoIterator<Item = TimesliceId>,
    ) {
        let periods = TimeslicePeriodList::from_range(phase.span())
            .subtract(&TimeslicePeriodList::from_slices(inactive));
        self.set_active(phase.id(), periods);
    }
}

impl ActivePhaseDetection for PeriodActivePhaseDetection {
    fn active_iterator(&self, phase: &Phase, range: TimesliceRange) -> ActiveSource {
        let periods = self
            .active
            .get(&phase.id())
            .cloned()
            .unwrap_or_else(|| Arc::new(TimeslicePeriodList::from_range(phase.span())));
        Box::new(PhaseActiveIterator::new(periods, range))
    }
}

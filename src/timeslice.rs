//! Discrete time axis for attribution
//!
//! Time is divided into fixed-size slices indexed by a dense, totally ordered
//! [`TimesliceId`]. Phases cover an inclusive [`TimesliceRange`]; sets of
//! slices (blocked periods, active periods) are kept as a normalized
//! [`TimeslicePeriodList`] so that membership and set difference stay cheap
//! even for long traces.
//!
//! # Example
//!
//! ```
//! use phasemeter::timeslice::{TimeslicePeriodList, TimesliceRange};
//!
//! let span = TimesliceRange::new(0, 4).unwrap();
//! let blocked = TimeslicePeriodList::from_slices([2, 3]);
//! let free = TimeslicePeriodList::from_range(span).subtract(&blocked);
//!
//! assert!(free.contains(1));
//! assert!(!free.contains(2));
//! assert_eq!(free.len(), 3);
//! ```

use crate::error::{AttributionError, Result};
use serde::Serialize;
use std::fmt;

/// Index of a discrete time slice
///
/// Signed so that the "one before the first slice" sentinel used by the
/// attribution iterators is representable for ranges starting at 0.
pub type TimesliceId = i64;

/// Smallest slice a [`TimesliceRange`] may start at
pub const MIN_TIMESLICE: TimesliceId = TimesliceId::MIN + 1;

/// Largest slice a [`TimesliceRange`] may end at
pub const MAX_TIMESLICE: TimesliceId = TimesliceId::MAX - 1;

/// Inclusive range of time slices, `first <= last`
///
/// Bounded to `[MIN_TIMESLICE, MAX_TIMESLICE]` so that the slice before
/// `first` and the slice after `last` are always representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimesliceRange {
    first: TimesliceId,
    last: TimesliceId,
}

impl TimesliceRange {
    /// Create a range, rejecting `last < first` and bounds outside
    /// `[MIN_TIMESLICE, MAX_TIMESLICE]`
    pub fn new(first: TimesliceId, last: TimesliceId) -> Result<Self> {
        if last < first {
            return Err(AttributionError::InvalidRange { first, last });
        }
        if first < MIN_TIMESLICE || last > MAX_TIMESLICE {
            return Err(AttributionError::RangeOutOfBounds { first, last });
        }
        Ok(Self { first, last })
    }

    /// A range covering a single slice
    ///
    /// Not bounds-checked; only used to build slice sets.
    pub fn single(slice: TimesliceId) -> Self {
        Self {
            first: slice,
            last: slice,
        }
    }

    pub fn first(&self) -> TimesliceId {
        self.first
    }

    pub fn last(&self) -> TimesliceId {
        self.last
    }

    /// Number of slices in the range (always at least 1)
    pub fn len(&self) -> u64 {
        self.last.abs_diff(self.first).saturating_add(1)
    }

    /// Slices left when the next one to visit is `next`
    pub fn remaining_from(&self, next: TimesliceId) -> u64 {
        if next > self.last {
            0
        } else if next < self.first {
            self.len()
        } else {
            self.last.abs_diff(next) + 1
        }
    }

    /// Ranges are never empty; provided for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, slice: TimesliceId) -> bool {
        slice >= self.first && slice <= self.last
    }

    /// True if `other` lies entirely within this range
    pub fn encloses(&self, other: &TimesliceRange) -> bool {
        other.first >= self.first && other.last <= self.last
    }

    /// Iterate over every slice in the range
    pub fn iter(&self) -> std::ops::RangeInclusive<TimesliceId> {
        self.first..=self.last
    }
}

impl fmt::Display for TimesliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

/// Normalized set of time slices stored as sorted, disjoint, non-adjacent ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeslicePeriodList {
    periods: Vec<TimesliceRange>,
}

impl TimeslicePeriodList {
    /// The empty set
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_range(range: TimesliceRange) -> Self {
        Self {
            periods: vec![range],
        }
    }

    /// Build from arbitrary (possibly overlapping, unsorted) ranges
    pub fn from_ranges(ranges: impl IntoIterator<Item = TimesliceRange>) -> Self {
        let mut ranges: Vec<TimesliceRange> = ranges.into_iter().collect();
        ranges.sort_by_key(|r| r.first);

        let mut periods: Vec<TimesliceRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match periods.last_mut() {
                // Merge overlapping or touching periods
                Some(last) if range.first <= last.last.saturating_add(1) => {
                    last.last = last.last.max(range.last);
                }
                _ => periods.push(range),
            }
        }
        Self { periods }
    }

    /// Build from individual slices
    pub fn from_slices(slices: impl IntoIterator<Item = TimesliceId>) -> Self {
        Self::from_ranges(slices.into_iter().map(TimesliceRange::single))
    }

    pub fn periods(&self) -> &[TimesliceRange] {
        &self.periods
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Total number of slices in the set
    pub fn len(&self) -> u64 {
        self.periods.iter().map(TimesliceRange::len).sum()
    }

    pub fn contains(&self, slice: TimesliceId) -> bool {
        // Index of the first period starting after `slice`
        let idx = self.periods.partition_point(|p| p.first <= slice);
        idx > 0 && self.periods[idx - 1].last >= slice
    }

    /// Set difference `self - other`
    pub fn subtract(&self, other: &TimeslicePeriodList) -> TimeslicePeriodList {
        let mut result = Vec::with_capacity(self.periods.len());
        let mut j = 0;

        for period in &self.periods {
            let mut start = period.first;
            let end = period.last;

            // Skip removals that end before this period
            while j < other.periods.len() && other.periods[j].last < start {
                j += 1;
            }

            let mut k = j;
            while start <= end && k < other.periods.len() && other.periods[k].first <= end {
                let cut = other.periods[k];
                if cut.first > start {
                    result.push(TimesliceRange {
                        first: start,
                        last: cut.first - 1,
                    });
                }
                start = start.max(cut.last.saturating_add(1));
                k += 1;
            }

            if start <= end {
                result.push(TimesliceRange { first: start, last: end });
            }
        }

        TimeslicePeriodList { periods: result }
    }

    /// Iterate over every slice in the set, in order
    pub fn slices(&self) -> impl Iterator<Item = TimesliceId> + '_ {
        self.periods.iter().flat_map(TimesliceRange::iter)
    }
}

impl From<TimesliceRange> for TimeslicePeriodList {
    fn from(range: TimesliceRange) -> Self {
        Self::from_range(range)
    }
}

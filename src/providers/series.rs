//! Dense per-slice series shared by the tabulated providers

use super::TimesliceSource;
use crate::timeslice::{TimesliceId, TimesliceRange};
use std::sync::Arc;

/// Values indexed by time slice, starting at `start`
///
/// Slices outside the stored window read as `T::default()`.
#[derive(Debug, Clone)]
pub struct DenseSeries<T> {
    start: TimesliceId,
    values: Arc<[T]>,
}

impl<T: Copy + Default> DenseSeries<T> {
    pub fn new(start: TimesliceId, values: Vec<T>) -> Self {
        Self {
            start,
            values: values.into(),
        }
    }

    pub fn start(&self) -> TimesliceId {
        self.start
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, slice: TimesliceId) -> T {
        if slice < self.start {
            return T::default();
        }
        slice
            .checked_sub(self.start)
            .and_then(|offset| usize::try_from(offset).ok())
            .and_then(|idx| self.values.get(idx).copied())
            .unwrap_or_default()
    }

    /// Open a single-pass source over `range`
    pub fn source(&self, range: TimesliceRange) -> SeriesSource<T> {
        SeriesSource {
            series: self.clone(),
            range,
            next: range.first(),
        }
    }
}

/// Single-pass source over a [`DenseSeries`]
#[derive(Debug)]
pub struct SeriesSource<T> {
    series: DenseSeries<T>,
    range: TimesliceRange,
    next: TimesliceId,
}

impl<T: Copy + Default> Iterator for SeriesSource<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next > self.range.last() {
            return None;
        }
        let value = self.series.get(self.next);
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.range.remaining_from(self.next)).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl<T: Copy + Default> TimesliceSource for SeriesSource<T> {
    fn range(&self) -> TimesliceRange {
        self.range
    }
}

//! Resident range tracking
//!
//! Records which presentation-time ranges have been appended to the sink, in
//! insertion order (oldest first). Eviction picks from the front, which is
//! not necessarily the earliest range in presentation time.

use crate::types::CoveredRange;
use std::collections::VecDeque;
use tracing::trace;

/// Ranges currently resident in a buffer sink
#[derive(Debug, Clone, Default)]
pub struct BufferedRangeTracker {
    ranges: VecDeque<CoveredRange>,
}

impl BufferedRangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Recorded ranges, oldest first
    pub fn ranges(&self) -> Vec<CoveredRange> {
        self.ranges.iter().copied().collect()
    }

    /// True iff a single recorded range contains `range` entirely.
    ///
    /// A range straddling two recorded ranges is not covered. An open-ended
    /// record (a live edge whose length was unknown when appended) covers
    /// nothing.
    pub fn is_fully_covered(&self, range: &CoveredRange) -> bool {
        self.ranges
            .iter()
            .any(|r| r.end.is_finite() && r.contains_range(range))
    }

    /// The recorded range containing `time`, if any
    pub fn range_containing(&self, time: f64) -> Option<CoveredRange> {
        self.ranges.iter().find(|r| r.contains_time(time)).copied()
    }

    /// Append a range as the newest entry
    pub fn record(&mut self, range: CoveredRange) {
        trace!(start = range.start, end = range.end, "Recording resident range");
        self.ranges.push_back(range);
    }

    /// Stretch the newest range to end at `end`, recording `[newest.end, end)`
    /// as part of it. Returns false when nothing is recorded.
    pub fn extend_newest(&mut self, end: f64) -> bool {
        match self.ranges.back_mut() {
            Some(newest) => {
                newest.end = newest.end.max(end);
                true
            }
            None => false,
        }
    }

    /// Remove and return the oldest range
    pub fn evict_oldest(&mut self) -> Option<CoveredRange> {
        self.ranges.pop_front()
    }

    /// Remove and return the oldest range overlapping none of `keep`.
    ///
    /// Ranges that overlap `keep` stay buffered in their current position.
    pub fn evict_oldest_sparing(&mut self, keep: &[CoveredRange]) -> Option<CoveredRange> {
        let idx = self
            .ranges
            .iter()
            .position(|r| !keep.iter().any(|k| k.overlaps(r)))?;
        self.ranges.remove(idx)
    }

    /// Remove the first recorded range containing `time`
    pub fn forget_containing(&mut self, time: f64) -> Option<CoveredRange> {
        let idx = self.ranges.iter().position(|r| r.contains_time(time))?;
        self.ranges.remove(idx)
    }

    /// Remove every recorded range overlapping `range`, returning how many
    /// were dropped.
    pub fn forget_overlapping(&mut self, range: &CoveredRange) -> usize {
        let before = self.ranges.len();
        self.ranges.retain(|r| !r.overlaps(range));
        before - self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

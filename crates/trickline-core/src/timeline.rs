//! Timeline index
//!
//! Answers position queries over a declarative segment timeline without
//! performing any I/O:
//! - which segments cover a time window
//! - which segments lie near a target position
//! - whether the timeline is stale at a given position
//! - first and last known positions
//!
//! Raw entries are kept in timescale ticks. Every query converts between ticks
//! and seconds with the timeline's timescale and presentation time offset.

use crate::{
    types::{CoveredRange, Locator, Segment},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Duration of a timeline entry, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDuration {
    /// Known duration shared by every segment of the entry
    Bounded(u64),
    /// Not yet known; the entry extends to the next entry or, for the last
    /// entry, to the live edge.
    Unbounded,
}

impl From<i64> for EntryDuration {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            EntryDuration::Unbounded
        } else {
            EntryDuration::Bounded(raw as u64)
        }
    }
}

/// Wire shape of a timeline entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawEntry {
    ts: u64,
    d: i64,
    #[serde(default)]
    r: u32,
}

/// One raw timeline entry, standing for `repeat + 1` consecutive segments of
/// equal duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub struct TimelineEntry {
    /// Start offset in ticks
    pub ts: u64,
    pub duration: EntryDuration,
    /// Number of additional segments following the first one
    pub repeat: u32,
}

impl From<RawEntry> for TimelineEntry {
    fn from(raw: RawEntry) -> Self {
        Self {
            ts: raw.ts,
            duration: EntryDuration::from(raw.d),
            repeat: raw.r,
        }
    }
}

impl From<TimelineEntry> for RawEntry {
    fn from(entry: TimelineEntry) -> Self {
        let d = match entry.duration {
            EntryDuration::Bounded(d) => d as i64,
            EntryDuration::Unbounded => -1,
        };
        Self {
            ts: entry.ts,
            d,
            r: entry.repeat,
        }
    }
}

impl TimelineEntry {
    pub fn bounded(ts: u64, duration: u64, repeat: u32) -> Self {
        Self {
            ts,
            duration: EntryDuration::Bounded(duration),
            repeat,
        }
    }

    pub fn unbounded(ts: u64) -> Self {
        Self {
            ts,
            duration: EntryDuration::Unbounded,
            repeat: 0,
        }
    }

    /// Number of segments this entry expands to
    pub fn segment_count(&self) -> u64 {
        match self.duration {
            EntryDuration::Bounded(_) => self.repeat as u64 + 1,
            // Repetition is meaningless without a duration
            EntryDuration::Unbounded => 1,
        }
    }

    /// End of the entry in ticks, counting an unknown duration as zero.
    /// `None` when the end does not fit in a tick counter.
    fn checked_end(&self) -> Option<u64> {
        match self.duration {
            EntryDuration::Bounded(d) => d
                .checked_mul(self.repeat as u64 + 1)
                .and_then(|len| self.ts.checked_add(len)),
            EntryDuration::Unbounded => Some(self.ts),
        }
    }

    fn known_end(&self) -> u64 {
        self.checked_end().unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawTimeline {
    timescale: u64,
    #[serde(default)]
    presentation_time_offset: i64,
    #[serde(default)]
    media: String,
    entries: Vec<TimelineEntry>,
}

impl TryFrom<RawTimeline> for Timeline {
    type Error = Error;

    fn try_from(raw: RawTimeline) -> Result<Self> {
        Timeline::new(raw.timescale, raw.entries)
            .map(|t| t.with_presentation_time_offset(raw.presentation_time_offset))
            .map(|t| t.with_media_template(raw.media))
    }
}

/// Ordered description of which segments exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeline")]
pub struct Timeline {
    /// Ticks per second
    timescale: u64,
    /// Offset in ticks added to raw times before scaling
    presentation_time_offset: i64,
    /// Locator template; `$Time$` and `$Number$` are substituted per segment
    media: String,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Create a timeline, validating the timescale and entry ordering
    pub fn new(timescale: u64, entries: Vec<TimelineEntry>) -> Result<Self> {
        if timescale == 0 {
            return Err(Error::InvalidTimeline("timescale must be non-zero".to_string()));
        }
        if let Some(pair) = entries.windows(2).find(|w| w[1].ts <= w[0].ts) {
            return Err(Error::InvalidTimeline(format!(
                "entries out of order: {} follows {}",
                pair[1].ts, pair[0].ts
            )));
        }
        for (idx, entry) in entries.iter().enumerate() {
            let end = entry.checked_end().ok_or_else(|| {
                Error::InvalidTimeline(format!("entry at {} ends past the tick range", entry.ts))
            })?;
            if let Some(next) = entries.get(idx + 1) {
                if end > next.ts {
                    return Err(Error::InvalidTimeline(format!(
                        "entry at {} runs to {}, past the next entry at {}",
                        entry.ts, end, next.ts
                    )));
                }
            }
        }

        Ok(Self {
            timescale,
            presentation_time_offset: 0,
            media: String::new(),
            entries,
        })
    }

    /// An empty timeline at the given timescale
    pub fn empty(timescale: u64) -> Result<Self> {
        Self::new(timescale, Vec::new())
    }

    pub fn with_presentation_time_offset(mut self, offset: i64) -> Self {
        self.presentation_time_offset = offset;
        self
    }

    pub fn with_media_template(mut self, media: impl Into<String>) -> Self {
        self.media = media.into();
        self
    }

    pub fn timescale(&self) -> u64 {
        self.timescale
    }

    pub fn presentation_time_offset(&self) -> i64 {
        self.presentation_time_offset
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_seconds(&self, ticks: f64) -> f64 {
        (ticks + self.presentation_time_offset as f64) / self.timescale as f64
    }

    fn to_ticks(&self, seconds: f64) -> f64 {
        seconds * self.timescale as f64 - self.presentation_time_offset as f64
    }

    fn locator(&self, ts: u64, number: u64) -> Locator {
        self.media
            .replace("$Time$", &ts.to_string())
            .replace("$Number$", &number.to_string())
    }

    /// Duration in ticks of each segment of entry `idx`; infinite for a
    /// trailing unbounded entry.
    fn segment_ticks(&self, idx: usize) -> f64 {
        let entry = &self.entries[idx];
        match entry.duration {
            EntryDuration::Bounded(d) => d as f64,
            EntryDuration::Unbounded => match self.entries.get(idx + 1) {
                Some(next) => (next.ts - entry.ts) as f64,
                None => f64::INFINITY,
            },
        }
    }

    /// Push every segment of entry `idx` overlapping `window` onto `out`.
    ///
    /// `first_number` is the 1-based number of the entry's first segment.
    fn collect_overlapping(
        &self,
        idx: usize,
        first_number: u64,
        window: CoveredRange,
        out: &mut Vec<Segment>,
    ) {
        let entry = &self.entries[idx];
        let d = self.segment_ticks(idx);
        let count = entry.segment_count();
        let lo = self.to_ticks(window.start);

        // Segments are contiguous: start from the one holding `lo`
        let first = if d > 0.0 && d.is_finite() && lo > entry.ts as f64 {
            (((lo - entry.ts as f64) / d).floor() as u64).saturating_sub(1)
        } else {
            0
        };

        for i in first..count {
            let start_ticks = if i == 0 {
                entry.ts as f64
            } else {
                entry.ts as f64 + i as f64 * d
            };
            let start = self.to_seconds(start_ticks);
            if start >= window.end {
                break;
            }
            let duration = d / self.timescale as f64;
            let segment = Segment {
                start,
                duration,
                location: self.locator(start_ticks as u64, first_number + i),
            };
            if segment.range().overlaps(&window) {
                out.push(segment);
            }
        }
    }
}

/// Initialization data and timeline of one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Codec/mime string handed to the sink with every append
    pub codec: String,
    /// Initialization segment, if the container needs one
    #[serde(default)]
    pub init: Option<Locator>,
    pub timeline: Timeline,
}

impl Track {
    pub fn new(codec: impl Into<String>, timeline: Timeline) -> Self {
        Self {
            codec: codec.into(),
            init: None,
            timeline,
        }
    }

    pub fn with_init(mut self, init: impl Into<Locator>) -> Self {
        self.init = Some(init.into());
        self
    }

    /// Parse a track description from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Stateless queries over a [`Timeline`]
pub struct TimelineIndex;

impl TimelineIndex {
    /// Every segment whose interval overlaps `window`, in ascending start order.
    pub fn segments_covering(timeline: &Timeline, window: CoveredRange) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut number = 1;

        for (idx, entry) in timeline.entries.iter().enumerate() {
            let first_number = number;
            number += entry.segment_count();

            if timeline.to_seconds(entry.ts as f64) >= window.end {
                break;
            }
            timeline.collect_overlapping(idx, first_number, window, &mut segments);
        }

        segments
    }

    /// Every segment lying within one of its own durations of `time`, in
    /// ascending start order.
    pub fn segments_near(timeline: &Timeline, time: f64) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut number = 1;

        for (idx, entry) in timeline.entries.iter().enumerate() {
            let first_number = number;
            number += entry.segment_count();

            let duration = timeline.segment_ticks(idx) / timeline.timescale as f64;
            let window = if duration.is_finite() {
                CoveredRange::new(time - duration, time + duration)
            } else if time >= timeline.to_seconds(entry.ts as f64) {
                // An open live edge is only near targets at or past its start
                CoveredRange::new(time, f64::INFINITY)
            } else {
                continue;
            };
            timeline.collect_overlapping(idx, first_number, window, &mut segments);
        }

        segments
    }

    /// Every segment between the first and last position
    pub fn all_segments(timeline: &Timeline) -> Vec<Segment> {
        match Self::first_position(timeline) {
            Some(first) => {
                Self::segments_covering(timeline, CoveredRange::new(first, f64::INFINITY))
            }
            None => Vec::new(),
        }
    }

    /// True when `time` lies at or beyond the end of the last entry
    pub fn needs_refresh(timeline: &Timeline, time: f64) -> bool {
        match timeline.entries.last() {
            Some(last) => timeline.to_ticks(time) >= last.known_end() as f64,
            None => false,
        }
    }

    /// Start of the first entry in seconds
    pub fn first_position(timeline: &Timeline) -> Option<f64> {
        timeline
            .entries
            .first()
            .map(|first| timeline.to_seconds(first.ts as f64))
    }

    /// End of the last entry in seconds, counting an unknown duration as zero
    pub fn last_position(timeline: &Timeline) -> Option<f64> {
        timeline
            .entries
            .last()
            .map(|last| timeline.to_seconds(last.known_end() as f64))
    }
}

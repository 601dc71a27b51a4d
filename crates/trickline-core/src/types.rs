//! Core types for Trickline

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a segment's bytes can be fetched from, as understood by a
/// [`SegmentFetcher`](crate::fetcher::SegmentFetcher).
pub type Locator = String;

/// Unique identifier for an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub Uuid);

impl EngineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open presentation-time interval `[start, end)` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoveredRange {
    pub start: f64,
    pub end: f64,
}

impl CoveredRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of this range in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check if a point lies within this range
    pub fn contains_time(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    /// Check if `other` lies entirely within this range
    pub fn contains_range(&self, other: &CoveredRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &CoveredRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for CoveredRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3}, {:.3})", self.start, self.end)
    }
}

/// One fetchable chunk of media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// Duration in seconds. Infinite for a trailing entry whose duration is
    /// not yet known.
    pub duration: f64,
    /// Where to fetch the segment
    pub location: Locator,
}

impl Segment {
    pub fn new(start: f64, duration: f64, location: impl Into<Locator>) -> Self {
        Self {
            start,
            duration,
            location: location.into(),
        }
    }

    /// End time in seconds
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Presentation interval covered by this segment
    pub fn range(&self) -> CoveredRange {
        CoveredRange::new(self.start, self.end())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of resident ranges kept in the sink
    pub max_buffered_ranges: usize,
    /// Maximum simultaneous segment fetches within one pipeline run
    pub fetch_concurrency: usize,
    /// Capacity of the engine event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buffered_ranges: 2,
            fetch_concurrency: 4,
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_ranges == 0 {
            return Err(Error::InvalidConfig(
                "max_buffered_ranges must be at least 1".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10000,
        }
    }
}

/// Notifications published by a running engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// The initialization segment was appended
    InitAppended,
    /// A media segment was appended
    SegmentAppended { start: f64, end: f64 },
    /// A resident range was removed from the sink
    RangeEvicted { start: f64, end: f64 },
    /// The target lies at or past the end of the timeline
    RefreshNeeded { time: f64 },
    /// The media position was moved to the target
    PositionSet { time: f64 },
    /// The engine stopped accepting requests
    Disposed,
}

//! Trickline Core - Timeline Indexing and Bounded Buffering
//!
//! This crate keeps a small playback buffer filled around a requested
//! presentation time, as used for trick-play thumbnails and scrubbing:
//! - Segment timeline parsing and time-to-segment resolution
//! - Resident range tracking with oldest-first eviction
//! - Request coalescing and cancellation of superseded targets
//! - Pluggable segment fetchers and buffer sinks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Trickline Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Timeline   │  │   Timeline   │  │    Range     │           │
//! │  │   Source     │  │    Index     │  │   Tracker    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Buffer    │                              │
//! │                    │   Engine    │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Segment    │  │    Event    │  │    Buffer    │            │
//! │  │   Fetcher    │  │   Channel   │  │     Sink     │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod timeline;
pub mod ranges;
pub mod fetcher;
pub mod sink;
pub mod source;
pub mod engine;

pub use error::{Error, Result};
pub use types::*;
pub use timeline::{EntryDuration, Timeline, TimelineEntry, TimelineIndex, Track};
pub use ranges::BufferedRangeTracker;
pub use fetcher::{DirectoryFetcher, HttpFetcher, SegmentFetcher};
pub use sink::{AppendRequest, BufferSink, MemorySink};
pub use source::{JsonTimelineSource, TimelineSource};
pub use engine::{BufferEngine, Completion, EngineBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library initialization
pub fn init() {
    tracing::info!(version = VERSION, "Trickline Core initialized");
}

//! Buffer sinks
//!
//! A [`BufferSink`] is the playback buffer the engine feeds: it accepts
//! appends of initialization and media data, removals of presentation-time
//! ranges, and position updates. Append and remove failures are fatal to the
//! engine driving the sink.

use crate::{types::CoveredRange, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One append operation
#[derive(Debug, Clone)]
pub struct AppendRequest {
    /// Media segment bytes
    pub segment: Option<Bytes>,
    /// Initialization segment bytes
    pub init_segment: Option<Bytes>,
    /// Codec/mime string of the track
    pub codec: String,
    /// Offset applied to timestamps inside the appended data
    pub timestamp_offset: f64,
    /// Window outside of which appended frames are dropped
    pub append_window: (Option<f64>, Option<f64>),
    /// Presentation interval the media segment covers
    pub range: Option<CoveredRange>,
}

impl AppendRequest {
    /// Request appending an initialization segment
    pub fn init(data: Bytes, codec: impl Into<String>) -> Self {
        Self {
            segment: None,
            init_segment: Some(data),
            codec: codec.into(),
            timestamp_offset: 0.0,
            append_window: (None, None),
            range: None,
        }
    }

    /// Request appending a media segment covering `range`
    pub fn media(data: Bytes, codec: impl Into<String>, range: CoveredRange) -> Self {
        Self {
            segment: Some(data),
            init_segment: None,
            codec: codec.into(),
            timestamp_offset: 0.0,
            append_window: (None, None),
            range: Some(range),
        }
    }
}

/// Playback buffer the engine appends into
#[async_trait]
pub trait BufferSink: Send + Sync {
    /// Append data. Must not be interrupted once started.
    async fn append(&self, request: AppendRequest) -> Result<()>;

    /// Remove buffered data within `[start, end)`
    async fn remove(&self, start: f64, end: f64) -> Result<()>;

    /// Move the media position indicator
    fn set_position(&self, time: f64);
}

#[derive(Debug, Default)]
struct MemorySinkState {
    init: Option<Bytes>,
    codec: Option<String>,
    segments: Vec<(CoveredRange, Bytes)>,
    appended: Vec<CoveredRange>,
    removed: Vec<CoveredRange>,
    position: Option<f64>,
}

/// In-memory sink keeping appended segments by presentation range
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
    fail_appends: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make subsequent appends fail with a sink error
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Resident segment ranges, ordered by start
    pub fn buffered(&self) -> Vec<CoveredRange> {
        let mut ranges: Vec<_> = self.state().segments.iter().map(|(r, _)| *r).collect();
        ranges.sort_by(|a, b| a.start.total_cmp(&b.start));
        ranges
    }

    /// Every media range ever appended, in append order
    pub fn appended(&self) -> Vec<CoveredRange> {
        self.state().appended.clone()
    }

    /// Every range ever removed, in removal order
    pub fn removed(&self) -> Vec<CoveredRange> {
        self.state().removed.clone()
    }

    pub fn has_init(&self) -> bool {
        self.state().init.is_some()
    }

    pub fn codec(&self) -> Option<String> {
        self.state().codec.clone()
    }

    pub fn position(&self) -> Option<f64> {
        self.state().position
    }

    /// Total resident media bytes
    pub fn byte_len(&self) -> usize {
        self.state().segments.iter().map(|(_, data)| data.len()).sum()
    }
}

#[async_trait]
impl BufferSink for MemorySink {
    async fn append(&self, request: AppendRequest) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::sink("append rejected"));
        }

        let mut state = self.state();
        state.codec = Some(request.codec);
        if let Some(init) = request.init_segment {
            state.init = Some(init);
        }
        if let Some(data) = request.segment {
            let range = request
                .range
                .ok_or_else(|| Error::sink("media append without a range"))?;
            debug!(start = range.start, end = range.end, bytes = data.len(), "Memory sink append");
            state.segments.push((range, data));
            state.appended.push(range);
        }
        Ok(())
    }

    async fn remove(&self, start: f64, end: f64) -> Result<()> {
        let removed = CoveredRange::new(start, end);
        let mut state = self.state();
        state.segments.retain(|(r, _)| !r.overlaps(&removed));
        state.removed.push(removed);
        Ok(())
    }

    fn set_position(&self, time: f64) {
        self.state().position = Some(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_append_and_remove() {
        let sink = MemorySink::new();
        sink.append(AppendRequest::init(Bytes::from_static(b"ftyp"), "video/mp4"))
            .await
            .unwrap();

        for start in [0.0, 2.0, 4.0] {
            let range = CoveredRange::new(start, start + 2.0);
            sink.append(AppendRequest::media(Bytes::from(vec![0u8; 16]), "video/mp4", range))
                .await
                .unwrap();
        }
        assert_eq!(sink.buffered().len(), 3);
        assert_eq!(sink.byte_len(), 48);

        sink.remove(2.0, 4.0).await.unwrap();
        assert_eq!(
            sink.buffered(),
            vec![CoveredRange::new(0.0, 2.0), CoveredRange::new(4.0, 6.0)]
        );
        assert_eq!(sink.removed(), vec![CoveredRange::new(2.0, 4.0)]);
    }

    #[tokio::test]
    async fn test_memory_sink_position_and_codec() {
        let sink = MemorySink::new();
        assert_eq!(sink.position(), None);

        let range = CoveredRange::new(0.0, 2.0);
        sink.append(AppendRequest::media(Bytes::new(), "video/webm", range))
            .await
            .unwrap();
        sink.set_position(1.5);

        assert_eq!(sink.position(), Some(1.5));
        assert_eq!(sink.codec().as_deref(), Some("video/webm"));
        assert!(!sink.has_init());
    }

    #[tokio::test]
    async fn test_memory_sink_fault_injection() {
        let sink = MemorySink::new();
        sink.fail_appends(true);
        let err = sink
            .append(AppendRequest::init(Bytes::new(), "video/mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SINK");
        assert!(!sink.has_init());
    }
}

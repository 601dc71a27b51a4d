//! Bounded buffer engine
//!
//! Keeps a capacity-bounded playback buffer covering the most recently
//! requested position. Each [`BufferEngine::ensure_coverage`] call runs (or
//! joins) a pipeline that:
//! - resolves the segments near the target through the [`TimelineIndex`]
//! - evicts the oldest resident ranges once over capacity
//! - fetches the missing segments and appends them in presentation order
//! - moves the media position to the target
//!
//! A single worker task owns the timeline, the range tracker and the
//! collaborators. Requests reach it through one channel. A request for the
//! time already being processed joins the running pipeline; a request for a
//! different time cancels it. Cancellation is observed at suspension points
//! only: in-flight fetches are abandoned, but an append or removal that has
//! started against the sink always runs to completion.

use crate::{
    fetcher::SegmentFetcher,
    ranges::BufferedRangeTracker,
    sink::{AppendRequest, BufferSink},
    timeline::{Timeline, TimelineIndex, Track},
    types::*,
    Error, Result,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Gap under which consecutive segments count as one contiguous run
const CONTIGUITY_EPSILON: f64 = 1e-6;

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Ensure { time: f64, reply: Reply },
    Control(Control),
}

/// Commands that never start a pipeline
enum Control {
    UpdateTimeline(Timeline),
    UpdateTrack(Track),
    Snapshot(oneshot::Sender<Vec<CoveredRange>>),
}

/// One target time and every caller waiting on it
struct Request {
    time: f64,
    waiters: Vec<Reply>,
}

impl Request {
    fn new(time: f64, reply: Reply) -> Self {
        Self {
            time,
            waiters: vec![reply],
        }
    }

    fn complete(self, outcome: Result<()>) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Completion of one [`BufferEngine::ensure_coverage`] call.
///
/// The request is queued when the completion is created; awaiting it only
/// waits for the outcome.
#[must_use = "completions resolve only when awaited"]
pub struct Completion {
    state: CompletionState,
}

enum CompletionState {
    Waiting(oneshot::Receiver<Result<()>>),
    Failed(Option<Error>),
}

impl Completion {
    fn waiting(rx: oneshot::Receiver<Result<()>>) -> Self {
        Self {
            state: CompletionState::Waiting(rx),
        }
    }

    fn failed(err: Error) -> Self {
        Self {
            state: CompletionState::Failed(Some(err)),
        }
    }
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            // A dropped reply means the worker is gone
            CompletionState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|outcome| outcome.unwrap_or(Err(Error::Disposed))),
            CompletionState::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(Error::Disposed)))
            }
        }
    }
}

/// Builder for a [`BufferEngine`]
pub struct EngineBuilder {
    config: EngineConfig,
    fetcher: Arc<dyn SegmentFetcher>,
    sink: Arc<dyn BufferSink>,
    track: Option<Track>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn track(mut self, track: Track) -> Self {
        self.track = Some(track);
        self
    }

    /// Validate the configuration and start the worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> Result<BufferEngine> {
        self.config.validate()?;

        let id = EngineId::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_capacity);
        let shutdown = CancellationToken::new();

        let (codec, init, timeline) = match self.track {
            Some(track) => (track.codec, track.init, Some(track.timeline)),
            None => (String::new(), None, None),
        };

        let worker = Worker {
            config: self.config.clone(),
            fetcher: self.fetcher,
            sink: self.sink,
            events: events.clone(),
            codec,
            init,
            init_appended: false,
            flush_pending: false,
            timeline,
            tracker: BufferedRangeTracker::new(),
            last_segments: None,
        };

        tokio::spawn(
            worker
                .run(commands_rx, shutdown.clone())
                .instrument(info_span!("buffer_engine", engine = %id)),
        );

        info!(
            engine = %id,
            max_buffered_ranges = self.config.max_buffered_ranges,
            "Buffer engine started"
        );

        Ok(BufferEngine {
            id,
            config: self.config,
            commands: commands_tx,
            shutdown,
            events,
        })
    }
}

/// Handle to a running buffer engine.
///
/// Handles are cheap to clone; the worker stops once every handle is dropped
/// or [`dispose`](Self::dispose) is called.
#[derive(Clone)]
pub struct BufferEngine {
    id: EngineId,
    config: EngineConfig,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    events: broadcast::Sender<EngineEvent>,
}

impl BufferEngine {
    pub fn builder(fetcher: Arc<dyn SegmentFetcher>, sink: Arc<dyn BufferSink>) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            fetcher,
            sink,
            track: None,
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ensure the buffer covers `time` and move the media position there.
    ///
    /// Resolves with [`Error::Cancelled`] if a request for another time
    /// supersedes this one before it completes.
    pub fn ensure_coverage(&self, time: f64) -> Completion {
        if self.is_disposed() {
            return Completion::failed(Error::Disposed);
        }

        let (reply, rx) = oneshot::channel();
        match self.commands.send(Command::Ensure { time, reply }) {
            Ok(()) => Completion::waiting(rx),
            Err(_) => Completion::failed(Error::Disposed),
        }
    }

    /// Replace the timeline, keeping codec and initialization segment
    pub fn update_timeline(&self, timeline: Timeline) -> Result<()> {
        self.control(Control::UpdateTimeline(timeline))
    }

    /// Replace the whole track. A different codec or initialization segment
    /// flushes the buffer before the next append.
    pub fn update_track(&self, track: Track) -> Result<()> {
        self.control(Control::UpdateTrack(track))
    }

    /// Resident ranges, oldest first
    pub async fn buffered_ranges(&self) -> Result<Vec<CoveredRange>> {
        let (tx, rx) = oneshot::channel();
        self.control(Control::Snapshot(tx))?;
        rx.await.map_err(|_| Error::Disposed)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled() || self.commands.is_closed()
    }

    /// Stop accepting requests and cancel pending work. Idempotent.
    pub fn dispose(&self) {
        if !self.shutdown.is_cancelled() {
            info!(engine = %self.id, "Disposing buffer engine");
            self.shutdown.cancel();
        }
    }

    fn control(&self, control: Control) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.commands
            .send(Command::Control(control))
            .map_err(|_| Error::Disposed)
    }
}

/// Fold a new request into the active/queued pair.
///
/// At most one request waits behind the active one; anything newer replaces
/// it and cancels its callers.
fn coalesce(
    active: &mut Request,
    queued: &mut Option<Request>,
    cancel: &CancellationToken,
    time: f64,
    reply: Reply,
) {
    if let Some(pending) = queued.as_mut() {
        if pending.time == time {
            pending.waiters.push(reply);
        } else {
            let superseded = std::mem::replace(pending, Request::new(time, reply));
            debug!(superseded = superseded.time, time, "Queued request superseded");
            superseded.complete(Err(Error::Cancelled));
        }
    } else if !cancel.is_cancelled() && active.time == time {
        debug!(time, "Joining active request");
        active.waiters.push(reply);
    } else {
        debug!(active = active.time, time, "Cancelling active request");
        cancel.cancel();
        *queued = Some(Request::new(time, reply));
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// True when `next` extends the run ending with `prev`. An open-ended live
/// segment always starts a run of its own.
fn continues_run(prev: &CoveredRange, next: &CoveredRange) -> bool {
    next.end.is_finite() && (next.start - prev.end).abs() < CONTIGUITY_EPSILON
}

/// Number of tracked ranges appending `segments` (sorted by start) produces
fn contiguous_runs(segments: &[Segment]) -> usize {
    segments
        .iter()
        .enumerate()
        .filter(|(i, s)| *i == 0 || !continues_run(&segments[i - 1].range(), &s.range()))
        .count()
}

/// State owned by the worker task
struct Worker {
    config: EngineConfig,
    fetcher: Arc<dyn SegmentFetcher>,
    sink: Arc<dyn BufferSink>,
    events: broadcast::Sender<EngineEvent>,
    codec: String,
    init: Option<Locator>,
    init_appended: bool,
    /// Resident data belongs to a previous track
    flush_pending: bool,
    timeline: Option<Timeline>,
    tracker: BufferedRangeTracker,
    /// Segments used by the last successful pipeline
    last_segments: Option<Vec<Segment>>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        let mut queued: Option<Request> = None;
        let mut deferred: VecDeque<Control> = VecDeque::new();
        let mut closed = false;

        loop {
            while let Some(control) = deferred.pop_front() {
                self.handle_control(control);
            }
            if shutdown.is_cancelled() || closed {
                break;
            }

            let request = match queued.take() {
                Some(request) => request,
                None => {
                    let command = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        command = commands.recv() => command,
                    };
                    match command {
                        Some(Command::Ensure { time, reply }) => Request::new(time, reply),
                        Some(Command::Control(control)) => {
                            self.handle_control(control);
                            continue;
                        }
                        None => break,
                    }
                }
            };

            let cancel = shutdown.child_token();
            let mut active = request;
            let outcome = {
                let pipeline = self.run_pipeline(active.time, &cancel);
                tokio::pin!(pipeline);
                loop {
                    // Commands first, so an already queued target supersedes
                    // before the pipeline gets to apply anything
                    tokio::select! {
                        biased;
                        command = commands.recv(), if !closed => match command {
                            Some(Command::Ensure { time, reply }) => {
                                coalesce(&mut active, &mut queued, &cancel, time, reply);
                            }
                            Some(Command::Control(control)) => deferred.push_back(control),
                            None => {
                                closed = true;
                                cancel.cancel();
                            }
                        },
                        outcome = &mut pipeline => break outcome,
                    }
                }
            };

            match outcome {
                Err(err) if err.is_fatal() => {
                    error!(time = active.time, error = %err, code = err.error_code(), "Pipeline failed, tearing down engine");
                    shutdown.cancel();
                    active.complete(Err(err));
                    break;
                }
                Err(Error::Cancelled) if shutdown.is_cancelled() => {
                    active.complete(Err(Error::Disposed));
                }
                outcome => active.complete(outcome),
            }
        }

        shutdown.cancel();
        commands.close();
        if let Some(request) = queued.take() {
            request.complete(Err(Error::Disposed));
        }
        while let Ok(command) = commands.try_recv() {
            if let Command::Ensure { reply, .. } = command {
                let _ = reply.send(Err(Error::Disposed));
            }
        }
        let _ = self.events.send(EngineEvent::Disposed);
        info!("Buffer engine disposed");
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::UpdateTimeline(timeline) => {
                info!(
                    entries = timeline.entries().len(),
                    last_position = ?TimelineIndex::last_position(&timeline),
                    "Timeline updated"
                );
                self.timeline = Some(timeline);
                self.last_segments = None;
            }
            Control::UpdateTrack(track) => {
                let switched = track.codec != self.codec || track.init != self.init;
                if switched && (self.init_appended || !self.tracker.is_empty()) {
                    self.flush_pending = true;
                }
                if switched {
                    self.init_appended = false;
                }
                info!(codec = %track.codec, switched, "Track updated");

                self.codec = track.codec;
                self.init = track.init;
                self.timeline = Some(track.timeline);
                self.last_segments = None;
            }
            Control::Snapshot(reply) => {
                let _ = reply.send(self.tracker.ranges());
            }
        }
    }

    #[instrument(skip(self, cancel))]
    async fn run_pipeline(&mut self, time: f64, cancel: &CancellationToken) -> Result<()> {
        let timeline = self.timeline.as_ref().ok_or(Error::NoTimelineConfigured)?;

        if TimelineIndex::needs_refresh(timeline, time) {
            debug!(time, "Target at or past the end of the timeline");
            let _ = self.events.send(EngineEvent::RefreshNeeded { time });
        }

        let segments = TimelineIndex::segments_near(timeline, time);
        if segments.is_empty() {
            return Err(Error::NoSegmentFound { time });
        }

        if self.last_segments.as_ref() == Some(&segments) {
            debug!(segments = segments.len(), "Segments unchanged since last run");
            self.set_position(time);
            return Ok(());
        }
        self.last_segments = None;

        self.flush(cancel).await?;
        self.prepare_init(cancel).await?;

        let needed: Vec<CoveredRange> = segments.iter().map(Segment::range).collect();
        let missing: Vec<Segment> = segments
            .iter()
            .filter(|s| !self.tracker.is_fully_covered(&s.range()))
            .cloned()
            .collect();

        self.evict(contiguous_runs(&missing), &needed, cancel).await?;

        if !missing.is_empty() {
            let payloads = self.fetch_all(&missing, cancel).await?;
            self.append_all(&missing, payloads, cancel).await?;
        }

        if self.tracker.len() > self.config.max_buffered_ranges {
            warn!(
                resident = self.tracker.len(),
                max = self.config.max_buffered_ranges,
                "Needed ranges exceed buffer capacity"
            );
        }

        self.set_position(time);
        self.last_segments = Some(segments);
        Ok(())
    }

    /// Remove everything appended for a previous track
    async fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        if !self.flush_pending {
            return Ok(());
        }

        while let Some(range) = self.tracker.evict_oldest() {
            self.sink.remove(range.start, range.end).await?;
            let _ = self.events.send(EngineEvent::RangeEvicted {
                start: range.start,
                end: range.end,
            });
            check_cancelled(cancel)?;
        }
        self.flush_pending = false;
        debug!("Previous track flushed");
        Ok(())
    }

    async fn prepare_init(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.init_appended {
            return Ok(());
        }

        if let Some(init) = self.init.clone() {
            let data = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                data = self.fetcher.fetch(&init) => data?,
            };
            self.sink
                .append(AppendRequest::init(data, self.codec.clone()))
                .await?;
            let _ = self.events.send(EngineEvent::InitAppended);
            debug!(init = %init, "Initialization segment appended");
        }

        self.init_appended = true;
        check_cancelled(cancel)
    }

    /// Evict oldest ranges until `incoming` new ones fit, never touching a
    /// range that overlaps `needed`.
    async fn evict(
        &mut self,
        incoming: usize,
        needed: &[CoveredRange],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let max = self.config.max_buffered_ranges;

        while self.tracker.len() + incoming > max {
            let Some(victim) = self.tracker.evict_oldest_sparing(needed) else {
                warn!(
                    resident = self.tracker.len(),
                    incoming,
                    max,
                    "Only needed ranges left, cannot restore capacity"
                );
                break;
            };

            self.sink.remove(victim.start, victim.end).await?;
            // Drop any other record the removal invalidated
            let stale = self.tracker.forget_overlapping(&victim);
            debug!(start = victim.start, end = victim.end, stale, "Range evicted");
            let _ = self.events.send(EngineEvent::RangeEvicted {
                start: victim.start,
                end: victim.end,
            });

            check_cancelled(cancel)?;
        }

        Ok(())
    }

    /// Fetch every segment, abandoning all of them on cancellation
    async fn fetch_all(
        &self,
        segments: &[Segment],
        cancel: &CancellationToken,
    ) -> Result<Vec<Bytes>> {
        let fetcher = Arc::clone(&self.fetcher);
        // Owned locators keep the stream free of borrows from `segments`
        let locators: Vec<Locator> = segments.iter().map(|s| s.location.clone()).collect();
        let fetches = futures::stream::iter(locators.into_iter().map(move |locator| {
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch(&locator).await }
        }))
        .buffered(self.config.fetch_concurrency)
        .try_collect::<Vec<_>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(segments = segments.len(), "Fetches abandoned");
                Err(Error::Cancelled)
            }
            payloads = fetches => payloads,
        }
    }

    /// Append segments in order, recording each contiguous run as one range
    async fn append_all(
        &mut self,
        segments: &[Segment],
        payloads: Vec<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut previous: Option<CoveredRange> = None;

        for (segment, data) in segments.iter().zip(payloads) {
            check_cancelled(cancel)?;

            let range = segment.range();
            self.sink
                .append(AppendRequest::media(data, self.codec.clone(), range))
                .await?;

            match previous {
                Some(prev) if continues_run(&prev, &range) => {
                    self.tracker.extend_newest(range.end);
                }
                _ => self.tracker.record(range),
            }
            previous = Some(range);

            debug!(start = range.start, end = range.end, location = %segment.location, "Segment appended");
            let _ = self.events.send(EngineEvent::SegmentAppended {
                start: range.start,
                end: range.end,
            });
        }

        Ok(())
    }

    fn set_position(&self, time: f64) {
        self.sink.set_position(time);
        let _ = self.events.send(EngineEvent::PositionSet { time });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::timeline::TimelineEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves every locator with its own name as payload
    #[derive(Default)]
    struct EchoFetcher {
        calls: Mutex<HashMap<String, usize>>,
    }

    impl EchoFetcher {
        fn calls(&self, locator: &str) -> usize {
            self.calls.lock().unwrap().get(locator).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl SegmentFetcher for EchoFetcher {
        async fn fetch(&self, locator: &str) -> Result<Bytes> {
            *self.calls.lock().unwrap().entry(locator.to_string()).or_default() += 1;
            Ok(Bytes::from(locator.to_string()))
        }
    }

    fn gapped_track() -> Track {
        // Four 2s segments separated by 8s gaps
        let entries = (0..4).map(|i| TimelineEntry::bounded(i * 10, 2, 0)).collect();
        let timeline = Timeline::new(1, entries)
            .unwrap()
            .with_media_template("seg-$Time$.m4s");
        Track::new("video/mp4", timeline).with_init("init.mp4")
    }

    fn spawn(track: Option<Track>) -> (BufferEngine, Arc<EchoFetcher>, Arc<MemorySink>) {
        let fetcher = Arc::new(EchoFetcher::default());
        let sink = Arc::new(MemorySink::new());
        let mut builder = BufferEngine::builder(fetcher.clone(), sink.clone());
        if let Some(track) = track {
            builder = builder.track(track);
        }
        (builder.spawn().unwrap(), fetcher, sink)
    }

    #[test]
    fn test_contiguous_runs() {
        let segments = vec![
            Segment::new(0.0, 2.0, "a"),
            Segment::new(2.0, 2.0, "b"),
            Segment::new(6.0, 2.0, "c"),
            Segment::new(8.0, f64::INFINITY, "live"),
        ];
        assert_eq!(contiguous_runs(&segments[..3]), 2);
        assert_eq!(contiguous_runs(&segments[..2]), 1);
        // The live segment never joins the run before it
        assert_eq!(contiguous_runs(&segments), 3);
        assert_eq!(contiguous_runs(&[]), 0);
    }

    #[tokio::test]
    async fn test_ensure_coverage_appends_and_positions() {
        let (engine, fetcher, sink) = spawn(Some(gapped_track()));

        engine.ensure_coverage(11.0).await.unwrap();

        assert!(sink.has_init());
        assert_eq!(sink.appended(), vec![CoveredRange::new(10.0, 12.0)]);
        assert_eq!(sink.position(), Some(11.0));
        assert_eq!(fetcher.calls("init.mp4"), 1);
        assert_eq!(
            engine.buffered_ranges().await.unwrap(),
            vec![CoveredRange::new(10.0, 12.0)]
        );
    }

    #[tokio::test]
    async fn test_live_edge_refetched_after_timeline_update() {
        let live = Timeline::new(
            1,
            vec![TimelineEntry::bounded(0, 2, 9), TimelineEntry::unbounded(20)],
        )
        .unwrap()
        .with_media_template("s-$Time$");
        let (engine, fetcher, sink) = spawn(Some(Track::new("video/mp4", live)));

        engine.ensure_coverage(1.0).await.unwrap();
        assert_eq!(fetcher.calls("s-20"), 0);

        engine.ensure_coverage(21.0).await.unwrap();
        assert_eq!(fetcher.calls("s-20"), 1);
        assert_eq!(
            engine.buffered_ranges().await.unwrap(),
            vec![CoveredRange::new(18.0, 20.0), CoveredRange::new(20.0, f64::INFINITY)]
        );

        // The live edge moved on; the old open segment covers none of it
        let extended = Timeline::new(
            1,
            vec![TimelineEntry::bounded(0, 2, 14), TimelineEntry::unbounded(30)],
        )
        .unwrap()
        .with_media_template("s-$Time$");
        engine.update_timeline(extended).unwrap();
        engine.ensure_coverage(25.0).await.unwrap();

        for locator in ["s-22", "s-24", "s-26"] {
            assert_eq!(fetcher.calls(locator), 1, "{} not fetched", locator);
        }
        assert!(sink.appended().contains(&CoveredRange::new(24.0, 26.0)));
        assert_eq!(
            engine.buffered_ranges().await.unwrap(),
            vec![CoveredRange::new(20.0, f64::INFINITY), CoveredRange::new(22.0, 28.0)]
        );
    }

    #[tokio::test]
    async fn test_no_timeline_configured() {
        let (engine, _, _) = spawn(None);

        let err = engine.ensure_coverage(1.0).await.unwrap_err();
        assert!(matches!(err, Error::NoTimelineConfigured));
        // Resolution errors leave the engine usable
        assert!(!engine.is_disposed());
    }

    #[tokio::test]
    async fn test_no_segment_found() {
        let (engine, _, _) = spawn(Some(gapped_track()));

        let err = engine.ensure_coverage(6.0).await.unwrap_err();
        assert!(matches!(err, Error::NoSegmentFound { .. }));
        engine.ensure_coverage(1.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_segments_skip_fetch() {
        let (engine, fetcher, sink) = spawn(Some(gapped_track()));

        engine.ensure_coverage(20.5).await.unwrap();
        engine.ensure_coverage(21.5).await.unwrap();

        assert_eq!(fetcher.calls("seg-20.m4s"), 1);
        assert_eq!(sink.appended().len(), 1);
        assert_eq!(sink.position(), Some(21.5));
    }

    #[tokio::test]
    async fn test_update_timeline_extends_coverage() {
        let (engine, _, sink) = spawn(Some(gapped_track()));
        let mut events = engine.subscribe();

        assert!(engine.ensure_coverage(45.0).await.is_err());

        let timeline = Timeline::new(1, vec![TimelineEntry::bounded(40, 10, 0)])
            .unwrap()
            .with_media_template("live-$Time$.m4s");
        engine.update_timeline(timeline).unwrap();
        engine.ensure_coverage(45.0).await.unwrap();

        assert_eq!(sink.appended(), vec![CoveredRange::new(40.0, 50.0)]);
        let mut saw_refresh = false;
        while let Ok(event) = events.try_recv() {
            saw_refresh |= matches!(event, EngineEvent::RefreshNeeded { time } if time == 45.0);
        }
        assert!(saw_refresh);
    }

    #[tokio::test]
    async fn test_track_switch_flushes_buffer() {
        let (engine, fetcher, sink) = spawn(Some(gapped_track()));
        engine.ensure_coverage(1.0).await.unwrap();

        let timeline = Timeline::new(1, vec![TimelineEntry::bounded(0, 4, 0)])
            .unwrap()
            .with_media_template("hevc-$Time$.m4s");
        let track = Track::new("video/mp4;codecs=hvc1", timeline).with_init("hevc-init.mp4");
        engine.update_track(track).unwrap();
        engine.ensure_coverage(1.0).await.unwrap();

        assert_eq!(sink.removed(), vec![CoveredRange::new(0.0, 2.0)]);
        assert_eq!(sink.buffered(), vec![CoveredRange::new(0.0, 4.0)]);
        assert_eq!(fetcher.calls("hevc-init.mp4"), 1);
        assert_eq!(sink.codec().as_deref(), Some("video/mp4;codecs=hvc1"));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let (engine, _, _) = spawn(Some(gapped_track()));
        let mut events = engine.subscribe();

        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert!(matches!(engine.ensure_coverage(1.0).await, Err(Error::Disposed)));
        assert!(matches!(engine.update_timeline(Timeline::empty(1).unwrap()), Err(Error::Disposed)));
        assert_eq!(events.recv().await.unwrap(), EngineEvent::Disposed);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let fetcher = Arc::new(EchoFetcher::default());
        let sink = Arc::new(MemorySink::new());
        let config = EngineConfig {
            max_buffered_ranges: 0,
            ..Default::default()
        };

        let result = BufferEngine::builder(fetcher, sink).config(config).spawn();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}

//! Benchmark tests for trickline-core operations
//!
//! Run with: cargo bench -p trickline-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trickline_core::ranges::BufferedRangeTracker;
use trickline_core::timeline::{Timeline, TimelineEntry, TimelineIndex};
use trickline_core::types::*;

// ============================================================================
// Helpers
// ============================================================================

/// Timeline with `entry_count` entries of ten 2s segments each
fn create_test_timeline(entry_count: u64) -> Timeline {
    let entries = (0..entry_count)
        .map(|i| TimelineEntry::bounded(i * 20_000, 2_000, 9))
        .collect();
    Timeline::new(1000, entries)
        .unwrap()
        .with_media_template("thumbs/tile-$Time$.jpg")
}

/// Timeline JSON with `entry_count` entries of alternating durations
fn generate_timeline_json(entry_count: usize) -> String {
    let mut ts = 0u64;
    let entries: Vec<String> = (0..entry_count)
        .map(|i| {
            let d = 2_000 + (i % 3) as u64 * 500;
            let entry = format!(r#"{{ "ts": {}, "d": {}, "r": 4 }}"#, ts, d);
            ts += d * 5;
            entry
        })
        .collect();

    format!(
        r#"{{ "codec": "video/mp4", "init": "init.mp4", "timeline": {{ "timescale": 1000, "media": "seg-$Number$.m4s", "entries": [{}] }} }}"#,
        entries.join(", ")
    )
}

// ============================================================================
// Timeline Benchmarks
// ============================================================================

fn bench_timeline_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Timeline Parsing");

    for &count in &[10, 100, 1000] {
        let json = generate_timeline_json(count);
        group.bench_with_input(BenchmarkId::new("Track::from_json", count), &json, |b, json| {
            b.iter(|| black_box(trickline_core::Track::from_json(json).unwrap()));
        });
    }

    group.finish();
}

fn bench_timeline_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("Timeline Queries");

    for &count in &[10u64, 100, 1000] {
        let timeline = create_test_timeline(count);
        let middle = count as f64 * 10.0;

        group.bench_with_input(
            BenchmarkId::new("segments_near", count),
            &timeline,
            |b, timeline| {
                b.iter(|| black_box(TimelineIndex::segments_near(timeline, black_box(middle))));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("segments_covering", count),
            &timeline,
            |b, timeline| {
                let window = CoveredRange::new(middle, middle + 30.0);
                b.iter(|| black_box(TimelineIndex::segments_covering(timeline, window)));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("needs_refresh", count),
            &timeline,
            |b, timeline| {
                b.iter(|| black_box(TimelineIndex::needs_refresh(timeline, black_box(middle))));
            },
        );
    }

    group.finish();
}

// ============================================================================
// Range Tracker Benchmarks
// ============================================================================

fn bench_range_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("Range Tracker");

    for &count in &[2usize, 16, 128] {
        group.bench_with_input(BenchmarkId::new("record_and_evict", count), &count, |b, &count| {
            b.iter(|| {
                let mut tracker = BufferedRangeTracker::new();
                for i in 0..count {
                    let start = i as f64 * 10.0;
                    tracker.record(CoveredRange::new(start, start + 2.0));
                }
                let keep = [CoveredRange::new(0.0, 2.0)];
                while tracker.evict_oldest_sparing(&keep).is_some() {}
                black_box(tracker.len())
            });
        });

        let mut tracker = BufferedRangeTracker::new();
        for i in 0..count {
            let start = i as f64 * 10.0;
            tracker.record(CoveredRange::new(start, start + 2.0));
        }
        group.bench_with_input(BenchmarkId::new("is_fully_covered", count), &tracker, |b, tracker| {
            let query = CoveredRange::new(count as f64 * 10.0 - 9.5, count as f64 * 10.0 - 8.5);
            b.iter(|| black_box(tracker.is_fully_covered(&query)));
        });
    }

    group.finish();
}

// ============================================================================
// Group Registration
// ============================================================================

criterion_group!(timeline_benches, bench_timeline_parsing, bench_timeline_queries);

criterion_group!(range_benches, bench_range_tracker);

criterion_main!(timeline_benches, range_benches);

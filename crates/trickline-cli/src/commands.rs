//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trickline_core::{
    BufferEngine, CoveredRange, DirectoryFetcher, EngineConfig, EngineEvent, FetcherConfig,
    HttpFetcher, JsonTimelineSource, MemorySink, Segment, SegmentFetcher, TimelineIndex,
    TimelineSource,
};
use url::Url;

#[derive(Serialize)]
struct InspectReport {
    codec: String,
    init: Option<String>,
    timescale: u64,
    entries: usize,
    segments: usize,
    first_position: Option<f64>,
    last_position: Option<f64>,
    lookups: Vec<Lookup>,
}

#[derive(Serialize)]
struct Lookup {
    time: f64,
    needs_refresh: bool,
    segments: Vec<Segment>,
}

#[derive(Serialize)]
struct SeekStep {
    time: f64,
    error: Option<String>,
    code: Option<&'static str>,
    resident: Vec<CoveredRange>,
}

/// Load an engine configuration, or the defaults when no file is given
pub async fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Inspect a track description
pub async fn inspect(track_path: &Path, times: &[f64], format: &str) -> anyhow::Result<()> {
    let track = JsonTimelineSource::new(track_path)
        .load()
        .await
        .with_context(|| format!("loading track {}", track_path.display()))?;
    let timeline = &track.timeline;

    let report = InspectReport {
        codec: track.codec.clone(),
        init: track.init.clone(),
        timescale: timeline.timescale(),
        entries: timeline.entries().len(),
        segments: TimelineIndex::all_segments(timeline).len(),
        first_position: TimelineIndex::first_position(timeline),
        last_position: TimelineIndex::last_position(timeline),
        lookups: times
            .iter()
            .map(|&time| Lookup {
                time,
                needs_refresh: TimelineIndex::needs_refresh(timeline, time),
                segments: TimelineIndex::segments_near(timeline, time),
            })
            .collect(),
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", output::to_json(&report)),
        OutputFormat::Text => {
            println!("Track: {}", track_path.display());
            println!("  Codec: {}", report.codec);
            println!("  Init: {}", report.init.as_deref().unwrap_or("(none)"));
            println!("  Timescale: {}", report.timescale);
            println!("  Entries: {}", report.entries);
            println!("  Segments: {}", report.segments);
            println!("  First position: {:?}", report.first_position);
            println!("  Last position: {:?}", report.last_position);

            for lookup in &report.lookups {
                println!("\nAt {}s:", lookup.time);
                if lookup.needs_refresh {
                    println!("  Timeline needs refresh");
                }
                if lookup.segments.is_empty() {
                    println!("  No segment found");
                }
                for segment in &lookup.segments {
                    println!("  {}", output::segment_line(segment));
                }
            }
        }
    }

    Ok(())
}

/// Buffer each position in turn and report what stays resident
pub async fn seek(
    track_path: &Path,
    base: &str,
    times: &[f64],
    config: EngineConfig,
    format: &str,
) -> anyhow::Result<()> {
    let track = JsonTimelineSource::new(track_path)
        .load()
        .await
        .with_context(|| format!("loading track {}", track_path.display()))?;
    let fetcher = fetcher_for(base)?;
    let sink = Arc::new(MemorySink::new());

    let engine = BufferEngine::builder(fetcher, sink.clone())
        .config(config)
        .track(track)
        .spawn()?;
    info!(engine = %engine.id(), base, "Seeking {} positions", times.len());

    let mut events = engine.subscribe();
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::RefreshNeeded { time } => warn!(time, "Timeline needs refresh"),
                EngineEvent::Disposed => break,
                event => debug!(?event, "Engine event"),
            }
        }
    });

    let json = matches!(OutputFormat::from(format), OutputFormat::Json);
    let mut steps = Vec::with_capacity(times.len());
    let mut failed = false;

    for &time in times {
        let outcome = engine.ensure_coverage(time).await;
        let resident = engine.buffered_ranges().await.unwrap_or_default();

        if !json {
            match &outcome {
                Ok(()) => println!("{:>10.3}s  ok      {}", time, output::ranges_line(&resident)),
                Err(e) => println!("{:>10.3}s  {:<7} {}", time, e.error_code(), e),
            }
        }

        failed = outcome.as_ref().is_err_and(|e| e.is_fatal());
        steps.push(SeekStep {
            time,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            code: outcome.as_ref().err().map(|e| e.error_code()),
            resident,
        });
        if failed {
            break;
        }
    }

    if json {
        println!("{}", output::to_json(&steps));
    } else {
        println!("\nResident bytes: {}", sink.byte_len());
    }

    engine.dispose();
    let _ = logger.await;

    if failed {
        anyhow::bail!("engine disposed after a fatal error");
    }
    Ok(())
}

/// HTTP(S) bases fetch over the network, anything else is a local directory
fn fetcher_for(base: &str) -> anyhow::Result<Arc<dyn SegmentFetcher>> {
    match Url::parse(base) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let fetcher = HttpFetcher::new(directory_url(url), &FetcherConfig::default())?;
            Ok(Arc::new(fetcher))
        }
        _ => Ok(Arc::new(DirectoryFetcher::new(base))),
    }
}

/// Make relative locators resolve below the base path rather than beside it
fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_url() {
        let url = directory_url(Url::parse("https://cdn.example.com/thumbs").unwrap());
        assert_eq!(url.join("tile-1.jpg").unwrap().as_str(), "https://cdn.example.com/thumbs/tile-1.jpg");

        let url = directory_url(Url::parse("https://cdn.example.com/thumbs/").unwrap());
        assert_eq!(url.as_str(), "https://cdn.example.com/thumbs/");
    }
}

//! Timeline sources
//!
//! A [`TimelineSource`] supplies the track description an engine starts with
//! and the replacements handed to
//! [`BufferEngine::update_track`](crate::engine::BufferEngine::update_track).
//! The engine only reports staleness through
//! [`EngineEvent::RefreshNeeded`](crate::types::EngineEvent); acting on it is
//! the source's job.

use crate::{timeline::Track, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Supplier of track descriptions
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Load the current track description
    async fn load(&self) -> Result<Track>;
}

/// Reads a JSON track description from disk on every load
pub struct JsonTimelineSource {
    path: PathBuf,
}

impl JsonTimelineSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TimelineSource for JsonTimelineSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Track> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let track = Track::from_json(&content)?;

        debug!(
            entries = track.timeline.entries().len(),
            timescale = track.timeline.timescale(),
            "Track description loaded"
        );

        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineIndex;

    #[tokio::test]
    async fn test_json_source_reloads() {
        let path = std::env::temp_dir().join(format!("trickline-track-{}.json", std::process::id()));
        let source = JsonTimelineSource::new(&path);

        tokio::fs::write(
            &path,
            r#"{ "codec": "video/mp4", "timeline": { "timescale": 1, "entries": [{ "ts": 0, "d": 2, "r": 1 }] } }"#,
        )
        .await
        .unwrap();
        let track = source.load().await.unwrap();
        assert_eq!(TimelineIndex::last_position(&track.timeline), Some(4.0));

        tokio::fs::write(
            &path,
            r#"{ "codec": "video/mp4", "timeline": { "timescale": 1, "entries": [{ "ts": 0, "d": 2, "r": 3 }] } }"#,
        )
        .await
        .unwrap();
        let track = source.load().await.unwrap();
        assert_eq!(TimelineIndex::last_position(&track.timeline), Some(8.0));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_source_missing_file() {
        let source = JsonTimelineSource::new("/nonexistent/trickline/track.json");
        let err = source.load().await.unwrap_err();
        assert_eq!(err.error_code(), "IO");
    }
}

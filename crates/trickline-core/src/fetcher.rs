//! Segment fetching
//!
//! The engine asks a [`SegmentFetcher`] for segment bytes and never retries on
//! its own. Timeouts and retries belong to the fetcher implementation.

use crate::{types::FetcherConfig, Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

/// Source of segment bytes
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Fetch the bytes behind `locator`
    async fn fetch(&self, locator: &str) -> Result<Bytes>;
}

/// Fetches segments over HTTP, resolving locators against a base URL
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
}

impl HttpFetcher {
    pub fn new(base_url: Url, config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn resolve(&self, locator: &str) -> Result<Url> {
        self.base_url
            .join(locator)
            .map_err(|e| Error::fetch(locator, format!("invalid locator: {}", e)))
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let url = self.resolve(locator)?;
        let start = Instant::now();

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let data = response.bytes().await?;

        debug!(
            url = %url,
            bytes = data.len(),
            duration_ms = start.elapsed().as_millis(),
            "Segment fetched"
        );

        Ok(data)
    }
}

/// Reads segments from files below a root directory
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        self.root.join(locator.trim_start_matches('/'))
    }
}

#[async_trait]
impl SegmentFetcher for DirectoryFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let path = self.resolve(locator);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fetch(locator, format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), bytes = data.len(), "Segment read");

        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_locator_resolution() {
        let base = Url::parse("https://cdn.example.com/vod/trick/").unwrap();
        let fetcher = HttpFetcher::new(base, &FetcherConfig::default()).unwrap();

        assert_eq!(
            fetcher.resolve("frag-20.m4s").unwrap().as_str(),
            "https://cdn.example.com/vod/trick/frag-20.m4s"
        );
        assert_eq!(
            fetcher.resolve("/other/init.mp4").unwrap().as_str(),
            "https://cdn.example.com/other/init.mp4"
        );
    }

    #[tokio::test]
    async fn test_directory_fetcher() {
        let root = std::env::temp_dir().join(format!("trickline-fetch-{}", std::process::id()));
        tokio::fs::create_dir_all(&root).await.unwrap();
        tokio::fs::write(root.join("seg-1.m4s"), b"moof").await.unwrap();

        let fetcher = DirectoryFetcher::new(&root);
        let data = fetcher.fetch("seg-1.m4s").await.unwrap();
        assert_eq!(&data[..], b"moof");

        let err = fetcher.fetch("missing.m4s").await.unwrap_err();
        assert_eq!(err.error_code(), "SEGMENT_FETCH");
        assert!(err.is_fatal());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}

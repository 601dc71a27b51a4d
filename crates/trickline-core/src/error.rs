//! Error types for Trickline Core

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
///
/// Cloneable so that one pipeline outcome can be delivered to every caller
/// coalesced onto it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Resolution errors
    #[error("No segment found near position {time}s")]
    NoSegmentFound { time: f64 },

    #[error("No timeline configured")]
    NoTimelineConfigured,

    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),

    // Lifecycle errors
    #[error("Engine disposed")]
    Disposed,

    #[error("Request superseded by a newer target")]
    Cancelled,

    // Fetch errors
    #[error("Failed to fetch segment {locator}: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("HTTP error: {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    // Sink errors
    #[error("Buffer sink error: {0}")]
    Sink(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl Error {
    /// Create a fetch error for a locator
    pub fn fetch(locator: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Error::Sink(msg.into())
    }

    /// Returns true if this error leaves buffer state untrustworthy.
    ///
    /// A fatal error tears the whole engine down; every other error only
    /// rejects the request that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. }
                | Error::HttpStatus { .. }
                | Error::Network(_)
                | Error::Sink(_)
                | Error::Io(_)
        )
    }

    /// Returns the error code for reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NoSegmentFound { .. } => "NO_SEGMENT",
            Error::NoTimelineConfigured => "NO_TIMELINE",
            Error::InvalidTimeline(_) => "INVALID_TIMELINE",
            Error::Disposed => "DISPOSED",
            Error::Cancelled => "CANCELLED",
            Error::Fetch { .. } => "SEGMENT_FETCH",
            Error::HttpStatus { .. } => "HTTP_STATUS",
            Error::Network(_) => "NETWORK",
            Error::Sink(_) => "SINK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
        }
    }
}

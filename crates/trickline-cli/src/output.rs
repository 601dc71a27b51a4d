//! Output formatting for CLI

use serde::Serialize;
use trickline_core::{CoveredRange, Segment};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON rendering of a report
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// One-line rendering of a segment
pub fn segment_line(segment: &Segment) -> String {
    format!("{} {}", segment.range(), segment.location)
}

/// Comma-separated resident ranges, or `(empty)`
pub fn ranges_line(ranges: &[CoveredRange]) -> String {
    if ranges.is_empty() {
        return "(empty)".to_string();
    }
    ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

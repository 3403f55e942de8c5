//! Evidence extraction
//!
//! Turns the raw material attached to a ticket into structured evidence: request
//! identifiers and timestamps from HAR captures, search parameters from log-search
//! links, and identifiers from free text.

mod capture;
mod identifiers;
mod query_url;
mod resolver;

pub use capture::{
    extract_from_capture, Capture, CaptureContent, CaptureEntry, CaptureFindings, CaptureLog,
    CaptureOptions, CaptureRequest, CaptureResponse, FailedRequest, Header, Informational,
};
pub use identifiers::{extract_emails, extract_identifiers, first_email};
pub use query_url::{
    parse_query_url, parse_time_expression, DetectedUrl, PartialSearch, SearchUrlDetector,
    UrlKind,
};
pub use resolver::{cookie_header, FetchResponse, HttpFetcher, ReqwestFetcher, UrlResolver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Invalid search parameters: {0}")]
    InvalidParameters(String),

    #[error("Malformed capture: {context}: {source}")]
    MalformedCapture {
        source: serde_json::Error,
        context: String,
    },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Invalid URL pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Where a piece of evidence came from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Capture,
    Url,
    Manual,
}

impl std::fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Capture => "capture",
            Self::Url => "url",
            Self::Manual => "manual",
        })
    }
}

/// Identifiers and timestamps gathered from one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceBundle {
    pub identifiers: BTreeSet<String>,
    pub timestamps: BTreeSet<DateTime<Utc>>,
    pub source: EvidenceSource,
}

impl EvidenceBundle {
    pub fn new(source: EvidenceSource) -> Self {
        Self {
            identifiers: BTreeSet::new(),
            timestamps: BTreeSet::new(),
            source,
        }
    }
}

/// Inclusive UTC time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub gte: DateTime<Utc>,
    pub lte: DateTime<Utc>,
}

/// A complete, valid log search
///
/// Construction enforces `gte <= lte` and a non-blank query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchParameters {
    pod: String,
    index_pattern: String,
    query_string: String,
    time_range: TimeRange,
}

impl SearchParameters {
    pub fn new(
        pod: impl Into<String>,
        index_pattern: impl Into<String>,
        query_string: impl Into<String>,
        gte: DateTime<Utc>,
        lte: DateTime<Utc>,
    ) -> Result<Self, EvidenceError> {
        let query_string = query_string.into().trim().to_string();
        if query_string.is_empty() {
            return Err(EvidenceError::InvalidParameters(
                "query string is empty".to_string(),
            ));
        }
        if gte > lte {
            return Err(EvidenceError::InvalidParameters(format!(
                "time range starts after it ends ({} > {})",
                gte.to_rfc3339(),
                lte.to_rfc3339()
            )));
        }

        Ok(Self {
            pod: pod.into(),
            index_pattern: index_pattern.into(),
            query_string,
            time_range: TimeRange { gte, lte },
        })
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn index_pattern(&self) -> &str {
        &self.index_pattern
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }
}

//! HAR capture parsing

use super::identifiers::extract_identifiers;
use super::{EvidenceBundle, EvidenceError, EvidenceSource};
use crate::config::TriageConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Header names whose values commonly carry request identifiers
const ID_HEADER_MARKERS: &[&str] = &["correlation", "request-id", "trace"];

/// A HAR file: `log.entries[]`
#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub log: CaptureLog,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureLog {
    #[serde(default)]
    pub entries: Vec<CaptureEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureEntry {
    #[serde(rename = "startedDateTime", default)]
    pub started_date_time: Option<String>,
    #[serde(default)]
    pub request: CaptureRequest,
    #[serde(default)]
    pub response: CaptureResponse,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureResponse {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub content: CaptureContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureContent {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Capture {
    pub fn from_path(path: &Path) -> Result<Self, EvidenceError> {
        let content = std::fs::read_to_string(path).map_err(|e| EvidenceError::Io {
            source: e,
            context: format!("Failed to read capture: {:?}", path),
        })?;
        serde_json::from_str(&content).map_err(|e| EvidenceError::MalformedCapture {
            source: e,
            context: format!("{:?}", path),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, EvidenceError> {
        serde_json::from_str(json).map_err(|e| EvidenceError::MalformedCapture {
            source: e,
            context: "inline capture".to_string(),
        })
    }
}

/// Limits applied while scanning a capture
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Only scan entries with status >= 400
    pub errors_only: bool,
    pub max_entries: usize,
    pub body_scan_chars: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            errors_only: true,
            max_entries: 10,
            body_scan_chars: 1000,
        }
    }
}

impl From<&TriageConfig> for CaptureOptions {
    fn from(config: &TriageConfig) -> Self {
        Self {
            errors_only: config.errors_only,
            max_entries: config.max_capture_entries,
            body_scan_chars: config.body_scan_chars,
        }
    }
}

/// A scanned request, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRequest {
    pub status: i64,
    pub method: String,
    pub url: String,
    pub started: Option<String>,
}

/// Why a capture produced no evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Informational {
    NoEntries,
    NoFailures { total: usize },
}

/// Result of scanning a capture. Neither variant is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureFindings {
    Evidence {
        bundle: EvidenceBundle,
        total_entries: usize,
        failed_entries: usize,
        scanned: Vec<FailedRequest>,
    },
    Informational(Informational),
}

impl CaptureFindings {
    pub fn bundle(&self) -> Option<&EvidenceBundle> {
        match self {
            Self::Evidence { bundle, .. } => Some(bundle),
            Self::Informational(_) => None,
        }
    }
}

/// Extract identifiers and timestamps from the failing entries of a capture
pub fn extract_from_capture(capture: &Capture, options: &CaptureOptions) -> CaptureFindings {
    let entries = &capture.log.entries;
    if entries.is_empty() {
        return CaptureFindings::Informational(Informational::NoEntries);
    }

    let selected: Vec<&CaptureEntry> = entries
        .iter()
        .filter(|entry| !options.errors_only || entry.response.status >= 400)
        .collect();

    if selected.is_empty() {
        return CaptureFindings::Informational(Informational::NoFailures {
            total: entries.len(),
        });
    }

    let mut bundle = EvidenceBundle::new(EvidenceSource::Capture);
    let mut scanned = Vec::new();

    for entry in selected.iter().take(options.max_entries) {
        if let Some(started) = &entry.started_date_time {
            match DateTime::parse_from_rfc3339(started) {
                Ok(ts) => {
                    bundle.timestamps.insert(ts.with_timezone(&Utc));
                }
                Err(e) => debug!("Ignoring unparseable startedDateTime '{}': {}", started, e),
            }
        }

        bundle
            .identifiers
            .extend(extract_identifiers(&entry.request.url));

        for header in entry
            .request
            .headers
            .iter()
            .chain(entry.response.headers.iter())
        {
            let name = header.name.to_ascii_lowercase();
            if ID_HEADER_MARKERS.iter().any(|marker| name.contains(marker)) {
                bundle.identifiers.extend(extract_identifiers(&header.value));
            }
        }

        if let Some(body) = &entry.response.content.text {
            let head: String = body.chars().take(options.body_scan_chars).collect();
            bundle.identifiers.extend(extract_identifiers(&head));
        }

        scanned.push(FailedRequest {
            status: entry.response.status,
            method: entry.request.method.clone(),
            url: entry.request.url.clone(),
            started: entry.started_date_time.clone(),
        });
    }

    debug!(
        "Capture: {} entries, {} selected, {} identifiers",
        entries.len(),
        selected.len(),
        bundle.identifiers.len()
    );

    CaptureFindings::Evidence {
        bundle,
        total_entries: entries.len(),
        failed_entries: selected.len(),
        scanned,
    }
}

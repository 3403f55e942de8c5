//! Query building and triage
//!
//! Gathers evidence for a ticket, picks exactly one search plan through an ordered
//! rule table, and either runs the log search or explains why it did not.

mod engine;
mod logsearch;
mod rules;
mod types;

pub use engine::{Triage, TriageDecision, TriageReport};
pub use logsearch::{build_msearch_body, parse_msearch_response, HttpLogSearch, LogSearch};
pub use rules::{
    extract_error_text, manual_query, select_search_plan, AuthMatcher, PlanInputs, SearchPlan,
    SETTLED_SOURCES,
};
pub use types::{Attachment, ReplyContext, Ticket};

use crate::evidence::EvidenceError;
use thiserror::Error;

/// Asked of the reporter when there is nothing to search with, or nothing was found
pub const REPRODUCE_REQUEST: &str =
    "Please reproduce the issue and provide Haystack log URL or HAR file.";

/// Asked of the reporter when an authentication issue arrives without a capture or URL
pub const AUTH_REQUEST: &str = "Please provide a HAR file or Haystack log URL. This appears to be \
     an authentication issue handled by the identity platform team; once a HAR file is \
     attached it can be moved to them.";

#[derive(Error, Debug)]
pub enum LogSearchError {
    #[error("Log search requires authentication on pod {pod}; refresh the configured cookies")]
    AuthenticationRequired { pod: String },

    #[error("No URL configured for pod {0}")]
    UnknownPod(String),

    #[error("Log search request to {url} timed out")]
    Timeout { url: String },

    #[error("Log search request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Unexpected log search response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Invalid auth keyword pattern: {0}")]
    InvalidKeyword(#[from] regex::Error),

    #[error("Failed to read ticket: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Malformed ticket: {0}")]
    MalformedTicket(#[from] serde_json::Error),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    LogSearch(#[from] LogSearchError),
}

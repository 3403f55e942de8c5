//! Search plan selection
//!
//! Everything here is pure. Evidence is gathered by the caller beforehand.

use super::Ticket;
use crate::config::TriageConfig;
use crate::evidence::{first_email, EvidenceBundle, EvidenceSource, SearchParameters};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"(?i)\b(?:error|exception|failed|failure|fatal)\b"));

/// Sources strong enough that an auth-looking ticket is still searched
pub const SETTLED_SOURCES: &[EvidenceSource] = &[EvidenceSource::Capture, EvidenceSource::Url];

/// The one search a triage run will issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPlan {
    pub source: EvidenceSource,
    pub params: SearchParameters,
}

/// Evidence already gathered for a ticket
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    pub ticket: &'a Ticket,
    pub capture: Option<&'a EvidenceBundle>,
    pub url: Option<&'a SearchParameters>,
    pub config: &'a TriageConfig,
    pub default_pod: &'a str,
    pub index_pattern: &'a str,
}

impl PlanInputs<'_> {
    fn pod(&self) -> &str {
        self.ticket.pod.as_deref().unwrap_or(self.default_pod)
    }

    /// Reporter's window, else the lookback period ending at ticket creation
    fn manual_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        if let Some(window) = self.ticket.issue_window {
            return (window.gte, window.lte);
        }
        let lookback = Duration::try_days(self.config.lookback_days).unwrap_or_else(Duration::zero);
        let created = self.ticket.created_at;
        (created - lookback, created)
    }
}

type Rule = fn(&PlanInputs<'_>) -> Option<SearchParameters>;

const RULES: &[(EvidenceSource, Rule)] = &[
    (EvidenceSource::Capture, capture_rule),
    (EvidenceSource::Url, url_rule),
    (EvidenceSource::Manual, manual_rule),
];

/// Pick the first rule that yields valid search parameters
pub fn select_search_plan(inputs: &PlanInputs<'_>) -> Option<SearchPlan> {
    RULES.iter().find_map(|(source, rule)| {
        rule(inputs).map(|params| SearchPlan {
            source: *source,
            params,
        })
    })
}

fn capture_rule(inputs: &PlanInputs<'_>) -> Option<SearchParameters> {
    let bundle = inputs.capture?;
    if bundle.identifiers.is_empty() {
        return None;
    }

    let query = bundle
        .identifiers
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" OR ");

    let (gte, lte) = match (bundle.timestamps.first(), bundle.timestamps.last()) {
        (Some(first), Some(last)) => {
            let buffer = Duration::try_minutes(inputs.config.capture_buffer_minutes)
                .unwrap_or_else(Duration::zero);
            (*first - buffer, *last + buffer)
        }
        _ => inputs.manual_window(),
    };

    SearchParameters::new(inputs.pod(), inputs.index_pattern, query, gte, lte).ok()
}

fn url_rule(inputs: &PlanInputs<'_>) -> Option<SearchParameters> {
    inputs.url.cloned()
}

fn manual_rule(inputs: &PlanInputs<'_>) -> Option<SearchParameters> {
    let query = manual_query(inputs.ticket, inputs.config.max_error_text_chars)?;
    let (gte, lte) = inputs.manual_window();
    SearchParameters::new(inputs.pod(), inputs.index_pattern, query, gte, lte).ok()
}

/// Search terms from ticket fields: account id, quoted email, quoted error text
pub fn manual_query(ticket: &Ticket, max_error_chars: usize) -> Option<String> {
    let mut terms = Vec::new();

    if let Some(account) = ticket.account_id.as_deref().map(str::trim) {
        if !account.is_empty() {
            terms.push(account.to_string());
        }
    }

    let email = ticket
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .or_else(|| first_email(&ticket.description));
    if let Some(email) = email {
        terms.push(format!("\"{}\"", email.trim()));
    }

    if let Some(error) = extract_error_text(&ticket.full_text(), max_error_chars) {
        terms.push(format!("\"{}\"", error));
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

/// First line that reads like an error message, whitespace-collapsed and truncated
pub fn extract_error_text(text: &str, max_chars: usize) -> Option<String> {
    let line = text.lines().find(|line| ERROR_LINE.is_match(line))?;
    let cleaned = line
        .replace(['"', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let truncated: String = cleaned.chars().take(max_chars).collect();
    let truncated = truncated.trim();
    (!truncated.is_empty()).then(|| truncated.to_string())
}

/// Word-bounded, case-insensitive keyword match over ticket text
#[derive(Debug, Clone)]
pub struct AuthMatcher {
    pattern: Option<Regex>,
}

impl AuthMatcher {
    pub fn new(keywords: &[String]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// The first keyword found, lowercased
    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern
            .as_ref()?
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }
}

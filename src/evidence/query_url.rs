//! Log-search URL detection and parsing
//!
//! Search state lives in the URL fragment as rison (`_g=(time:(from:…,to:…))&_a=(…)`).
//! Only the three sub-expressions needed for a search are read; the rest of the
//! fragment is ignored.

use super::identifiers::first_email;
use super::{EvidenceError, SearchParameters};
use crate::config::{LogSearchConfig, UrlResolutionConfig};
use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

// Rison values are either quoted ('…' with ! escapes) or bare words like now-15m.
static TIME: Lazy<Regex> = Lazy::new(|| {
    compile_regex(
        r"time:\(from:(?:'((?:[^'!]|!.)*)'|([^,)']+)),to:(?:'((?:[^'!]|!.)*)'|([^,)']+))\)",
    )
});

static INDEX_PATTERN: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"indexPatternTitle:(?:'((?:[^'!]|!.)*)'|([^,)']+))"));

static QUERY: Lazy<Regex> = Lazy::new(|| {
    compile_regex(r"query:\(language:lucene,query:(?:'((?:[^'!]|!.)*)'|([^,)']+))\)")
});

static RELATIVE_TIME: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"^now(?:([+-])(\d+)([smhdwMy]))?(?:/[smhdwMy])?$"));

/// Search parameters read from a URL, possibly incomplete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialSearch {
    pub url: String,
    pub pod: String,
    pub index_pattern: String,
    pub query_string: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub email: Option<String>,
}

impl PartialSearch {
    /// Resolve time expressions against `now` and validate.
    ///
    /// Requires a query string and a lower bound. A missing upper bound means `now`.
    pub fn complete(&self, now: DateTime<Utc>) -> Option<SearchParameters> {
        let query = self.query_string.as_deref()?;
        let gte = parse_time_expression(self.from.as_deref()?, now)?;
        let lte = match self.to.as_deref() {
            Some(expr) => parse_time_expression(expr, now)?,
            None => now,
        };

        match SearchParameters::new(&self.pod, &self.index_pattern, query, gte, lte) {
            Ok(params) => Some(params),
            Err(e) => {
                debug!("Discarding search from {}: {}", self.url, e);
                None
            }
        }
    }
}

/// Extract search parameters from a full log-search URL.
///
/// Returns `None` when the URL cannot be parsed or has no fragment.
pub fn parse_query_url(url: &str, config: &LogSearchConfig) -> Option<PartialSearch> {
    let parsed = url::Url::parse(url).ok()?;
    let fragment = parsed.fragment().filter(|f| !f.is_empty())?;
    let fragment = match urlencoding::decode(fragment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(fragment.as_bytes()))
            .into_owned(),
    };

    let (from, to) = match TIME.captures(&fragment) {
        Some(caps) => (rison_value(&caps, 1, 2), rison_value(&caps, 3, 4)),
        None => (None, None),
    };

    let index_pattern = INDEX_PATTERN
        .captures(&fragment)
        .and_then(|caps| rison_value(&caps, 1, 2))
        .unwrap_or_else(|| config.default_index_pattern.clone());

    let query_string = QUERY
        .captures(&fragment)
        .and_then(|caps| rison_value(&caps, 1, 2))
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty());

    let pod = parsed
        .host_str()
        .and_then(|host| config.pod_for_host(host))
        .unwrap_or(config.default_pod.as_str())
        .to_string();

    let email = query_string.as_deref().and_then(first_email);

    Some(PartialSearch {
        url: url.to_string(),
        pod,
        index_pattern,
        query_string,
        from,
        to,
        email,
    })
}

fn rison_value(caps: &Captures<'_>, quoted: usize, bare: usize) -> Option<String> {
    if let Some(m) = caps.get(quoted) {
        return Some(unescape_rison(m.as_str()));
    }
    caps.get(bare).map(|m| m.as_str().trim().to_string())
}

fn unescape_rison(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '!' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse an absolute (RFC 3339) or relative (`now-15m`, `now-7d/d`) time expression.
///
/// Rounding suffixes are accepted and ignored. Months are calendar months and years
/// are twelve of them.
pub fn parse_time_expression(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = expr.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(expr) {
        return Some(ts.with_timezone(&Utc));
    }

    let caps = RELATIVE_TIME.captures(expr)?;
    let (Some(sign), Some(amount), Some(unit)) = (caps.get(1), caps.get(2), caps.get(3)) else {
        return Some(now);
    };

    let amount: i64 = amount.as_str().parse().ok()?;
    let negative = sign.as_str() == "-";

    let months = match unit.as_str() {
        "M" => Some(amount),
        "y" => amount.checked_mul(12),
        _ => None,
    };
    if let Some(months) = months {
        let months = Months::new(u32::try_from(months).ok()?);
        return if negative {
            now.checked_sub_months(months)
        } else {
            now.checked_add_months(months)
        };
    }

    let delta = match unit.as_str() {
        "s" => Duration::try_seconds(amount)?,
        "m" => Duration::try_minutes(amount)?,
        "h" => Duration::try_hours(amount)?,
        "d" => Duration::try_days(amount)?,
        "w" => Duration::try_weeks(amount)?,
        _ => return None,
    };
    if negative {
        now.checked_sub_signed(delta)
    } else {
        now.checked_add_signed(delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// Needs resolving before it can be parsed
    Short,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedUrl {
    pub url: String,
    pub kind: UrlKind,
}

/// Finds log-search links for the configured pods in free text
pub struct SearchUrlDetector {
    pattern: Option<Regex>,
}

impl SearchUrlDetector {
    pub fn from_config(
        log_search: &LogSearchConfig,
        resolution: &UrlResolutionConfig,
    ) -> Result<Self, EvidenceError> {
        let hosts = log_search.hosts();
        if hosts.is_empty() {
            return Ok(Self { pattern: None });
        }

        let hosts = hosts
            .iter()
            .map(|h| regex::escape(h))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r#"(?i)https?://(?:{hosts})(?:({short})[A-Za-z0-9]+|({dest})[^\s<>"]*)"#,
            hosts = hosts,
            short = regex::escape(&resolution.short_path),
            dest = regex::escape(&resolution.destination_path),
        );

        Ok(Self {
            pattern: Some(Regex::new(&pattern)?),
        })
    }

    /// Every distinct link in order of first appearance
    pub fn find(&self, text: &str) -> Vec<DetectedUrl> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let kind = if caps.get(1).is_some() {
                UrlKind::Short
            } else {
                UrlKind::Direct
            };
            let url = trim_trailing_punctuation(whole.as_str());
            if seen.insert(url.to_string()) {
                found.push(DetectedUrl {
                    url: url.to_string(),
                    kind,
                });
            }
        }
        found
    }
}

/// Drop sentence punctuation and unbalanced closing brackets glued to a link
fn trim_trailing_punctuation(url: &str) -> &str {
    let mut url = url;
    loop {
        let Some(last) = url.chars().last() else {
            return url;
        };
        let unbalanced = match last {
            ')' => url.matches(')').count() > url.matches('(').count(),
            ']' => url.matches(']').count() > url.matches('[').count(),
            '.' | ',' | ';' | ':' | '?' | '\'' => true,
            _ => false,
        };
        if !unbalanced {
            return url;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

static UUID: Lazy<Regex> = Lazy::new(|| {
    compile_regex(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b"));

/// Canonical 8-4-4-4-12 hex identifiers, lowercased and deduplicated
pub fn extract_identifiers(text: &str) -> BTreeSet<String> {
    UUID.find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Email addresses in order of first appearance
pub fn extract_emails(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    EMAIL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|email| seen.insert(email.to_ascii_lowercase()))
        .collect()
}

pub fn first_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_string())
}

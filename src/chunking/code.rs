//! Definition-aware segmentation for source code
//!
//! Headings are found line by line with per-language regexes. A definition runs until
//! the next definition at the same or a shallower indentation, so nested definitions
//! stay with their parent.

use super::segment::{Segment, Split};
use super::{joined_len, trimmed_len, ChunkKind, Language};
use crate::config::ChunkingConfig;
use once_cell::sync::Lazy;
use regex::Regex;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

/// Words that look like `name(...) {` in JavaScript but are control flow
const JS_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "else", "do", "with",
];

/// A definition heading
#[derive(Debug, Clone)]
struct Heading {
    line: usize,
    indent: usize,
    name: String,
    kind: ChunkKind,
}

fn patterns(language: Language) -> &'static [(Lazy<Regex>, ChunkKind)] {
    static RUBY: [(Lazy<Regex>, ChunkKind); 3] = [
        (
            Lazy::new(|| compile_regex(r"^(?P<indent>\s*)class\s+(?P<name>[A-Z][\w:]*)")),
            ChunkKind::Class,
        ),
        (
            Lazy::new(|| compile_regex(r"^(?P<indent>\s*)module\s+(?P<name>[A-Z][\w:]*)")),
            ChunkKind::Module,
        ),
        (
            Lazy::new(|| compile_regex(r"^(?P<indent>\s*)def\s+(?P<name>[^\s(;]+)")),
            ChunkKind::Method,
        ),
    ];
    static PYTHON: [(Lazy<Regex>, ChunkKind); 2] = [
        (
            Lazy::new(|| compile_regex(r"^(?P<indent>\s*)class\s+(?P<name>\w+)\s*[:(]")),
            ChunkKind::Class,
        ),
        (
            Lazy::new(|| compile_regex(r"^(?P<indent>\s*)(?:async\s+)?def\s+(?P<name>\w+)\s*\(")),
            ChunkKind::Method,
        ),
    ];
    static JAVASCRIPT: [(Lazy<Regex>, ChunkKind); 4] = [
        (
            Lazy::new(|| {
                compile_regex(r"^(?P<indent>\s*)(?:export\s+)?(?:default\s+)?class\s+(?P<name>\w+)")
            }),
            ChunkKind::Class,
        ),
        (
            Lazy::new(|| {
                compile_regex(
                    r"^(?P<indent>\s*)(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+(?P<name>\w+)",
                )
            }),
            ChunkKind::Method,
        ),
        (
            Lazy::new(|| {
                compile_regex(
                    r"^(?P<indent>\s*)(?:export\s+)?(?:const|let|var)\s+(?P<name>\w+)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|\w+\s*=>)",
                )
            }),
            ChunkKind::Method,
        ),
        (
            Lazy::new(|| {
                compile_regex(
                    r"^(?P<indent>\s+)(?:static\s+)?(?:async\s+)?(?:get\s+|set\s+)?(?P<name>\w+)\s*\([^)]*\)\s*\{",
                )
            }),
            ChunkKind::Method,
        ),
    ];
    static RUST: [(Lazy<Regex>, ChunkKind); 4] = [
        (
            Lazy::new(|| {
                compile_regex(
                    r#"^(?P<indent>\s*)(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|const|unsafe)\s+|extern\s+(?:"[^"]+"\s+)?)*fn\s+(?P<name>\w+)"#,
                )
            }),
            ChunkKind::Method,
        ),
        (
            Lazy::new(|| {
                compile_regex(
                    r"^(?P<indent>\s*)(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|union)\s+(?P<name>\w+)",
                )
            }),
            ChunkKind::Class,
        ),
        (
            Lazy::new(|| {
                compile_regex(r"^(?P<indent>\s*)(?:unsafe\s+)?impl(?:<[^>]*>)?\s+(?P<name>[^{]*[^{\s])")
            }),
            ChunkKind::Class,
        ),
        (
            Lazy::new(|| {
                compile_regex(r"^(?P<indent>\s*)(?:pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>\w+)\s*\{")
            }),
            ChunkKind::Module,
        ),
    ];
    static GO: [(Lazy<Regex>, ChunkKind); 2] = [
        (
            Lazy::new(|| {
                compile_regex(r"^(?P<indent>\s*)func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)\s*[\[(]")
            }),
            ChunkKind::Method,
        ),
        (
            Lazy::new(|| {
                compile_regex(r"^(?P<indent>\s*)type\s+(?P<name>\w+)\s+(?:struct|interface)\b")
            }),
            ChunkKind::Class,
        ),
    ];

    match language {
        Language::Ruby => &RUBY,
        Language::Python => &PYTHON,
        Language::JavaScript => &JAVASCRIPT,
        Language::Rust => &RUST,
        Language::Go => &GO,
    }
}

fn find_headings(language: Language, lines: &[&str]) -> Vec<Heading> {
    let patterns = patterns(language);
    let mut headings = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        for (regex, kind) in patterns {
            let Some(caps) = regex.captures(line) else {
                continue;
            };
            let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            if language == Language::JavaScript && JS_KEYWORDS.contains(&name) {
                continue;
            }
            let indent = caps.name("indent").map(|m| m.as_str().chars().count()).unwrap_or(0);
            headings.push(Heading {
                line: index,
                indent,
                name: name.to_string(),
                kind: *kind,
            });
            break;
        }
    }

    headings
}

/// Segment a source file into definition-sized pieces
pub(super) fn segments(
    language: Language,
    lines: &[&str],
    config: &ChunkingConfig,
) -> Vec<Segment> {
    let headings = find_headings(language, lines);
    let mut planner = Planner {
        lines,
        headings: &headings,
        config,
        segments: Vec::new(),
    };

    match headings.first() {
        Some(first) => {
            planner.keep(0, first.line, None, ChunkKind::Module);
            planner.partition(first.line, lines.len());
        }
        None => planner.keep(0, lines.len(), None, ChunkKind::Module),
    }

    planner.segments
}

struct Planner<'a> {
    lines: &'a [&'a str],
    headings: &'a [Heading],
    config: &'a ChunkingConfig,
    segments: Vec<Segment>,
}

impl Planner<'_> {
    /// Split `[start, end)`, which begins at a heading, into one segment per definition
    fn partition(&mut self, start: usize, end: usize) {
        let headings = self.headings;
        let inner: Vec<&Heading> = headings
            .iter()
            .filter(|h| h.line >= start && h.line < end)
            .collect();

        let mut cursor = start;
        for (position, heading) in inner.iter().enumerate() {
            if heading.line < cursor {
                continue;
            }
            let definition_end = inner[position + 1..]
                .iter()
                .find(|next| next.indent <= heading.indent)
                .map(|next| next.line)
                .unwrap_or(end);

            self.definition(heading, definition_end);
            cursor = definition_end;
        }
    }

    fn definition(&mut self, heading: &Heading, end: usize) {
        let start = heading.line;
        let oversized = joined_len(self.lines, start, end) > self.config.max_chunk_chars;
        let first_nested = self
            .headings
            .iter()
            .find(|h| h.line > start && h.line < end)
            .map(|h| h.line);

        match first_nested {
            Some(nested) if oversized => {
                self.keep(start, nested, Some(heading.name.clone()), heading.kind);
                self.partition(nested, end);
            }
            _ => self.keep(start, end, Some(heading.name.clone()), heading.kind),
        }
    }

    /// Keep a segment unless its trimmed text is below the minimum size
    fn keep(&mut self, start: usize, end: usize, name: Option<String>, kind: ChunkKind) {
        if start >= end {
            return;
        }
        if trimmed_len(self.lines, start, end) < self.config.min_chunk_chars {
            tracing::trace!("Dropping short segment at line {}", start + 1);
            return;
        }
        self.segments.push(Segment {
            start,
            end,
            name,
            kind,
            split: Split::Lines,
        });
    }
}

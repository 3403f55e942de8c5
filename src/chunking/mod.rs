//! Document chunking
//!
//! Splits a document into bounded, positioned chunks for embedding. The strategy is
//! chosen once per document from its [`DocumentKind`]:
//!
//! - code: one chunk per definition (class, module, method), nested definitions stay
//!   inside their parent unless the parent is too large
//! - structured config: one chunk per top-level key or table
//! - generic: overlapping sliding windows of lines
//!
//! Code and config fall back to the generic strategy when they produce nothing.

mod code;
mod segment;
mod structured;

use crate::config::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use segment::{Segment, SegmentWriter, Split};

/// Programming languages with definition-aware chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ruby,
    Python,
    JavaScript,
    Rust,
    Go,
}

/// Structured configuration formats chunked by top-level key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

/// How a document is chunked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Code(Language),
    StructuredConfig(ConfigFormat),
    Generic,
}

impl DocumentKind {
    /// Resolve the chunking strategy from a file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("rb") => Self::Code(Language::Ruby),
            Some("py") => Self::Code(Language::Python),
            Some("js" | "jsx" | "ts" | "tsx" | "mjs") => Self::Code(Language::JavaScript),
            Some("rs") => Self::Code(Language::Rust),
            Some("go") => Self::Code(Language::Go),
            Some("yml" | "yaml") => Self::StructuredConfig(ConfigFormat::Yaml),
            Some("toml") => Self::StructuredConfig(ConfigFormat::Toml),
            _ => Self::Generic,
        }
    }
}

/// Semantic kind of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    Class,
    Method,
    Module,
    ConfigSection,
    Generic,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Method => "method",
            Self::Module => "module",
            Self::ConfigSection => "config-section",
            Self::Generic => "generic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(Self::Class),
            "method" => Some(Self::Method),
            "module" => Some(Self::Module),
            "config-section" => Some(Self::ConfigSection),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document-level metadata copied onto every chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// A document ready for chunking
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the indexed root (or a synthetic path for wiki pages)
    pub path: String,
    pub text: String,
    pub kind: DocumentKind,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document whose kind is resolved from the path's extension
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let kind = DocumentKind::from_path(Path::new(&path));
        Self {
            path,
            text: text.into(),
            kind,
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A bounded, positioned piece of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{path}:{start_line}`, or `{path}:{start_line}+{char_offset}` for pieces of one long line
    pub id: String,
    pub text: String,
    pub path: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub name: Option<String>,
    pub kind: ChunkKind,
    pub metadata: DocumentMetadata,
}

/// Splits documents into chunks according to their kind
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk a document. Blank documents produce no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let lines: Vec<&str> = document.text.lines().collect();
        if lines.iter().all(|line| line.trim().is_empty()) {
            return Vec::new();
        }

        let mut segments = match document.kind {
            DocumentKind::Code(language) => code::segments(language, &lines, &self.config),
            DocumentKind::StructuredConfig(format) => {
                structured::segments(format, &lines, &self.config)
            }
            DocumentKind::Generic => Vec::new(),
        };

        if segments.is_empty() {
            if document.kind != DocumentKind::Generic {
                tracing::debug!(
                    "No semantic segments in {}, using sliding windows",
                    document.path
                );
            }
            segments.push(self.generic_segment(lines.len()));
        }

        let mut writer = SegmentWriter::new(document, &lines, self.config.max_chunk_chars);
        for segment in segments {
            writer.write(segment);
        }
        writer.finish()
    }

    fn generic_segment(&self, line_count: usize) -> Segment {
        Segment {
            start: 0,
            end: line_count,
            name: None,
            kind: ChunkKind::Generic,
            split: Split::Windows {
                lines: self.config.window_lines,
                overlap: self.config.window_overlap_lines,
            },
        }
    }
}

/// Character length of the joined text of `lines[start..end]`
pub(crate) fn joined_len(lines: &[&str], start: usize, end: usize) -> usize {
    let body: usize = lines[start..end].iter().map(|l| l.chars().count()).sum();
    body + (end - start).saturating_sub(1)
}

/// Trimmed character length of the joined text of `lines[start..end]`
pub(crate) fn trimmed_len(lines: &[&str], start: usize, end: usize) -> usize {
    lines[start..end].join("\n").trim().chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker() -> Chunker {
        Chunker::new(ChunkingConfig::default())
    }

    #[test]
    fn test_strategy_table() {
        let cases = [
            ("app/models/user.rb", DocumentKind::Code(Language::Ruby)),
            ("lib/tool.py", DocumentKind::Code(Language::Python)),
            ("web/App.TSX", DocumentKind::Code(Language::JavaScript)),
            ("src/main.rs", DocumentKind::Code(Language::Rust)),
            ("cmd/server.go", DocumentKind::Code(Language::Go)),
            ("config/app.yml", DocumentKind::StructuredConfig(ConfigFormat::Yaml)),
            ("Cargo.toml", DocumentKind::StructuredConfig(ConfigFormat::Toml)),
            ("README.md", DocumentKind::Generic),
            ("Makefile", DocumentKind::Generic),
        ];

        for (path, expected) in cases {
            assert_eq!(DocumentKind::from_path(Path::new(path)), expected, "{}", path);
        }
    }

    #[test]
    fn test_blank_document_has_no_chunks() {
        let doc = Document::new("empty.rb", "\n   \n\t\n");
        assert!(chunker().chunk(&doc).is_empty());
    }

    #[test]
    fn test_generic_windows_cover_every_line() {
        let text: String = (1..=120).map(|i| format!("line number {}\n", i)).collect();
        let doc = Document::new("notes.txt", text);
        let chunks = chunker().chunk(&doc);

        let starts: Vec<usize> = chunks.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, vec![1, 46, 91]);
        assert_eq!(chunks.last().map(|c| c.end_line), Some(120));

        for line in 1..=120 {
            assert!(
                chunks
                    .iter()
                    .any(|c| c.start_line <= line && line <= c.end_line),
                "line {} not covered",
                line
            );
        }
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Generic));
    }

    #[test]
    fn test_final_window_is_not_pure_overlap() {
        let text: String = (1..=50).map(|i| format!("row {}\n", i)).collect();
        let chunks = chunker().chunk(&Document::new("rows.txt", text));
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 50));
    }

    #[test]
    fn test_long_line_is_split_by_characters() {
        let config = ChunkingConfig {
            max_chunk_chars: 100,
            min_chunk_chars: 10,
            ..ChunkingConfig::default()
        };
        let text = format!("short\n{}\nshort again\n", "x".repeat(250));
        let chunks = Chunker::new(config).chunk(&Document::new("blob.txt", text));

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["blob.txt:1", "blob.txt:2+0", "blob.txt:2+100", "blob.txt:2+200", "blob.txt:3"]
        );
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
    }

    #[test]
    fn test_metadata_copied_to_chunks() {
        let metadata = DocumentMetadata {
            collection: Some("wiki".to_string()),
            title: Some("Runbook".to_string()),
            ..Default::default()
        };
        let doc = Document::new("wiki/OPS/42", "Restart the worker when the queue stalls.")
            .with_metadata(metadata.clone());

        let chunks = chunker().chunk(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata, metadata);
    }

    #[test]
    fn test_chunk_kind_names() {
        for kind in [
            ChunkKind::Class,
            ChunkKind::Method,
            ChunkKind::Module,
            ChunkKind::ConfigSection,
            ChunkKind::Generic,
        ] {
            assert_eq!(ChunkKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChunkKind::ConfigSection.to_string(), "config-section");
    }
}

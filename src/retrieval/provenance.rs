//! Retrieved chunks with their source location, and context rendering

use crate::chunking::{ChunkKind, DocumentMetadata};
use crate::index::Neighbor;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A query match with full provenance and untruncated text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub name: Option<String>,
    pub kind: ChunkKind,
    /// `clamp(1 - distance, 0, 1)`, higher is better
    pub relevance: f32,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl From<Neighbor> for RetrievedChunk {
    fn from(neighbor: Neighbor) -> Self {
        let chunk = neighbor.chunk;
        Self {
            id: chunk.id,
            path: chunk.path,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            name: chunk.name,
            kind: chunk.kind,
            relevance: (1.0 - neighbor.distance).clamp(0.0, 1.0),
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// Outcome of a retrieval query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "matches", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The collection holds no entries yet
    NotIndexed,
    /// Matches in relevance order; empty means nothing relevant was found
    Matches(Vec<RetrievedChunk>),
}

impl QueryOutcome {
    pub fn matches(&self) -> &[RetrievedChunk] {
        match self {
            Self::NotIndexed => &[],
            Self::Matches(matches) => matches,
        }
    }
}

pub const NOT_INDEXED_MESSAGE: &str =
    "The collection has not been indexed yet. Run `ticketscope index` (or `index-wiki`) first.";

pub const NO_MATCH_MESSAGE: &str = "No relevant code found for this question.";

/// Format an outcome as a context block for a language model
pub fn render_context(outcome: &QueryOutcome) -> String {
    let matches = match outcome {
        QueryOutcome::NotIndexed => return NOT_INDEXED_MESSAGE.to_string(),
        QueryOutcome::Matches(matches) if matches.is_empty() => {
            return NO_MATCH_MESSAGE.to_string()
        }
        QueryOutcome::Matches(matches) => matches,
    };

    let mut out = String::new();
    for (i, chunk) in matches.iter().enumerate() {
        let label = if chunk.metadata.space.is_some() {
            "Page"
        } else {
            "Code"
        };
        let _ = writeln!(
            out,
            "[{} {}: {}:{}-{}] {} / {}",
            label,
            i + 1,
            chunk.path,
            chunk.start_line,
            chunk.end_line,
            chunk.kind,
            chunk.name.as_deref().unwrap_or("-"),
        );
        let _ = writeln!(out, "Relevance: {:.2}", chunk.relevance);
        if let Some(title) = &chunk.metadata.title {
            let _ = writeln!(out, "Title: {}", title);
        }
        if let Some(url) = &chunk.metadata.url {
            let _ = writeln!(out, "URL: {}", url);
        }
        let _ = writeln!(out, "```\n{}\n```\n", chunk.text);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;
    use pretty_assertions::assert_eq;

    fn neighbor(distance: f32) -> Neighbor {
        Neighbor {
            chunk: Chunk {
                id: "app/models/user.rb:12".to_string(),
                text: "def locked?\n  failed_attempts >= 5\nend".to_string(),
                path: "app/models/user.rb".to_string(),
                start_line: 12,
                end_line: 14,
                name: Some("locked?".to_string()),
                kind: ChunkKind::Method,
                metadata: DocumentMetadata::default(),
            },
            distance,
            seq: 1,
        }
    }

    #[test]
    fn test_relevance_is_clamped() {
        assert_eq!(RetrievedChunk::from(neighbor(0.25)).relevance, 0.75);
        assert_eq!(RetrievedChunk::from(neighbor(1.6)).relevance, 0.0);
        assert_eq!(RetrievedChunk::from(neighbor(-0.0001)).relevance, 1.0);
    }

    #[test]
    fn test_render_messages() {
        assert_eq!(render_context(&QueryOutcome::NotIndexed), NOT_INDEXED_MESSAGE);
        assert_eq!(
            render_context(&QueryOutcome::Matches(Vec::new())),
            NO_MATCH_MESSAGE
        );
    }

    #[test]
    fn test_render_matches() {
        let outcome = QueryOutcome::Matches(vec![RetrievedChunk::from(neighbor(0.1))]);
        let rendered = render_context(&outcome);

        assert!(rendered.starts_with("[Code 1: app/models/user.rb:12-14] method / locked?\n"));
        assert!(rendered.contains("Relevance: 0.90"));
        assert!(rendered.contains("failed_attempts >= 5"));
    }
}

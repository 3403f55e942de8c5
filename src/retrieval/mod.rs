//! Retrieval engine
//!
//! Index phase: walk a source, chunk, embed, upsert. Query phase: embed the question
//! with the same provider and return the nearest chunks with their provenance.

mod engine;
mod provenance;
mod source;

pub use engine::{IndexReport, RetrievalEngine};
pub use provenance::{
    render_context, QueryOutcome, RetrievedChunk, NOT_INDEXED_MESSAGE, NO_MATCH_MESSAGE,
};
pub use source::{DocumentSource, FileTreeSource, PageExportSource, SourceBatch, WikiPage};

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Index was built with {index_model}, provider is {provider_model}")]
    ModelMismatch {
        index_model: String,
        provider_model: String,
    },

    #[error("Invalid include pattern: {0}")]
    InvalidPattern(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index failed: {0}")]
    Index(#[from] IndexError),
}

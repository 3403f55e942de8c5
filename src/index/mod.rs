//! Durable embedding index
//!
//! One SQLite file per collection holding chunks, their vectors and content hashes.
//! Queries are exact: every stored vector is compared with the query vector.
//!
//! Only one process may write a collection file during an index run.

mod store;
pub mod vector;

pub use store::{EmbeddingIndex, IndexEntry, Neighbor, StoredEntry};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error(
        "Index was built with {stored_model} ({stored_dimension}D), cannot use {model} ({dimension}D); rebuild the collection"
    )]
    ModelMismatch {
        stored_model: String,
        stored_dimension: usize,
        model: String,
        dimension: usize,
    },

    #[error("Vector for {id} has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Corrupt entry {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// BLAKE3 hex digest of a chunk's text
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Embedding generation
///
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - Batched embedding for indexing throughput
mod batch;
mod provider;

pub use batch::{BatchEmbedder, BatchResult};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

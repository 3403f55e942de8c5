use super::source::{DocumentSource, FileTreeSource};
use super::{QueryOutcome, RetrievedChunk, SearchError};
use crate::chunking::{Chunk, Chunker, Document};
use crate::config::Config;
use crate::embedding::{BatchEmbedder, EmbeddingProvider};
use crate::index::{content_hash, EmbeddingIndex, IndexEntry};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Summary of one index run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub documents: usize,
    pub unreadable: usize,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_unchanged: usize,
    pub duration_ms: u64,
}

/// Indexes documents into one collection and answers questions against it
pub struct RetrievalEngine {
    provider: Arc<dyn EmbeddingProvider>,
    index: EmbeddingIndex,
    chunker: Chunker,
    collection: String,
    batch_size: usize,
}

impl RetrievalEngine {
    /// Build an engine. The provider must produce the embedding space the index was
    /// built with.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: EmbeddingIndex,
        chunker: Chunker,
        collection: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, SearchError> {
        if provider.model_name() != index.model() || provider.dimension() != index.dimension() {
            return Err(SearchError::ModelMismatch {
                index_model: index.model().to_string(),
                provider_model: provider.model_name().to_string(),
            });
        }

        Ok(Self {
            provider,
            index,
            chunker,
            collection: collection.into(),
            batch_size: batch_size.max(1),
        })
    }

    /// Open the configured collection file for `collection`
    pub fn open(
        config: &Config,
        collection: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> crate::Result<Self> {
        let path = config.collection_path(collection)?;
        let index = EmbeddingIndex::open(&path, provider.model_name(), provider.dimension())?
            .with_batch_size(config.index.upsert_batch_size);
        let chunker = Chunker::new(config.chunking.clone());

        Ok(Self::new(
            provider,
            index,
            chunker,
            collection,
            config.embedding.batch_size,
        )?)
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index every matching file under `root`
    pub fn index_tree(
        &self,
        root: &Path,
        filters: &[String],
        exclusions: &[String],
        max_files: Option<usize>,
    ) -> Result<IndexReport, SearchError> {
        let source = FileTreeSource::new(root, filters, exclusions, max_files)?;
        self.index_source(&source)
    }

    pub fn index_source(&self, source: &dyn DocumentSource) -> Result<IndexReport, SearchError> {
        info!(
            "Indexing {} into collection '{}'",
            source.describe(),
            self.collection
        );
        let batch = source.load()?;
        self.index_documents(batch.documents, batch.unreadable.len())
    }

    /// Chunk, embed and store documents. Chunks whose text hash is already stored under
    /// the same id are not embedded again.
    pub fn index_documents(
        &self,
        documents: Vec<Document>,
        unreadable: usize,
    ) -> Result<IndexReport, SearchError> {
        let start = Instant::now();
        let mut report = IndexReport {
            documents: documents.len(),
            unreadable,
            ..Default::default()
        };

        let chunks: Vec<Chunk> = documents
            .into_iter()
            .map(|mut document| {
                if document.metadata.collection.is_none() {
                    document.metadata.collection = Some(self.collection.clone());
                }
                document
            })
            .flat_map(|document| self.chunker.chunk(&document))
            .collect();
        report.chunks_total = chunks.len();

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let stored = self.index.content_hashes(&ids)?;

        let pending: Vec<(Chunk, String)> = chunks
            .into_iter()
            .map(|chunk| {
                let hash = content_hash(&chunk.text);
                (chunk, hash)
            })
            .filter(|(chunk, hash)| stored.get(&chunk.id) != Some(hash))
            .collect();
        report.chunks_unchanged = report.chunks_total - pending.len();

        debug!(
            "{} chunks to embed, {} unchanged",
            pending.len(),
            report.chunks_unchanged
        );

        let embedder = BatchEmbedder::new(self.provider.clone(), self.batch_size);
        for group in pending.chunks(self.index.batch_size()) {
            let texts: Vec<String> = group.iter().map(|(chunk, _)| chunk.text.clone()).collect();
            let vectors = embedder.process(&texts)?.vectors;

            let entries: Vec<IndexEntry> = group
                .iter()
                .zip(vectors)
                .map(|((chunk, hash), vector)| IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                    content_hash: hash.clone(),
                })
                .collect();

            report.chunks_embedded += self.index.upsert(&entries)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexed {} documents into '{}': {} chunks, {} embedded, {} unchanged, {} unreadable ({}ms)",
            report.documents,
            self.collection,
            report.chunks_total,
            report.chunks_embedded,
            report.chunks_unchanged,
            report.unreadable,
            report.duration_ms
        );

        Ok(report)
    }

    /// Find the chunks closest to a natural-language question
    pub fn query(&self, question: &str, top_k: usize) -> Result<QueryOutcome, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        if self.index.count()? == 0 {
            return Ok(QueryOutcome::NotIndexed);
        }

        let vector = self.provider.embed(question)?;
        let matches: Vec<RetrievedChunk> = self
            .index
            .query(&vector, top_k)?
            .into_iter()
            .map(RetrievedChunk::from)
            .collect();

        debug!(
            "Query matched {} chunks in '{}'",
            matches.len(),
            self.collection
        );

        Ok(QueryOutcome::Matches(matches))
    }
}

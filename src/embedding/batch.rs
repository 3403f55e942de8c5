/// Batched embedding generation for indexing
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of batch processing
#[derive(Debug)]
pub struct BatchResult {
    pub vectors: Vec<Vec<f32>>,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Splits a list of texts into provider calls of at most `batch_size` texts
///
/// Batching is purely for throughput: the output has one vector per input, in input
/// order. The first failing batch aborts the whole run.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn process(&self, texts: &[String]) -> Result<BatchResult, EmbeddingError> {
        let start = std::time::Instant::now();
        let mut vectors = Vec::with_capacity(texts.len());
        let mut batches = 0;

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.provider.embed_batch(chunk)?;

            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }

            for embedding in &embeddings {
                if embedding.len() != self.provider.dimension() {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.provider.dimension(),
                        actual: embedding.len(),
                    });
                }
            }

            vectors.extend(embeddings);
            batches += 1;
            debug!("Embedded batch {} ({} texts)", batches, chunk.len());
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        if !texts.is_empty() {
            info!(
                "Embedded {} texts in {} batches, {}ms",
                texts.len(),
                batches,
                duration_ms
            );
        }

        Ok(BatchResult {
            vectors,
            batches,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that encodes each text's length and counts its calls
    struct CountingProvider {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    /// Provider that always returns one vector too few
    struct ShortProvider;

    impl EmbeddingProvider for ShortProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![0.0]; texts.len().saturating_sub(1)])
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "short"
        }
    }

    #[test]
    fn test_batches_preserve_order() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let embedder = BatchEmbedder::new(provider.clone(), 2);

        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = embedder.process(&texts).unwrap();

        assert_eq!(result.batches, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        let lengths: Vec<f32> = result.vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let embedder = BatchEmbedder::new(provider.clone(), 8);

        let result = embedder.process(&[]).unwrap();
        assert!(result.vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_count_mismatch_is_terminal() {
        let embedder = BatchEmbedder::new(Arc::new(ShortProvider), 4);
        let texts = vec!["x".to_string(), "y".to_string()];
        assert!(matches!(
            embedder.process(&texts),
            Err(EmbeddingError::GenerationError(_))
        ));
    }
}

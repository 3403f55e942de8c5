/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// The same provider must be used to index a collection and to query it; the index
/// records `model_name()` and `dimension()` and refuses to mix embedding spaces.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use.
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty texts here would misalign vectors with their inputs
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at position {}",
                position
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

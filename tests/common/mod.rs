//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use ticketscope::embedding::{EmbeddingError, EmbeddingProvider};
use ticketscope::evidence::{EvidenceError, FetchResponse, HttpFetcher, SearchParameters};
use ticketscope::triage::{LogSearch, LogSearchError};

pub const DIMENSION: usize = 64;

/// Bag-of-words vectors hashed into a fixed number of buckets
pub struct HashEmbedder {
    model: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimension: DIMENSION,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Resolves every short link to the same final URL
pub struct FixedFetcher {
    pub final_url: String,
}

impl HttpFetcher for FixedFetcher {
    fn head(&self, _url: &str, _cookies: Option<&str>) -> Result<FetchResponse, EvidenceError> {
        Ok(FetchResponse {
            final_url: self.final_url.clone(),
            status: 200,
        })
    }
}

/// Fails the test if any link is resolved
pub struct UnreachableFetcher;

impl HttpFetcher for UnreachableFetcher {
    fn head(&self, url: &str, _cookies: Option<&str>) -> Result<FetchResponse, EvidenceError> {
        panic!("no link should be resolved, got {url}");
    }
}

/// Returns fixed messages and records every search
#[derive(Clone, Default)]
pub struct RecordingLogSearch {
    pub messages: Vec<String>,
    pub calls: Arc<Mutex<Vec<SearchParameters>>>,
}

impl RecordingLogSearch {
    pub fn returning(messages: &[&str]) -> Self {
        Self {
            messages: messages.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<SearchParameters> {
        self.calls.lock().unwrap().clone()
    }
}

impl LogSearch for RecordingLogSearch {
    fn search(&self, params: &SearchParameters) -> Result<Vec<String>, LogSearchError> {
        self.calls.lock().unwrap().push(params.clone());
        Ok(self.messages.clone())
    }
}

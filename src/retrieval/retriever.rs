//! Query-time retrieval against a vector collection

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retrieval::RetrievedChunk;
use crate::storage::VectorStore;
use std::sync::Arc;
use tracing::debug;

/// Number of chunks retrieved when the caller does not say
pub const DEFAULT_K: usize = 4;

/// Embeds queries and returns the nearest chunks of one collection
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<VectorStore>,
    collection: String,
    min_score: Option<f32>,
}

impl Retriever {
    /// Bind a provider to a collection
    ///
    /// Fails when the collection does not exist or was built with a
    /// different model or dimension than `provider`.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<VectorStore>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        let info = store
            .collection_info(&collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.clone()))?;

        if info.dimension != provider.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: info.dimension,
                actual: provider.dimension(),
            });
        }

        if info.model != provider.model_name() {
            return Err(RagError::EmbeddingModelMismatch {
                indexed: info.model,
                query: provider.model_name().to_string(),
            });
        }

        Ok(Self {
            provider,
            store,
            collection,
            min_score: None,
        })
    }

    /// Drop hits worse than `min_score`
    ///
    /// For cosine collections a hit needs a similarity of at least
    /// `min_score`; for euclid collections a distance of at most `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Top-`k` chunks for `query`, best first, in index order
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(query)?;
        let collection = self.store.collection(&self.collection)?;
        let higher_is_better = collection.spec().distance.higher_is_better();

        let hits = collection.index().search(&vector, k)?;
        let total = hits.len();

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| match self.min_score {
                Some(min) if higher_is_better => hit.score >= min,
                Some(max) => hit.score <= max,
                None => true,
            })
            .map(RetrievedChunk::from)
            .collect();

        debug!(
            "Retrieved {} chunks ({} before score filter) for k={}",
            chunks.len(),
            total,
            k
        );

        Ok(chunks)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }
}

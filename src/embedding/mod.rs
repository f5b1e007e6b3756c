/// Embedding & Indexing
///
/// Local embedding generation and nearest-neighbour search:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - HNSW vector index with JSON payloads
/// - IndexBuilder to embed the chunk corpus into a collection
mod batch;
mod provider;
mod vector_index;

pub use batch::{BatchResult, IndexBuilder};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{
    Distance, IndexParams, Payload, PointRecord, ScoredPoint, VectorIndex, VectorIndexError,
};

use crate::config::IndexConfig;

impl From<&IndexConfig> for IndexParams {
    fn from(config: &IndexConfig) -> Self {
        Self {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
        }
    }
}

/// Batch embedding of the chunk corpus into a vector collection
use super::{EmbeddingProvider, PointRecord};
use crate::error::{RagError, Result};
use crate::ingest::Chunk;
use crate::storage::{point_id, CollectionSpec, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of an index build
#[derive(Debug)]
pub struct BatchResult {
    pub collection: String,
    pub processed: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Embeds chunks in batches and rebuilds a collection from them
///
/// The collection is replaced only once every batch has been embedded, so a
/// failing model call leaves the previous collection untouched.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<VectorStore>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<VectorStore>, batch_size: usize) -> Self {
        Self {
            provider,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed `chunks` and rebuild `spec.name` with them
    ///
    /// `spec.dimension` and `spec.model` must describe the provider.
    pub fn build(&self, spec: CollectionSpec, chunks: &[Chunk]) -> Result<BatchResult> {
        let start = Instant::now();

        if spec.dimension != self.provider.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: spec.dimension,
                actual: self.provider.dimension(),
            });
        }
        if spec.model != self.provider.model_name() {
            return Err(RagError::EmbeddingModelMismatch {
                indexed: spec.model.clone(),
                query: self.provider.model_name().to_string(),
            });
        }

        info!(
            "Embedding {} chunks into {} (batch size {})",
            chunks.len(),
            spec.name,
            self.batch_size
        );

        let mut points = Vec::with_capacity(chunks.len());
        let mut batches = 0;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts)?;

            for (chunk, vector) in batch.iter().zip(vectors) {
                points.push(PointRecord::new(
                    point_id(&chunk.chunk_id),
                    vector,
                    chunk.to_payload(),
                ));
            }

            batches += 1;
            debug!("Embedded batch {} ({} chunks)", batches, batch.len());
        }

        let collection = spec.name.clone();
        let processed = self.store.rebuild_collection(spec, points)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Index build complete: {} points in {}, {}ms",
            processed, collection, duration_ms
        );

        Ok(BatchResult {
            collection,
            processed,
            batches,
            duration_ms,
        })
    }
}

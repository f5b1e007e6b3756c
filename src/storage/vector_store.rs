//! Named vector collections with optional SQLite persistence

use crate::embedding::{Distance, IndexParams, PointRecord, ScoredPoint, VectorIndex, VectorIndexError};
use crate::error::{RagError, Result};
use crate::storage::database::Database;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Derive the point id of a chunk: the first 8 bytes of its BLAKE3 digest
pub fn point_id(chunk_id: &str) -> u64 {
    let hash = blake3::hash(chunk_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Fixed properties of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    /// Embedding model that produced the vectors
    pub model: String,
}

/// Summary of a live collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    pub model: String,
    pub points: usize,
    pub created_at: DateTime<Utc>,
}

/// A built, read-only collection
pub struct Collection {
    spec: CollectionSpec,
    created_at: DateTime<Utc>,
    index: VectorIndex,
}

impl Collection {
    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.spec.name.clone(),
            dimension: self.spec.dimension,
            distance: self.spec.distance,
            model: self.spec.model.clone(),
            points: self.index.len(),
            created_at: self.created_at,
        }
    }
}

/// Vector store holding any number of named collections
///
/// Every mutation builds a complete staging index off to the side, persists
/// it, then swaps the live `Arc`. Readers holding the previous collection
/// finish against it undisturbed and never observe a partial rebuild.
pub struct VectorStore {
    database: Option<Database>,
    params: IndexParams,
    collections: RwLock<AHashMap<String, Arc<Collection>>>,
    /// Serializes writers so concurrent upserts cannot drop each other's points
    writer: Mutex<()>,
}

impl VectorStore {
    /// A store that lives only in memory
    pub fn in_memory(params: IndexParams) -> Self {
        Self {
            database: None,
            params,
            collections: RwLock::new(AHashMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Open a persistent store, rebuilding every collection's graph
    pub fn open(db_path: &Path, params: IndexParams) -> Result<Self> {
        let database = Database::new(db_path)?;
        let mut collections = AHashMap::new();

        for row in database.load_collections()? {
            let points = database.load_points(&row.spec.name)?;
            let index = VectorIndex::build(row.spec.dimension, row.spec.distance, params, points)?;
            info!(
                "Loaded collection {} ({} points, {})",
                row.spec.name,
                index.len(),
                row.spec.model
            );
            collections.insert(
                row.spec.name.clone(),
                Arc::new(Collection {
                    spec: row.spec,
                    created_at: row.created_at,
                    index,
                }),
            );
        }

        Ok(Self {
            database: Some(database),
            params,
            collections: RwLock::new(collections),
            writer: Mutex::new(()),
        })
    }

    /// Drop any existing collection of that name and create it empty
    pub fn recreate_collection(&self, spec: CollectionSpec) -> Result<()> {
        self.rebuild_collection(spec, Vec::new()).map(|_| ())
    }

    /// Replace a collection with exactly `points`
    pub fn rebuild_collection(&self, spec: CollectionSpec, points: Vec<PointRecord>) -> Result<usize> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        check_batch(&points)?;

        let created_at = Utc::now();
        let index = VectorIndex::build(spec.dimension, spec.distance, self.params, points)?;

        if let Some(db) = &self.database {
            db.replace_collection(&spec, created_at, index.points())?;
        }

        let count = index.len();
        info!("Rebuilt collection {} with {} points", spec.name, count);
        self.swap(Collection {
            spec,
            created_at,
            index,
        });

        Ok(count)
    }

    /// Insert or replace points in an existing collection
    ///
    /// A point replaces a stored one only when both carry the same
    /// `chunk_id`; distinct chunks hashing to one id are a collision error.
    pub fn upsert(&self, name: &str, points: Vec<PointRecord>) -> Result<usize> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.collection(name)?;
        check_batch(&points)?;

        for point in &points {
            if let Some(existing) = current.index.get(point.id) {
                let (old, new) = (chunk_key(existing), chunk_key(point));
                if old != new {
                    return Err(RagError::PointIdCollision {
                        first: old,
                        second: new,
                    });
                }
            }
        }

        let replaced: ahash::AHashSet<u64> = points.iter().map(|p| p.id).collect();
        let mut merged: Vec<PointRecord> = current
            .index
            .points()
            .iter()
            .filter(|p| !replaced.contains(&p.id))
            .cloned()
            .collect();
        let count = points.len();
        merged.extend(points);

        let index = VectorIndex::build(
            current.spec.dimension,
            current.spec.distance,
            self.params,
            merged,
        )?;

        if let Some(db) = &self.database {
            let changed: Vec<PointRecord> = index
                .points()
                .iter()
                .filter(|p| replaced.contains(&p.id))
                .cloned()
                .collect();
            db.upsert_points(name, &changed)?;
        }

        debug!("Upserted {} points into {}", count, name);
        self.swap(Collection {
            spec: current.spec.clone(),
            created_at: current.created_at,
            index,
        });

        Ok(count)
    }

    /// Nearest points to `vector`, best first, at most `k`
    pub fn search(&self, name: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredPoint>> {
        let collection = self.collection(name)?;
        Ok(collection.index.search(vector, k)?)
    }

    /// The live collection, shared with any in-flight readers
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    pub fn collection_info(&self, name: &str) -> Option<CollectionInfo> {
        self.collection(name).ok().map(|c| c.info())
    }

    /// All collections, sorted by name
    pub fn collections(&self) -> Vec<CollectionInfo> {
        let mut infos: Vec<CollectionInfo> = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn count(&self, name: &str) -> Result<usize> {
        Ok(self.collection(name)?.len())
    }

    pub fn is_persistent(&self) -> bool {
        self.database.is_some()
    }

    fn swap(&self, collection: Collection) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.spec.name.clone(), Arc::new(collection));
    }
}

fn chunk_key(point: &PointRecord) -> String {
    point
        .payload
        .get("chunk_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| point.id.to_string())
}

/// Reject repeated ids within one batch, naming both chunks on a collision
fn check_batch(points: &[PointRecord]) -> Result<()> {
    let mut seen: AHashMap<u64, String> = AHashMap::with_capacity(points.len());
    for point in points {
        let key = chunk_key(point);
        if let Some(first) = seen.get(&point.id) {
            if *first == key {
                return Err(VectorIndexError::DuplicateId(point.id).into());
            }
            return Err(RagError::PointIdCollision {
                first: first.clone(),
                second: key,
            });
        }
        seen.insert(point.id, key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Payload;
    use serde_json::json;

    fn spec(dimension: usize) -> CollectionSpec {
        CollectionSpec {
            name: "normativa".to_string(),
            dimension,
            distance: Distance::Cosine,
            model: "fake-model".to_string(),
        }
    }

    fn point(chunk_id: &str, vector: Vec<f32>) -> PointRecord {
        let mut payload = Payload::new();
        payload.insert("chunk_id".to_string(), json!(chunk_id));
        PointRecord::new(point_id(chunk_id), vector, payload)
    }

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("REG_p1_c0"), point_id("REG_p1_c0"));
        assert_ne!(point_id("REG_p1_c0"), point_id("REG_p1_c1"));
    }

    #[test]
    fn test_missing_collection() {
        let store = VectorStore::in_memory(IndexParams::default());
        assert!(matches!(
            store.search("nope", &[1.0], 1),
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(store.upsert("nope", Vec::new()).is_err());
    }

    #[test]
    fn test_recreate_then_upsert_and_search() {
        let store = VectorStore::in_memory(IndexParams::default());
        store.recreate_collection(spec(2)).unwrap();
        assert!(store.search("normativa", &[1.0, 0.0], 4).unwrap().is_empty());

        let inserted = store
            .upsert(
                "normativa",
                vec![point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])],
            )
            .unwrap();
        assert_eq!(inserted, 2);

        let hits = store.search("normativa", &[0.9, 0.1], 4).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload["chunk_id"], json!("a"));

        // Same chunk again replaces instead of duplicating
        store
            .upsert("normativa", vec![point("a", vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(store.count("normativa").unwrap(), 2);
    }

    #[test]
    fn test_dimension_mismatch_is_configuration_error() {
        let store = VectorStore::in_memory(IndexParams::default());
        store.recreate_collection(spec(3)).unwrap();

        let err = store
            .upsert("normativa", vec![point("a", vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(err.is_configuration());

        let err = store.search("normativa", &[1.0; 4], 1).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_duplicate_and_colliding_ids_rejected() {
        let store = VectorStore::in_memory(IndexParams::default());

        let err = store
            .rebuild_collection(spec(2), vec![point("a", vec![1.0, 0.0]), point("a", vec![0.0, 1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::VectorIndex(VectorIndexError::DuplicateId(_))));

        let mut forged = point("b", vec![0.0, 1.0]);
        forged.id = point_id("a");
        let err = store
            .rebuild_collection(spec(2), vec![point("a", vec![1.0, 0.0]), forged])
            .unwrap_err();
        assert!(matches!(err, RagError::PointIdCollision { .. }));

        // Nothing was swapped in
        assert!(store.collection("normativa").is_err());
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let store = VectorStore::in_memory(IndexParams::default());
        store
            .rebuild_collection(spec(2), vec![point("old", vec![1.0, 0.0])])
            .unwrap();

        let before = store.collection("normativa").unwrap();
        store
            .rebuild_collection(spec(2), vec![point("new1", vec![1.0, 0.0]), point("new2", vec![0.0, 1.0])])
            .unwrap();

        // A reader holding the old collection still sees it whole
        assert_eq!(before.len(), 1);

        let hits = store.search("normativa", &[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.payload["chunk_id"] != json!("old")));
    }

    #[test]
    fn test_persistent_store_reopens() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("vectors.sqlite");

        {
            let store = VectorStore::open(&path, IndexParams::default()).unwrap();
            assert!(store.is_persistent());
            store
                .rebuild_collection(spec(2), vec![point("a", vec![1.0, 0.0])])
                .unwrap();
            store
                .upsert("normativa", vec![point("b", vec![0.0, 1.0])])
                .unwrap();
        }

        let store = VectorStore::open(&path, IndexParams::default()).unwrap();
        let info = store.collection_info("normativa").unwrap();
        assert_eq!(info.points, 2);
        assert_eq!(info.model, "fake-model");

        let hits = store.search("normativa", &[0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].payload["chunk_id"], json!("b"));
    }
}

/// HNSW vector index for similarity search
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of HNSW layers
const MAX_LAYERS: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate point id: {0}")]
    DuplicateId(u64),

    #[error("Invalid vector for point {id}: {reason}")]
    InvalidVector { id: u64, reason: String },

    #[error("Unknown distance metric: {0}")]
    UnknownDistance(String),
}

/// Arbitrary JSON metadata stored next to each vector
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Distance metric of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity, reported as `1 - cosine distance` (higher is better)
    Cosine,
    /// Euclidean distance, reported as is (lower is better)
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::Euclid => "euclid",
        }
    }

    /// Whether a larger score means a closer match
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Distance::Cosine)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = VectorIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "euclid" | "euclidean" | "l2" => Ok(Distance::Euclid),
            other => Err(VectorIndexError::UnknownDistance(other.to_string())),
        }
    }
}

/// HNSW graph construction and search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    /// Connections per node per layer
    pub m: usize,
    /// Candidate list size during construction
    pub ef_construction: usize,
    /// Candidate list size during search (raised to `k` when smaller)
    pub ef_search: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// A vector with its id and payload, as inserted into an index
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl PointRecord {
    pub fn new(id: u64, vector: Vec<f32>, payload: Payload) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// Search hit with its score and a copy of the stored payload
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: u64,
    /// Cosine similarity for cosine collections, raw distance for euclid ones
    pub score: f32,
    pub payload: Payload,
}

enum Graph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclid(Hnsw<'static, f32, DistL2>),
}

impl Graph {
    fn new(distance: Distance, params: &IndexParams, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        match distance {
            Distance::Cosine => Graph::Cosine(Hnsw::<f32, DistCosine>::new(
                params.m,
                capacity,
                MAX_LAYERS,
                params.ef_construction,
                DistCosine,
            )),
            Distance::Euclid => Graph::Euclid(Hnsw::<f32, DistL2>::new(
                params.m,
                capacity,
                MAX_LAYERS,
                params.ef_construction,
                DistL2,
            )),
        }
    }

    fn insert(&self, vector: &Vec<f32>, slot: usize) {
        match self {
            Graph::Cosine(hnsw) => hnsw.insert((vector, slot)),
            Graph::Euclid(hnsw) => hnsw.insert((vector, slot)),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<Neighbour> {
        match self {
            Graph::Cosine(hnsw) => hnsw.search(query, k, ef),
            Graph::Euclid(hnsw) => hnsw.search(query, k, ef),
        }
    }
}

/// HNSW vector index wrapper
///
/// Points are addressed by a dense slot inside the graph and by their public
/// `u64` id outside of it. An index is built once and then only read; to
/// change its contents build a new one and swap it in (see `VectorStore`).
pub struct VectorIndex {
    graph: Graph,
    dimension: usize,
    distance: Distance,
    params: IndexParams,
    points: Vec<PointRecord>,
    slots: AHashMap<u64, usize>,
}

impl VectorIndex {
    /// Create an empty index
    pub fn new(dimension: usize, distance: Distance, params: IndexParams) -> Self {
        Self::with_capacity(dimension, distance, params, 0)
    }

    fn with_capacity(
        dimension: usize,
        distance: Distance,
        params: IndexParams,
        capacity: usize,
    ) -> Self {
        Self {
            graph: Graph::new(distance, &params, capacity),
            dimension,
            distance,
            params,
            points: Vec::with_capacity(capacity),
            slots: AHashMap::with_capacity(capacity),
        }
    }

    /// Build an index over `points`
    ///
    /// Fails on the first point with a wrong dimension, a non-finite
    /// component, or an id already present.
    pub fn build(
        dimension: usize,
        distance: Distance,
        params: IndexParams,
        points: Vec<PointRecord>,
    ) -> Result<Self, VectorIndexError> {
        let mut index = Self::with_capacity(dimension, distance, params, points.len());
        for point in points {
            index.insert(point)?;
        }
        Ok(index)
    }

    /// Insert a single point
    pub fn insert(&mut self, mut point: PointRecord) -> Result<(), VectorIndexError> {
        self.check_dimension(&point.vector)?;

        if self.slots.contains_key(&point.id) {
            return Err(VectorIndexError::DuplicateId(point.id));
        }

        if point.vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorIndexError::InvalidVector {
                id: point.id,
                reason: "non-finite component".to_string(),
            });
        }

        if self.distance == Distance::Cosine && !normalize(&mut point.vector) {
            return Err(VectorIndexError::InvalidVector {
                id: point.id,
                reason: "zero-length vector has no direction".to_string(),
            });
        }

        let slot = self.points.len();
        self.graph.insert(&point.vector, slot);
        self.slots.insert(point.id, slot);
        self.points.push(point);

        Ok(())
    }

    /// Search for the `k` nearest points, best first
    ///
    /// Returns every point when the index holds fewer than `k`, and nothing
    /// when it is empty or `k` is zero.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPoint>, VectorIndexError> {
        self.check_dimension(query)?;

        if k == 0 || self.points.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        if self.distance == Distance::Cosine && !normalize(&mut query) {
            // A zero query is equally far from everything
            return Ok(Vec::new());
        }

        let k = k.min(self.points.len());
        let ef = self.params.ef_search.max(k);
        let neighbours = self.graph.search(&query, k, ef);

        let mut results: Vec<ScoredPoint> = neighbours
            .into_iter()
            .filter_map(|n| {
                self.points.get(n.d_id).map(|point| ScoredPoint {
                    id: point.id,
                    score: match self.distance {
                        Distance::Cosine => 1.0 - n.distance,
                        Distance::Euclid => n.distance,
                    },
                    payload: point.payload.clone(),
                })
            })
            .collect();

        if self.distance.higher_is_better() {
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
        } else {
            results.sort_by(|a, b| a.score.total_cmp(&b.score));
        }
        results.truncate(k);

        Ok(results)
    }

    /// Look up a point by id
    pub fn get(&self, id: u64) -> Option<&PointRecord> {
        self.slots.get(&id).and_then(|slot| self.points.get(*slot))
    }

    /// All points in insertion order
    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn params(&self) -> IndexParams {
        self.params
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Scale to unit length in place; false for the zero vector
fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(chunk_id: &str) -> Payload {
        let mut map = Payload::new();
        map.insert("chunk_id".to_string(), json!(chunk_id));
        map
    }

    fn point(id: u64, vector: Vec<f32>) -> PointRecord {
        PointRecord::new(id, vector, payload(&format!("c{}", id)))
    }

    #[test]
    fn test_cosine_search_orders_best_first() {
        let index = VectorIndex::build(
            3,
            Distance::Cosine,
            IndexParams::default(),
            vec![
                point(1, vec![1.0, 0.0, 0.0]),
                point(2, vec![0.0, 1.0, 0.0]),
                point(3, vec![0.9, 0.1, 0.0]),
            ],
        )
        .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[1].id, 3);
        assert!(results[0].score >= results[1].score);
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert_eq!(results[0].payload["chunk_id"], json!("c1"));
    }

    #[test]
    fn test_fewer_points_than_k_returns_all() {
        let index = VectorIndex::build(
            2,
            Distance::Cosine,
            IndexParams::default(),
            vec![point(7, vec![1.0, 1.0]), point(8, vec![1.0, -1.0])],
        )
        .unwrap();

        let results = index.search(&[1.0, 0.5], 10).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let index = VectorIndex::new(4, Distance::Cosine, IndexParams::default());
        assert!(index.search(&[0.1, 0.2, 0.3, 0.4], 4).unwrap().is_empty());

        let index = VectorIndex::build(
            2,
            Distance::Cosine,
            IndexParams::default(),
            vec![point(1, vec![1.0, 0.0])],
        )
        .unwrap();
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorIndex::new(3, Distance::Cosine, IndexParams::default());
        let err = index.insert(point(1, vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            VectorIndexError::InvalidDimension {
                expected: 3,
                actual: 2
            }
        ));

        assert!(index.search(&[1.0; 5], 1).is_err());
    }

    #[test]
    fn test_duplicate_and_zero_vectors_rejected() {
        let mut index = VectorIndex::new(2, Distance::Cosine, IndexParams::default());
        index.insert(point(1, vec![1.0, 0.0])).unwrap();

        assert!(matches!(
            index.insert(point(1, vec![0.0, 1.0])),
            Err(VectorIndexError::DuplicateId(1))
        ));
        assert!(matches!(
            index.insert(point(2, vec![0.0, 0.0])),
            Err(VectorIndexError::InvalidVector { .. })
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_euclid_lower_is_better() {
        let index = VectorIndex::build(
            2,
            Distance::Euclid,
            IndexParams::default(),
            vec![point(1, vec![0.0, 0.0]), point(2, vec![3.0, 4.0])],
        )
        .unwrap();

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].id, 1);
        assert!(results[0].score <= results[1].score);
    }

    #[test]
    fn test_distance_parsing() {
        assert_eq!("cosine".parse::<Distance>().unwrap(), Distance::Cosine);
        assert_eq!("L2".parse::<Distance>().unwrap(), Distance::Euclid);
        assert!("dot".parse::<Distance>().is_err());
    }
}

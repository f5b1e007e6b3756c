//! Storage layer
//!
//! Persistent vector collections (SQLite + in-memory HNSW) and the CSV chunk
//! corpus produced by ingestion.

pub mod corpus;
pub mod database;
pub mod vector_store;

pub use corpus::ChunkCorpus;
pub use database::{Database, DbPool, DbStats};
pub use vector_store::{point_id, Collection, CollectionInfo, CollectionSpec, VectorStore};

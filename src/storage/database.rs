//! SQLite persistence for vector collections
//!
//! Vectors are stored as little-endian `f32` blobs next to their JSON
//! payload. The HNSW graph itself is never persisted; it is rebuilt from
//! these rows when a store is opened.

use crate::embedding::{Distance, Payload, PointRecord};
use crate::error::{RagError, Result};
use crate::storage::vector_store::CollectionSpec;
use chrono::{DateTime, TimeZone, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

/// A collection row as stored on disk
#[derive(Debug, Clone)]
pub struct CollectionRow {
    pub spec: CollectionSpec,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Open (or create) the database file and apply pending migrations
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::io(
                    e,
                    format!("Failed to create database directory: {:?}", parent),
                )
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| RagError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| RagError::Config(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| RagError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// All collections, by name
    pub fn load_collections(&self) -> Result<Vec<CollectionRow>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, dimension, distance, model, created_at
             FROM collections ORDER BY name",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, dimension, distance, model, created_at)| {
                let distance: Distance = distance.parse()?;
                Ok(CollectionRow {
                    spec: CollectionSpec {
                        name,
                        dimension: dimension as usize,
                        distance,
                        model,
                    },
                    created_at: timestamp(created_at),
                })
            })
            .collect()
    }

    /// Points of a collection in insertion order
    pub fn load_points(&self, collection: &str) -> Result<Vec<PointRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT point_id, vector, payload FROM points
             WHERE collection = ?1 ORDER BY seq",
        )?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, vector, payload)| {
                let payload: Payload =
                    serde_json::from_str(&payload).map_err(|e| RagError::Json {
                        source: e,
                        context: format!("Corrupt payload for point {} in {}", id, collection),
                    })?;
                Ok(PointRecord::new(id as u64, decode_vector(&vector)?, payload))
            })
            .collect()
    }

    /// Replace a collection and all its points in one transaction
    pub fn replace_collection(
        &self,
        spec: &CollectionSpec,
        created_at: DateTime<Utc>,
        points: &[PointRecord],
    ) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM collections WHERE name = ?1", params![spec.name])?;
        tx.execute(
            "INSERT INTO collections (name, dimension, distance, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.name,
                spec.dimension as i64,
                spec.distance.as_str(),
                spec.model,
                created_at.timestamp()
            ],
        )?;
        insert_points(&tx, &spec.name, points)?;

        tx.commit()?;
        Ok(())
    }

    /// Insert or replace points of an existing collection in one transaction
    pub fn upsert_points(&self, collection: &str, points: &[PointRecord]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(RagError::CollectionNotFound(collection.to_string()));
        }

        insert_points(&tx, collection, points)?;

        tx.commit()?;
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let collection_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))?;
        let point_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))?;

        Ok(DbStats {
            collection_count: collection_count as usize,
            point_count: point_count as usize,
        })
    }
}

fn insert_points(conn: &Connection, collection: &str, points: &[PointRecord]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO points (collection, point_id, vector, payload)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (collection, point_id)
         DO UPDATE SET vector = excluded.vector, payload = excluded.payload",
    )?;

    for point in points {
        let payload = serde_json::to_string(&point.payload).map_err(|e| RagError::Json {
            source: e,
            context: format!("Failed to serialize payload for point {}", point.id),
        })?;
        // u64 ids are stored bit-for-bit in SQLite's signed INTEGER
        stmt.execute(params![
            collection,
            point.id as i64,
            encode_vector(&point.vector),
            payload
        ])?;
    }

    Ok(())
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(RagError::Config(format!(
            "Corrupt vector blob of {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub collection_count: usize,
    pub point_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: collections and their points
    r#"
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        dimension INTEGER NOT NULL,
        distance TEXT NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE points (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        point_id INTEGER NOT NULL,
        vector BLOB NOT NULL,
        payload TEXT NOT NULL,
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE,
        UNIQUE (collection, point_id)
    );

    CREATE INDEX idx_points_collection ON points(collection);
    "#,
];

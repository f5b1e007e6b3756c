//! Chunk corpus: the ingested chunks as a CSV file

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{RagError, Result};
use crate::ingest::Chunk;

/// CSV file holding one row per chunk
pub struct ChunkCorpus {
    path: PathBuf,
}

impl ChunkCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Overwrite the corpus with `chunks`
    pub fn save(&self, chunks: &[Chunk]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::io(e, format!("Failed to create {}", parent.display()))
            })?;
        }

        let mut writer = csv::Writer::from_path(&self.path)?;
        for chunk in chunks {
            writer.serialize(chunk)?;
        }
        writer
            .flush()
            .map_err(|e| RagError::io(e, format!("Failed to write {}", self.path.display())))?;

        info!("Saved {} chunks to {}", chunks.len(), self.path.display());
        Ok(())
    }

    /// Read every chunk, in file order
    pub fn load(&self) -> Result<Vec<Chunk>> {
        if !self.path.exists() {
            return Err(RagError::Config(format!(
                "Chunk corpus not found at {}; run `normativa ingest` first",
                self.path.display()
            )));
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let chunks = reader
            .deserialize()
            .collect::<std::result::Result<Vec<Chunk>, _>>()?;
        Ok(chunks)
    }
}

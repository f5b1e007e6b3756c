//! Source registry: per-file document metadata

use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// One row of the sources CSV
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub vigencia: String,
}

/// Metadata attached to every chunk of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub doc_id: String,
    pub title: String,
    pub url: String,
    pub vigencia: String,
    pub filename: String,
}

/// Sources keyed by file name
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: AHashMap<String, SourceEntry>,
}

impl SourceRegistry {
    /// Load the registry from CSV
    ///
    /// A missing file gives an empty registry; rows with a blank `filename`
    /// are ignored and later rows win over earlier ones.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Source registry {} not found, using file names as titles",
                path.display()
            );
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        let mut registry = Self::default();
        for row in reader.deserialize::<SourceEntry>() {
            registry.insert(row?);
        }

        debug!("Loaded {} source entries", registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, entry: SourceEntry) {
        let filename = entry.filename.trim().to_string();
        if !filename.is_empty() {
            self.entries.insert(filename, entry);
        }
    }

    pub fn get(&self, filename: &str) -> Option<&SourceEntry> {
        self.entries.get(filename)
    }

    /// Metadata for `path`, falling back to the file stem for id and title
    pub fn resolve(&self, path: &Path) -> DocumentMeta {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());

        let entry = self.entries.get(&filename);
        let field = |value: Option<&String>| {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        DocumentMeta {
            doc_id: field(entry.map(|e| &e.doc_id)).unwrap_or_else(|| stem.clone()),
            title: field(entry.map(|e| &e.title)).unwrap_or(stem),
            url: field(entry.map(|e| &e.url)).unwrap_or_default(),
            vigencia: field(entry.map(|e| &e.vigencia)).unwrap_or_default(),
            filename,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Configuration management
//!
//! A single TOML file drives ingestion, indexing, retrieval, the LLM backends,
//! the HTTP server and the evaluation harness. Missing files fall back to
//! `Config::default()`, and `NORMATIVA_SECTION__KEY` environment variables
//! override individual values after loading.

use crate::embedding::Distance;
use crate::error::{RagError, Result};
use crate::llm::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "NORMATIVA_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub eval: EvalConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the chunk corpus and the vector database live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Chunk corpus produced by `ingest` and consumed by `index`
    pub chunks_file: PathBuf,
    /// SQLite file holding vector collections
    pub database_file: PathBuf,
}

/// Document ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub raw_dir: PathBuf,
    pub sources_file: PathBuf,
    /// Window size in words
    pub chunk_size: usize,
    /// Words shared between consecutive windows of one page
    pub overlap: usize,
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

/// Vector index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub collection: String,
    pub distance: Distance,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Retrieval defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub max_k: usize,
    /// Drop neighbours scoring below this value (cosine only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

/// LLM backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub default_provider: String,
    pub chatgpt: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub openrouter: ProviderSettings,
}

impl LlmConfig {
    /// Settings block for a backend
    pub fn settings(&self, kind: BackendKind) -> &ProviderSettings {
        match kind {
            BackendKind::ChatGpt => &self.chatgpt,
            BackendKind::DeepSeek => &self.deepseek,
            BackendKind::OpenRouter => &self.openrouter,
        }
    }
}

/// Settings for one hosted chat-completions provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

/// Evaluation harness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub gold_set: PathBuf,
    pub output_dir: PathBuf,
    /// Concurrent pipeline invocations
    pub workers: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::io(e, format!("Failed to read config file: {:?}", path)))?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` when given, the default location otherwise, or fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::warn!(
                "Config file {} not found, using defaults. Run 'normativa config init' to create one.",
                path.display()
            );
            let mut config = Config::default();
            config.apply_env_overrides();
            ConfigValidator::validate(&config)?;
            return Ok(config);
        }

        Self::load(&path)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| RagError::io(e, format!("Failed to write config file: {:?}", path)))?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(std::env::vars());
    }

    /// Apply `NORMATIVA_SECTION__KEY=value` overrides from any source of pairs
    pub fn apply_overrides_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if key == "OPENROUTER_MODEL" {
                self.llm.openrouter.model = value;
                continue;
            }
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__CHUNKS_FILE" => self.storage.chunks_file = PathBuf::from(value),
            "STORAGE__DATABASE_FILE" => self.storage.database_file = PathBuf::from(value),
            "INGEST__RAW_DIR" => self.ingest.raw_dir = PathBuf::from(value),
            "INGEST__SOURCES_FILE" => self.ingest.sources_file = PathBuf::from(value),
            "INGEST__CHUNK_SIZE" => self.ingest.chunk_size = parse_number(path, value)?,
            "INGEST__OVERLAP" => self.ingest.overlap = parse_number(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "INDEX__COLLECTION" => self.index.collection = value.to_string(),
            "RETRIEVAL__DEFAULT_K" => self.retrieval.default_k = parse_number(path, value)?,
            "LLM__DEFAULT_PROVIDER" => self.llm.default_provider = value.to_string(),
            "SERVER__BIND" => self.server.bind = value.to_string(),
            "EVAL__WORKERS" => self.eval.workers = parse_number(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("normativa").join("config.toml"))
    }
}

fn parse_number(path: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as an unsigned integer", value),
        })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RagError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        let processed = data_dir.join("processed");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
            },
            storage: StorageConfig {
                chunks_file: processed.join("chunks.csv"),
                database_file: processed.join("vectors.sqlite"),
            },
            ingest: IngestConfig {
                raw_dir: data_dir.join("raw"),
                sources_file: data_dir.join("sources.csv"),
                chunk_size: 900,
                overlap: 120,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            index: IndexConfig {
                collection: "ufro_normativa".to_string(),
                distance: Distance::Cosine,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            retrieval: RetrievalConfig {
                default_k: 4,
                max_k: 20,
                min_score: None,
            },
            llm: LlmConfig {
                default_provider: "openrouter".to_string(),
                chatgpt: ProviderSettings {
                    model: "gpt-4o-mini".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    api_key_env: "OPENAI_API_KEY".to_string(),
                    temperature: None,
                    max_tokens: None,
                    timeout_secs: 60,
                },
                deepseek: ProviderSettings {
                    model: "deepseek-chat".to_string(),
                    base_url: "https://api.deepseek.com".to_string(),
                    api_key_env: "DEEPSEEK_API_KEY".to_string(),
                    temperature: None,
                    max_tokens: None,
                    timeout_secs: 60,
                },
                openrouter: ProviderSettings {
                    model: "openai/gpt-4o-mini".to_string(),
                    base_url: "https://openrouter.ai/api/v1".to_string(),
                    api_key_env: "OPENROUTER_API_KEY".to_string(),
                    temperature: None,
                    max_tokens: None,
                    timeout_secs: 60,
                },
            },
            server: ServerConfig {
                bind: "127.0.0.1:5000".to_string(),
            },
            eval: EvalConfig {
                gold_set: data_dir.join("gold_set.csv"),
                output_dir: data_dir.join("eval"),
                workers: 8,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.default_k = 6;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.default_k, 6);
        assert_eq!(loaded.index.collection, "ufro_normativa");
        assert_eq!(loaded.index.distance, Distance::Cosine);
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(RagError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(vec![
            ("NORMATIVA_LLM__DEFAULT_PROVIDER".to_string(), "deepseek".to_string()),
            ("NORMATIVA_RETRIEVAL__DEFAULT_K".to_string(), "7".to_string()),
            ("OPENROUTER_MODEL".to_string(), "deepseek/deepseek-chat".to_string()),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ]);

        assert_eq!(config.llm.default_provider, "deepseek");
        assert_eq!(config.retrieval.default_k, 7);
        assert_eq!(config.llm.openrouter.model, "deepseek/deepseek-chat");
    }

    #[test]
    fn test_bad_numeric_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(vec![(
            "NORMATIVA_INGEST__CHUNK_SIZE".to_string(),
            "many".to_string(),
        )]);
        assert_eq!(config.ingest.chunk_size, 900);
    }

    #[test]
    fn test_expand_path_passthrough() {
        let path = PathBuf::from("data/raw");
        assert_eq!(expand_path(&path).unwrap(), path);
    }
}

use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::llm::BackendError;

/// Main error type for the RAG pipeline and its tooling
#[derive(Error, Debug)]
pub enum RagError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Selected backend has no credential in the environment
    #[error("Missing credential for provider '{provider}': set {env_var}")]
    MissingCredential { provider: String, env_var: String },

    /// Backend name outside the supported set
    #[error("Unsupported provider '{name}'; expected one of: {supported}")]
    UnsupportedProvider { name: String, supported: String },

    /// Provider is known but was not constructed (usually a missing credential)
    #[error("Provider '{0}' is not available")]
    ProviderUnavailable(String),

    /// Vector dimensionality does not match the collection
    #[error("Vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Collection was queried before being built
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Query embeddings would come from a different model than the stored vectors
    #[error("Embedding model mismatch: collection built with '{indexed}', query provider is '{query}'")]
    EmbeddingModelMismatch { indexed: String, query: String },

    /// Two distinct chunk ids hashed to the same point id
    #[error("Point id collision between '{first}' and '{second}'")]
    PointIdCollision { first: String, second: String },

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(VectorIndexError),

    /// LLM backend call failures
    #[error("Backend call failed: {0}")]
    Backend(#[from] BackendError),

    /// A single source document could not be extracted
    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// CSV errors (source registry, chunk corpus, gold set)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Fatal setup problems that must abort pipeline construction
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RagError::Config(_)
                | RagError::ConfigValidation { .. }
                | RagError::ConfigNotFound { .. }
                | RagError::InvalidConfigValue { .. }
                | RagError::MissingCredential { .. }
                | RagError::UnsupportedProvider { .. }
                | RagError::ProviderUnavailable(_)
                | RagError::DimensionMismatch { .. }
                | RagError::CollectionNotFound(_)
                | RagError::EmbeddingModelMismatch { .. }
        )
    }

    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        RagError::Io {
            source,
            context: context.into(),
        }
    }
}

impl From<VectorIndexError> for RagError {
    fn from(err: VectorIndexError) -> Self {
        match err {
            VectorIndexError::InvalidDimension { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            other => RagError::VectorIndex(other),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let err = RagError::UnsupportedProvider {
            name: "gemini".to_string(),
            supported: "chatgpt, deepseek, openrouter".to_string(),
        };
        assert!(err.is_configuration());

        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(err.is_configuration());

        let err = RagError::Backend(BackendError::EmptyResponse);
        assert!(!err.is_configuration());
    }
}

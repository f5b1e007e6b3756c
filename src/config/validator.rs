use crate::config::{Config, ProviderSettings, SCHEMA_VERSION};
use crate::error::{RagError, Result, ValidationError};
use crate::llm::BackendKind;
use std::net::SocketAddr;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_ingest(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_eval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.chunks_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.chunks_file",
                "Chunk corpus path cannot be empty",
            ));
        }

        if config.storage.database_file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_file",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        // overlap >= chunk_size is tolerated: the segmenter floors its step at one word
        if config.ingest.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingest.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.collection.trim().is_empty() {
            errors.push(ValidationError::new(
                "index.collection",
                "Collection name cannot be empty",
            ));
        }

        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        if retrieval.default_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_k",
                "Default k must be greater than 0",
            ));
        }

        if retrieval.max_k < retrieval.default_k {
            errors.push(ValidationError::new(
                "retrieval.max_k",
                format!(
                    "max_k ({}) cannot be lower than default_k ({})",
                    retrieval.max_k, retrieval.default_k
                ),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if let Err(e) = config.llm.default_provider.parse::<BackendKind>() {
            errors.push(ValidationError::new("llm.default_provider", e.to_string()));
        }

        for kind in BackendKind::ALL {
            Self::validate_provider(kind, config.llm.settings(kind), errors);
        }
    }

    fn validate_provider(
        kind: BackendKind,
        settings: &ProviderSettings,
        errors: &mut Vec<ValidationError>,
    ) {
        let section = format!("llm.{}", kind.as_str());

        if settings.model.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.model", section),
                "Model name cannot be empty",
            ));
        }

        if !(settings.base_url.starts_with("http://") || settings.base_url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                format!("{}.base_url", section),
                format!("Base URL must be an http(s) URL, got '{}'", settings.base_url),
            ));
        }

        if settings.api_key_env.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.api_key_env", section),
                "API key variable name cannot be empty",
            ));
        }

        if let Some(temp) = settings.temperature {
            if !(0.0..=2.0).contains(&temp) {
                errors.push(ValidationError::new(
                    format!("{}.temperature", section),
                    format!("Temperature must be between 0.0 and 2.0, got {}", temp),
                ));
            }
        }

        if settings.timeout_secs == 0 {
            errors.push(ValidationError::new(
                format!("{}.timeout_secs", section),
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.bind.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "server.bind",
                format!("Invalid bind address: {}", config.server.bind),
            ));
        }
    }

    fn validate_eval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.eval.workers == 0 {
            errors.push(ValidationError::new(
                "eval.workers",
                "Worker count must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut config = Config::default();
        config.ingest.chunk_size = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_overlap_larger_than_chunk_is_allowed() {
        let mut config = Config::default();
        config.ingest.chunk_size = 50;
        config.ingest.overlap = 80;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_default_provider() {
        let mut config = Config::default();
        config.llm.default_provider = "gemini".to_string();

        match ConfigValidator::validate(&config) {
            Err(RagError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "llm.default_provider");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        config.retrieval.default_k = 0;
        config.server.bind = "not-an-address".to_string();

        match ConfigValidator::validate(&config) {
            Err(RagError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.llm.deepseek.base_url = "api.deepseek.com".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}

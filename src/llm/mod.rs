//! Chat-completion backends
//!
//! Every supported provider speaks the OpenAI chat-completions protocol, so a
//! single HTTP client is configured per provider with its own base URL, model
//! and credential variable. Backends are selected by name at request time.

mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleBackend;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Prompt used to check that a backend answers at all
pub const PROBE_PROMPT: &str = "Hola, ¿quién eres?";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider returned no completion")]
    EmptyResponse,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
}

/// A single message of a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion backend
pub trait LlmBackend: Send + Sync {
    /// Short provider name, as accepted by [`BackendKind::from_str`]
    fn name(&self) -> &str;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Send the conversation and return the assistant's text
    fn chat(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError>;
}

/// The closed set of supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    ChatGpt,
    DeepSeek,
    OpenRouter,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::ChatGpt,
        BackendKind::DeepSeek,
        BackendKind::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ChatGpt => "chatgpt",
            BackendKind::DeepSeek => "deepseek",
            BackendKind::OpenRouter => "openrouter",
        }
    }

    fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatgpt" | "openai" => Ok(BackendKind::ChatGpt),
            "deepseek" => Ok(BackendKind::DeepSeek),
            "openrouter" => Ok(BackendKind::OpenRouter),
            _ => Err(RagError::UnsupportedProvider {
                name: s.to_string(),
                supported: Self::supported_names(),
            }),
        }
    }
}

/// Backends that could be constructed, keyed by provider
pub struct BackendRegistry {
    backends: Vec<(BackendKind, Arc<dyn LlmBackend>)>,
    default: BackendKind,
}

impl BackendRegistry {
    /// Create an empty registry answering to `default` when no name is given
    pub fn new(default: BackendKind) -> Self {
        Self {
            backends: Vec::new(),
            default,
        }
    }

    /// Build every backend whose credential is present in the environment
    ///
    /// Providers without a credential are skipped with a warning; requesting
    /// one later yields [`RagError::ProviderUnavailable`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::from_lookup(config, |var| std::env::var(var).ok())
    }

    /// Same as [`BackendRegistry::from_config`] with an explicit variable lookup
    pub fn from_lookup<F>(config: &LlmConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default: BackendKind = config.default_provider.parse()?;
        let mut registry = Self::new(default);

        for kind in BackendKind::ALL {
            let settings = config.settings(kind);
            match lookup(&settings.api_key_env).filter(|key| !key.trim().is_empty()) {
                Some(api_key) => {
                    let backend = OpenAiCompatibleBackend::with_api_key(kind, settings, api_key)?;
                    debug!("Registered backend {} ({})", kind, settings.model);
                    registry.register(kind, Arc::new(backend));
                }
                None => warn!(
                    "Provider {} unavailable: {} is not set",
                    kind, settings.api_key_env
                ),
            }
        }

        Ok(registry)
    }

    /// Add or replace the backend for `kind`
    pub fn register(&mut self, kind: BackendKind, backend: Arc<dyn LlmBackend>) {
        self.backends.retain(|(k, _)| *k != kind);
        self.backends.push((kind, backend));
    }

    /// Resolve a provider name, falling back to the default provider
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn LlmBackend>> {
        let kind = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.parse()?,
            None => self.default,
        };
        self.get_kind(kind)
    }

    pub fn get_kind(&self, kind: BackendKind) -> Result<Arc<dyn LlmBackend>> {
        self.backends
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, backend)| Arc::clone(backend))
            .ok_or_else(|| RagError::ProviderUnavailable(kind.to_string()))
    }

    /// Providers that can be used, in declaration order
    pub fn available(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.backends.iter().any(|(k, _)| k == kind))
            .collect()
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Send [`PROBE_PROMPT`] and return the reply
pub fn probe(backend: &dyn LlmBackend) -> std::result::Result<String, BackendError> {
    backend.chat(&[ChatMessage::user(PROBE_PROMPT)])
}

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendError, BackendKind, ChatMessage, LlmBackend};
use crate::config::ProviderSettings;
use crate::error::{RagError, Result};

/// Client for any endpoint implementing `POST {base_url}/chat/completions`
pub struct OpenAiCompatibleBackend {
    kind: BackendKind,
    model: String,
    endpoint: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    headers: HeaderMap,
    client: Client,
}

impl OpenAiCompatibleBackend {
    /// Construct the backend, reading the API key from `settings.api_key_env`
    pub fn new(kind: BackendKind, settings: &ProviderSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RagError::MissingCredential {
                provider: kind.to_string(),
                env_var: settings.api_key_env.clone(),
            })?;
        Self::with_api_key(kind, settings, api_key)
    }

    pub fn with_api_key(
        kind: BackendKind,
        settings: &ProviderSettings,
        api_key: String,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        let auth = HeaderValue::from_str(&auth).map_err(|_| RagError::InvalidConfigValue {
            path: settings.api_key_env.clone(),
            message: "API key contains characters not allowed in a header".to_string(),
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build {} HTTP client: {}", kind, e)))?;

        Ok(Self {
            kind,
            model: settings.model.clone(),
            endpoint: completions_url(&settings.base_url),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            headers,
            client,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

impl LlmBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn chat(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("POST {} (model {})", self.endpoint, self.model);

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(BackendError::Status { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        parsed.into_text()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// First non-blank choice, without surrounding whitespace
    fn into_text(self) -> std::result::Result<String, BackendError> {
        self.choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .find(|content| !content.is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.deepseek.com"),
            "https://api.deepseek.com/chat/completions"
        );
        assert_eq!(
            completions_url("https://openrouter.ai/api/v1/"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_missing_credential() {
        let config = Config::default();
        let mut settings = config.llm.chatgpt.clone();
        settings.api_key_env = "NORMATIVA_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        match OpenAiCompatibleBackend::new(BackendKind::ChatGpt, &settings) {
            Err(RagError::MissingCredential { provider, env_var }) => {
                assert_eq!(provider, "chatgpt");
                assert_eq!(env_var, "NORMATIVA_TEST_KEY_THAT_IS_NEVER_SET");
            }
            Err(other) => panic!("expected missing credential, got {:?}", other),
            Ok(_) => panic!("expected missing credential"),
        }
    }

    #[test]
    fn test_backend_identity() {
        let config = Config::default();
        let backend = OpenAiCompatibleBackend::with_api_key(
            BackendKind::OpenRouter,
            &config.llm.openrouter,
            "sk-or-test".to_string(),
        )
        .unwrap();

        assert_eq!(backend.name(), "openrouter");
        assert_eq!(backend.model(), "openai/gpt-4o-mini");
        assert_eq!(
            backend.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_omits_unset_sampling() {
        let messages = vec![ChatMessage::user("hola")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: None,
            max_tokens: Some(256),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_text_is_trimmed() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "\n\n  El PIA dura una semana.\n"}}]
        }))
        .unwrap();
        assert_eq!(parsed.into_text().unwrap(), "El PIA dura una semana.");

        let blank: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": " \n "}}, {"message": {"content": null}}]
        }))
        .unwrap();
        assert!(matches!(blank.into_text(), Err(BackendError::EmptyResponse)));
    }
}

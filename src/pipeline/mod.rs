//! Retrieval-augmented generation
//!
//! One query runs retrieve, augment, generate, in that order and without
//! retries. An empty retrieval short-circuits before any backend call.

use crate::error::Result;
use crate::llm::{BackendRegistry, ChatMessage, LlmBackend};
use crate::retrieval::{build_prompt, dedupe_citations, Citation, Retriever};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Answer returned when nothing relevant was retrieved
pub const NO_CONTEXT_ANSWER: &str =
    "No encontré información relevante en la base de datos para responder a tu pregunta.";

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer: String,
    /// Chunk texts placed in the prompt, in retrieval order
    pub retrieved_texts: Vec<String>,
    pub citations: Vec<Citation>,
    /// Approximate token count, see [`estimate_word_tokens`]
    pub tokens_used: usize,
}

impl PipelineResult {
    fn abstention() -> Self {
        Self {
            answer: NO_CONTEXT_ANSWER.to_string(),
            retrieved_texts: Vec::new(),
            citations: Vec::new(),
            tokens_used: 0,
        }
    }
}

/// Approximate token usage as whitespace-separated words of prompt plus reply
///
/// This is a word-count proxy, not a tokenizer count; do not bill from it.
pub fn estimate_word_tokens(prompt: &str, response: &str) -> usize {
    prompt.split_whitespace().count() + response.split_whitespace().count()
}

/// Retriever plus the backends it can answer with
pub struct RagPipeline {
    retriever: Retriever,
    backends: BackendRegistry,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, backends: BackendRegistry) -> Self {
        Self {
            retriever,
            backends,
        }
    }

    /// Answer `query` with the named provider (default provider when `None`)
    ///
    /// The provider is resolved before retrieval so an unknown or unavailable
    /// name fails without touching the index.
    pub fn answer(&self, query: &str, provider: Option<&str>, k: usize) -> Result<PipelineResult> {
        let backend = self.backends.get(provider)?;
        self.answer_with(backend.as_ref(), query, k)
    }

    /// Answer `query` with an explicit backend
    pub fn answer_with(&self, backend: &dyn LlmBackend, query: &str, k: usize) -> Result<PipelineResult> {
        let chunks = self.retriever.retrieve(query, k)?;

        if chunks.is_empty() {
            info!("No context retrieved, abstaining without calling {}", backend.name());
            return Ok(PipelineResult::abstention());
        }

        let citations = dedupe_citations(&chunks);
        let retrieved_texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        let prompt = build_prompt(query, &retrieved_texts);

        debug!(
            "Prompt built from {} chunks ({} citations), sending to {} ({})",
            retrieved_texts.len(),
            citations.len(),
            backend.name(),
            backend.model()
        );

        let answer = backend.chat(&[ChatMessage::user(prompt.as_str())])?;
        let tokens_used = estimate_word_tokens(&prompt, &answer);

        Ok(PipelineResult {
            answer,
            retrieved_texts,
            citations,
            tokens_used,
        })
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }
}

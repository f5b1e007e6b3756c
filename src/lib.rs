//! Normativa - Question answering over university regulations
//!
//! Ingests regulation PDFs and HTML pages into overlapping word-window chunks,
//! embeds them locally into a persistent vector store, and answers questions
//! by grounding a hosted chat-completion model in the retrieved chunks, with
//! deduplicated citations back to the source documents.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{RagError, Result};
pub use pipeline::{PipelineResult, RagPipeline};

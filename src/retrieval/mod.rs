//! Retrieval and augmentation
//!
//! Query embedding and nearest-neighbour lookup, citation deduplication and
//! prompt assembly. Everything except [`Retriever::retrieve`] is pure.

mod citation;
mod prompt;
mod provenance;
mod retriever;

pub use citation::dedupe_citations;
pub use prompt::{build_prompt, CONTEXT_SEPARATOR};
pub use provenance::{Citation, PageRef, RetrievedChunk, DEFAULT_PAGE, DEFAULT_TITLE, DEFAULT_URL};
pub use retriever::{Retriever, DEFAULT_K};

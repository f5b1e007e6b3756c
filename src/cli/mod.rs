//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "normativa",
    version,
    about = "Question answering over university regulations with cited sources",
    long_about = "Normativa ingests regulation PDFs and HTML pages into word-window chunks, \
                  indexes them in a persistent vector store, and answers questions through a \
                  retrieval-augmented pipeline backed by hosted chat-completion providers."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/normativa/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question with citations
    Ask {
        /// Question to ask
        query: String,

        /// LLM provider (chatgpt, deepseek, openrouter); config default when omitted
        #[arg(short, long)]
        provider: Option<String>,

        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show the nearest chunks for a query without calling an LLM
    Search {
        /// Search query text
        query: String,

        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Extract and chunk source documents into the chunk corpus
    Ingest {
        /// Directory holding the PDF/HTML sources
        #[arg(long, value_name = "DIR")]
        raw: Option<PathBuf>,

        /// Source registry CSV (filename, doc_id, title, url, vigencia)
        #[arg(long, value_name = "FILE")]
        sources: Option<PathBuf>,

        /// Output chunk corpus CSV
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Window size in words
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Words shared between consecutive windows
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Embed the chunk corpus and rebuild the vector collection
    Index {
        /// Chunk corpus CSV to index
        #[arg(long, value_name = "FILE")]
        corpus: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        /// Address to bind (e.g. 127.0.0.1:5000)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run the gold set through the pipeline and write a results CSV
    Eval {
        /// LLM provider to evaluate
        #[arg(short, long)]
        provider: Option<String>,

        /// Gold set CSV (query, ground_truth)
        #[arg(long, value_name = "FILE")]
        gold: Option<PathBuf>,

        /// Number of chunks to retrieve per question
        #[arg(short, long)]
        k: Option<usize>,

        /// Concurrent pipeline invocations
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// List configured LLM providers
    Providers {
        /// Send a short greeting to each available provider
        #[arg(long)]
        probe: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to ~/.config/normativa/config.toml)
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use normativa_rag::cli::{Cli, Commands, ConfigAction};
use normativa_rag::config::{expand_path, Config};
use normativa_rag::embedding::{FastEmbedProvider, IndexBuilder, IndexParams};
use normativa_rag::error::{RagError, Result};
use normativa_rag::eval::{load_gold_set, Evaluator};
use normativa_rag::ingest::{ingest_directory, SourceRegistry};
use normativa_rag::llm::{probe, BackendRegistry};
use normativa_rag::pipeline::RagPipeline;
use normativa_rag::retrieval::Retriever;
use normativa_rag::server::{self, AppState};
use normativa_rag::storage::{ChunkCorpus, CollectionSpec, VectorStore};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Ask { query, provider, k } => {
            cmd_ask(cli.config, &query, provider, k)?;
        }
        Commands::Search { query, k, json } => {
            cmd_search(cli.config, &query, k, json)?;
        }
        Commands::Ingest {
            raw,
            sources,
            out,
            chunk_size,
            overlap,
        } => {
            cmd_ingest(cli.config, raw, sources, out, chunk_size, overlap)?;
        }
        Commands::Index { corpus } => {
            cmd_index(cli.config, corpus)?;
        }
        Commands::Serve { bind } => {
            cmd_serve(cli.config, bind)?;
        }
        Commands::Eval {
            provider,
            gold,
            k,
            workers,
        } => {
            cmd_eval(cli.config, provider, gold, k, workers)?;
        }
        Commands::Providers { probe } => {
            cmd_providers(cli.config, probe)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "normativa_rag=debug,normativa=debug,tower_http=debug"
    } else {
        "normativa_rag=info,normativa=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_ask(config_path: Option<PathBuf>, query: &str, provider: Option<String>, k: Option<usize>) -> Result<()> {
    let config = load_config(config_path)?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let pipeline = build_pipeline(&config)?;
    let backend = pipeline.backends().get(provider.as_deref())?;

    let start = Instant::now();
    let result = pipeline.answer_with(backend.as_ref(), query, k)?;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    println!("{}", result.answer);
    println!();

    if result.citations.is_empty() {
        println!("Fuentes: no se encontraron fuentes para esta respuesta.");
    } else {
        println!("Fuentes:");
        for citation in &result.citations {
            println!("  - {}", citation);
        }
    }

    println!();
    println!("Provider: {} ({})", backend.name(), backend.model());
    println!("k: {} requested, {} retrieved", k, result.retrieved_texts.len());
    println!("Tokens (approx.): {}", result.tokens_used);
    println!("Latency: {:.2} ms", latency_ms);

    Ok(())
}

fn cmd_search(config_path: Option<PathBuf>, query: &str, k: Option<usize>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let retriever = build_retriever(&config)?;
    let chunks = retriever.retrieve(query, k)?;

    if json {
        let output = serde_json::to_string_pretty(&chunks).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("No results in collection '{}'", retriever.collection());
        return Ok(());
    }

    for (rank, chunk) in chunks.iter().enumerate() {
        println!("{}. {} score={:.4}", rank + 1, chunk.citation(), chunk.score);
        if let Some(chunk_id) = &chunk.chunk_id {
            println!("   id: {}", chunk_id);
        }
        println!("   {}", preview(&chunk.text, 200));
    }

    Ok(())
}

fn cmd_ingest(
    config_path: Option<PathBuf>,
    raw: Option<PathBuf>,
    sources: Option<PathBuf>,
    out: Option<PathBuf>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let raw_dir = expand_path(&raw.unwrap_or_else(|| config.ingest.raw_dir.clone()))?;
    let sources = expand_path(&sources.unwrap_or_else(|| config.ingest.sources_file.clone()))?;
    let out = expand_path(&out.unwrap_or_else(|| config.storage.chunks_file.clone()))?;
    let chunk_size = chunk_size.unwrap_or(config.ingest.chunk_size);
    let overlap = overlap.unwrap_or(config.ingest.overlap);

    if chunk_size == 0 {
        return Err(RagError::InvalidConfigValue {
            path: "ingest.chunk_size".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    let registry = SourceRegistry::load(&sources)?;
    let report = ingest_directory(&raw_dir, &registry, chunk_size, overlap)?;

    ChunkCorpus::new(&out).save(&report.chunks)?;

    println!(
        "✓ {} chunks from {} documents written to {}",
        report.chunks.len(),
        report.documents,
        out.display()
    );
    if report.ignored > 0 {
        println!("  {} files ignored (unsupported type)", report.ignored);
    }
    for (path, reason) in &report.failed {
        println!("  ✗ {}: {}", path.display(), reason);
    }

    Ok(())
}

fn cmd_index(config_path: Option<PathBuf>, corpus: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus_path = expand_path(&corpus.unwrap_or_else(|| config.storage.chunks_file.clone()))?;
    let chunks = ChunkCorpus::new(corpus_path).load()?;

    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let store = Arc::new(open_store(&config)?);
    let builder = IndexBuilder::new(provider, store, config.embedding.batch_size);

    let spec = CollectionSpec {
        name: config.index.collection.clone(),
        dimension: config.embedding.dimension,
        distance: config.index.distance,
        model: config.embedding.model.clone(),
    };
    let result = builder.build(spec, &chunks)?;

    println!(
        "✓ Indexed {} chunks into '{}' ({} batches, {} ms)",
        result.processed, result.collection, result.batches, result.duration_ms
    );

    Ok(())
}

fn cmd_serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| RagError::Config(format!("Invalid bind address: {}", bind)))?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let state = AppState::new(pipeline, config.retrieval.default_k, config.retrieval.max_k);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RagError::io(e, "Failed to start async runtime"))?;
    runtime.block_on(server::serve(addr, state))
}

fn cmd_eval(
    config_path: Option<PathBuf>,
    provider: Option<String>,
    gold: Option<PathBuf>,
    k: Option<usize>,
    workers: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let gold = expand_path(&gold.unwrap_or_else(|| config.eval.gold_set.clone()))?;
    let output_dir = expand_path(&config.eval.output_dir)?;
    let items = load_gold_set(&gold)?;

    let pipeline = Arc::new(build_pipeline(&config)?);
    let evaluator = Evaluator::new(
        pipeline,
        provider.as_deref(),
        k.unwrap_or(config.retrieval.default_k),
        workers.unwrap_or(config.eval.workers),
    )?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RagError::io(e, "Failed to start async runtime"))?;
    let report = runtime.block_on(evaluator.run(items))?;
    let path = report.write_csv(&output_dir)?;

    let summary = &report.summary;
    println!("Evaluation: {}", summary.provider);
    println!("==========");
    println!("  Questions:        {}", summary.items);
    println!("  Failures:         {}", summary.failures);
    println!("  Avg latency:      {:.2} ms", summary.avg_latency_ms);
    println!("  Total tokens:     {}", summary.total_tokens);
    println!("  Avg tokens:       {}", summary.avg_tokens);
    println!("  Keyword overlap:  {:.3}", summary.mean_keyword_overlap);
    println!("\n✓ Results written to {}", path.display());

    Ok(())
}

fn cmd_providers(config_path: Option<PathBuf>, run_probe: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = BackendRegistry::from_config(&config.llm)?;

    println!("Providers (default: {})", registry.default_kind());
    if registry.is_empty() {
        println!("  none available; set the API key variables listed in the config");
        return Ok(());
    }

    for kind in registry.available() {
        let backend = registry.get_kind(kind)?;
        println!("  {} ({})", kind, backend.model());

        if run_probe {
            match probe(backend.as_ref()) {
                Ok(reply) => println!("    ✓ {}", preview(&reply, 120)),
                Err(e) => println!("    ✗ {}", e),
            }
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    Config::load_or_default(config_path.as_deref())
}

fn open_store(config: &Config) -> Result<VectorStore> {
    let db_path = expand_path(&config.storage.database_file)?;
    if let Some(parent) = db_path.parent() {
        create_dir(parent)?;
    }
    VectorStore::open(&db_path, IndexParams::from(&config.index))
}

fn build_retriever(config: &Config) -> Result<Retriever> {
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let store = Arc::new(open_store(config)?);

    Ok(Retriever::new(provider, store, config.index.collection.as_str())?
        .with_min_score(config.retrieval.min_score))
}

fn build_pipeline(config: &Config) -> Result<RagPipeline> {
    let retriever = build_retriever(config)?;
    let backends = BackendRegistry::from_config(&config.llm)?;

    if backends.is_empty() {
        tracing::warn!("No LLM provider has credentials; queries will fail until one is configured");
    }

    Ok(RagPipeline::new(retriever, backends))
}

fn create_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(path)
        .map_err(|e| RagError::io(e, format!("Failed to create {}", path.display())))
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut)
}

//! Batch evaluation over a gold set of questions
//!
//! Each question runs through the full pipeline on a bounded pool of blocking
//! workers. A failed question is recorded with a placeholder answer instead
//! of aborting the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::llm::LlmBackend;
use crate::pipeline::RagPipeline;

/// Answer recorded for a question whose pipeline run failed
pub const FAILED_ANSWER: &str = "Error en la generación.";

/// Separator between contexts in the results CSV
const CONTEXT_DELIMITER: &str = "\n---\n";

/// A question with its reference answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldItem {
    pub query: String,
    pub ground_truth: String,
}

/// Read the gold set CSV (`query, ground_truth`)
pub fn load_gold_set(path: &Path) -> Result<Vec<GoldItem>> {
    if !path.exists() {
        return Err(RagError::Config(format!(
            "Gold set not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let items = reader
        .deserialize()
        .collect::<std::result::Result<Vec<GoldItem>, _>>()?;
    Ok(items)
}

/// Outcome of one gold-set question
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
    pub latency_ms: f64,
    pub tokens_used: usize,
    /// Share of reference-answer keywords present in the generated answer
    pub keyword_overlap: f64,
    pub error: Option<String>,
}

impl EvalRecord {
    fn failed(item: GoldItem, error: &RagError) -> Self {
        Self {
            question: item.query,
            answer: FAILED_ANSWER.to_string(),
            contexts: Vec::new(),
            ground_truth: item.ground_truth,
            latency_ms: 0.0,
            tokens_used: 0,
            keyword_overlap: 0.0,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate metrics of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    pub provider: String,
    pub items: usize,
    pub failures: usize,
    pub avg_latency_ms: f64,
    pub total_tokens: usize,
    /// Floor of the mean token estimate per question
    pub avg_tokens: usize,
    pub mean_keyword_overlap: f64,
}

impl EvalSummary {
    pub fn from_records(provider: &str, records: &[EvalRecord]) -> Self {
        let items = records.len();
        let failures = records.iter().filter(|r| r.error.is_some()).count();
        let total_tokens: usize = records.iter().map(|r| r.tokens_used).sum();
        let mean = |sum: f64| if items == 0 { 0.0 } else { sum / items as f64 };

        Self {
            provider: provider.to_string(),
            items,
            failures,
            avg_latency_ms: mean(records.iter().map(|r| r.latency_ms).sum()),
            total_tokens,
            avg_tokens: if items == 0 { 0 } else { total_tokens / items },
            mean_keyword_overlap: mean(records.iter().map(|r| r.keyword_overlap).sum()),
        }
    }
}

/// Records plus their summary
#[derive(Debug)]
pub struct EvalReport {
    pub records: Vec<EvalRecord>,
    pub summary: EvalSummary,
}

impl EvalReport {
    /// Write one CSV row per record into `dir`, returning the file path
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(|e| RagError::io(e, format!("Failed to create {}", dir.display())))?;

        let path = dir.join(format!(
            "evaluation_results_{}.csv",
            self.summary.provider.to_lowercase()
        ));
        let mut writer = csv::Writer::from_path(&path)?;
        for record in &self.records {
            writer.serialize(CsvRow::from(record))?;
        }
        writer
            .flush()
            .map_err(|e| RagError::io(e, format!("Failed to write {}", path.display())))?;

        info!("Wrote {} evaluation rows to {}", self.records.len(), path.display());
        Ok(path)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    question: &'a str,
    answer: &'a str,
    contexts: String,
    ground_truth: &'a str,
    latency_ms: f64,
    tokens_used: usize,
    keyword_overlap: f64,
    error: &'a str,
}

impl<'a> From<&'a EvalRecord> for CsvRow<'a> {
    fn from(record: &'a EvalRecord) -> Self {
        Self {
            question: &record.question,
            answer: &record.answer,
            contexts: record.contexts.join(CONTEXT_DELIMITER),
            ground_truth: &record.ground_truth,
            latency_ms: record.latency_ms,
            tokens_used: record.tokens_used,
            keyword_overlap: record.keyword_overlap,
            error: record.error.as_deref().unwrap_or(""),
        }
    }
}

/// Lower-cased alphanumeric tokens of at least three bytes
fn keywords(text: &str) -> Vec<String> {
    let tokens: AHashSet<String> = text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.len() >= 3)
        .map(str::to_lowercase)
        .collect();
    tokens.into_iter().collect()
}

/// Fraction of `reference` keywords that occur in `text`
pub fn keyword_overlap(reference: &str, text: &str) -> f64 {
    let tokens = keywords(reference);
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / tokens.len() as f64
}

/// Runs a gold set against one backend
pub struct Evaluator {
    pipeline: Arc<RagPipeline>,
    backend: Arc<dyn LlmBackend>,
    k: usize,
    workers: usize,
}

impl Evaluator {
    /// Resolve `provider` (default provider when `None`) up front
    pub fn new(pipeline: Arc<RagPipeline>, provider: Option<&str>, k: usize, workers: usize) -> Result<Self> {
        let backend = pipeline.backends().get(provider)?;
        Ok(Self {
            pipeline,
            backend,
            k,
            workers: workers.max(1),
        })
    }

    pub fn provider(&self) -> &str {
        self.backend.name()
    }

    /// Evaluate every item, keeping input order in the report
    pub async fn run(&self, items: Vec<GoldItem>) -> Result<EvalReport> {
        let total = items.len();
        info!(
            "Evaluating {} questions with {} ({} workers, k={})",
            total,
            self.provider(),
            self.workers,
            self.k
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(total);

        for item in items {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| RagError::Other(e.into()))?;
            let pipeline = Arc::clone(&self.pipeline);
            let backend = Arc::clone(&self.backend);
            let k = self.k;

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                evaluate_item(&pipeline, backend.as_ref(), item, k)
            }));
        }

        let mut records = Vec::with_capacity(total);
        for handle in handles {
            let record = handle
                .await
                .map_err(|e| RagError::Other(anyhow::anyhow!("evaluation task failed: {}", e)))?;
            records.push(record);
        }

        let summary = EvalSummary::from_records(self.provider(), &records);
        info!(
            "Evaluation done: {} items, {} failed, avg latency {:.2}ms, {} tokens",
            summary.items, summary.failures, summary.avg_latency_ms, summary.total_tokens
        );

        Ok(EvalReport { records, summary })
    }
}

fn evaluate_item(pipeline: &RagPipeline, backend: &dyn LlmBackend, item: GoldItem, k: usize) -> EvalRecord {
    let start = Instant::now();
    match pipeline.answer_with(backend, &item.query, k) {
        Ok(result) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            debug!("Answered '{}' in {:.0}ms", item.query, latency_ms);
            EvalRecord {
                keyword_overlap: keyword_overlap(&item.ground_truth, &result.answer),
                question: item.query,
                answer: result.answer,
                contexts: result.retrieved_texts,
                ground_truth: item.ground_truth,
                latency_ms,
                tokens_used: result.tokens_used,
                error: None,
            }
        }
        Err(e) => {
            warn!("Failed to answer '{}': {}", item.query, e);
            EvalRecord::failed(item, &e)
        }
    }
}

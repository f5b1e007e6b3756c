//! Ingestion through indexing: sources on disk to a searchable collection

use std::sync::Arc;

use normativa_rag::embedding::{Distance, EmbeddingError, EmbeddingProvider, IndexBuilder, IndexParams};
use normativa_rag::ingest::{ingest_directory, SourceRegistry};
use normativa_rag::retrieval::{PageRef, Retriever};
use normativa_rag::storage::{ChunkCorpus, CollectionSpec, VectorStore};
use tempfile::TempDir;

const REGLAMENTO_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Reglamento de Régimen de Estudios</title>
    <style>body { font-family: sans-serif; }</style>
    <script>console.log("tracking");</script>
  </head>
  <body>
    <h1>Reglamento de Régimen de Estudios</h1>
    <p>Artículo 1. El PIA es el Periodo de Inactividad Académica.</p>
    <p>Artículo 2. Durante el PIA no se programan evaluaciones.</p>
  </body>
</html>"#;

/// Counts of a few marker words; enough to separate the test documents
struct MarkerEmbedder;

const MARKERS: [&str; 4] = ["pia", "matrícula", "arancel", "reglamento"];

impl EmbeddingProvider for MarkerEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = MARKERS
            .iter()
            .map(|m| lower.matches(m).count() as f32)
            .collect();
        vector.push(0.05);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        MARKERS.len() + 1
    }

    fn model_name(&self) -> &str {
        "markers"
    }
}

fn write(dir: &std::path::Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_html_sources_are_chunked_with_registry_metadata() {
    let temp = TempDir::new().unwrap();
    let raw = temp.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    write(&raw, "reglamento.html", REGLAMENTO_HTML);
    write(
        &raw,
        "aranceles.htm",
        "<html><body><p>El arancel de matrícula se paga en marzo.</p></body></html>",
    );
    write(&raw, "notas.txt", "not a source document");
    write(&raw, "roto.pdf", "this is not a pdf");

    let sources = temp.path().join("sources.csv");
    std::fs::write(
        &sources,
        "filename,doc_id,title,url,vigencia\n\
         reglamento.html,RRE,Reglamento de Régimen de Estudios,https://ufro.cl/rre,2024\n",
    )
    .unwrap();

    let registry = SourceRegistry::load(&sources).unwrap();
    let report = ingest_directory(&raw, &registry, 8, 2).unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.ends_with("roto.pdf"));

    let rre: Vec<_> = report.chunks.iter().filter(|c| c.doc_id == "RRE").collect();
    assert!(rre.len() > 1);
    assert_eq!(rre[0].chunk_id, "RRE_p1_c0");
    assert_eq!(rre[0].title, "Reglamento de Régimen de Estudios");
    assert_eq!(rre[0].url, "https://ufro.cl/rre");
    assert_eq!(rre[0].page, 1);
    // windows stop at the last word: no trailing chunk repeats the previous tail
    for pair in rre.windows(2) {
        assert_ne!(
            pair[0].text.split_whitespace().last(),
            pair[1].text.split_whitespace().last()
        );
    }
    assert!(report.chunks.iter().all(|c| !c.text.contains("tracking")));
    assert!(report
        .chunks
        .iter()
        .all(|c| c.text.split_whitespace().count() <= 8));

    // unregistered file falls back to its stem
    let aranceles: Vec<_> = report.chunks.iter().filter(|c| c.filename == "aranceles.htm").collect();
    assert_eq!(aranceles.len(), 1);
    assert_eq!(aranceles[0].doc_id, "aranceles");
    assert_eq!(aranceles[0].title, "aranceles");
    assert_eq!(aranceles[0].url, "");
}

#[test]
fn test_corpus_round_trip_into_persistent_index() {
    let temp = TempDir::new().unwrap();
    let raw = temp.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    write(&raw, "reglamento.html", REGLAMENTO_HTML);
    write(
        &raw,
        "aranceles.html",
        "<html><body><p>El arancel de matrícula se paga en marzo.</p></body></html>",
    );

    let registry = SourceRegistry::load(&temp.path().join("missing.csv")).unwrap();
    assert!(registry.is_empty());
    let report = ingest_directory(&raw, &registry, 900, 120).unwrap();
    assert_eq!(report.chunks.len(), 2);

    let corpus = ChunkCorpus::new(temp.path().join("processed").join("chunks.csv"));
    corpus.save(&report.chunks).unwrap();
    let chunks = corpus.load().unwrap();
    assert_eq!(chunks, report.chunks);

    let db_path = temp.path().join("vectors.db");
    let provider = Arc::new(MarkerEmbedder);
    let spec = CollectionSpec {
        name: "ufro_normativa".to_string(),
        dimension: provider.dimension(),
        distance: Distance::Cosine,
        model: "markers".to_string(),
    };

    {
        let store = Arc::new(VectorStore::open(&db_path, IndexParams::default()).unwrap());
        let result = IndexBuilder::new(provider.clone(), store, 1)
            .build(spec, &chunks)
            .unwrap();
        assert_eq!(result.processed, 2);
        assert_eq!(result.batches, 2);
    }

    let store = Arc::new(VectorStore::open(&db_path, IndexParams::default()).unwrap());
    let retriever = Retriever::new(provider, store, "ufro_normativa").unwrap();

    let hits = retriever.retrieve("¿Qué es el PIA?", 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id.as_deref(), Some("reglamento"));
    assert_eq!(hits[0].page, Some(PageRef::Number(1)));

    let hits = retriever.retrieve("arancel de matrícula", 1).unwrap();
    assert_eq!(hits[0].doc_id.as_deref(), Some("aranceles"));
}

//! Document ingestion: extraction, cleaning and word-window segmentation

mod extract;
mod sources;

pub use extract::{extract_pages, html_to_text, DocumentKind};
pub use sources::{DocumentMeta, SourceEntry, SourceRegistry};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::embedding::Payload;
use crate::error::{RagError, Result};

/// A window of document text with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{doc_id}_p{page}_c{seq}`
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    /// 1-based page number
    pub page: u32,
    pub url: String,
    pub vigencia: String,
    pub text: String,
    pub filename: String,
}

impl Chunk {
    /// Payload stored next to the chunk's vector
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("chunk_id".to_string(), json!(self.chunk_id));
        payload.insert("doc_id".to_string(), json!(self.doc_id));
        payload.insert("title".to_string(), json!(self.title));
        payload.insert("page".to_string(), json!(self.page));
        payload.insert("url".to_string(), json!(self.url));
        payload.insert("vigencia".to_string(), json!(self.vigencia));
        payload.insert("text".to_string(), json!(self.text));
        payload.insert("filename".to_string(), json!(self.filename));
        payload
    }
}

fn horizontal_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("literal pattern compiles"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("literal pattern compiles"))
}

/// Collapse runs of spaces and tabs, cap blank lines at one, trim
pub fn clean_text(text: &str) -> String {
    let text = horizontal_space().replace_all(text, " ");
    let text = blank_lines().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Split text into windows of `chunk_size` words overlapping by `overlap`
///
/// Windows start every `max(1, chunk_size - overlap)` words and stop once a
/// window reaches the last word, so a text of at most `chunk_size` words is a
/// single window and an empty text has none.
pub fn segment(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Clean and segment each page of a document into chunks
///
/// `pages` are in page order; numbering starts at 1 and pages without text
/// produce no chunks but still advance the page number.
pub fn build_chunks(
    meta: &DocumentMeta,
    pages: &[String],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (page_no, raw) in (1u32..).zip(pages) {
        let text = clean_text(raw);
        if text.is_empty() {
            continue;
        }

        for (seq, window) in segment(&text, chunk_size, overlap).into_iter().enumerate() {
            chunks.push(Chunk {
                chunk_id: format!("{}_p{}_c{}", meta.doc_id, page_no, seq),
                doc_id: meta.doc_id.clone(),
                title: meta.title.clone(),
                page: page_no,
                url: meta.url.clone(),
                vigencia: meta.vigencia.clone(),
                text: window,
                filename: meta.filename.clone(),
            });
        }
    }

    chunks
}

/// Outcome of a directory ingestion
#[derive(Debug, Default)]
pub struct IngestReport {
    pub chunks: Vec<Chunk>,
    /// Documents that produced at least one chunk
    pub documents: usize,
    /// Files with an unsupported extension
    pub ignored: usize,
    /// Documents whose extraction failed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// Ingest every PDF and HTML file directly inside `raw_dir`
///
/// Files are processed in name order. A document that cannot be extracted is
/// logged and skipped; the rest of the directory is still ingested.
pub fn ingest_directory(
    raw_dir: &Path,
    registry: &SourceRegistry,
    chunk_size: usize,
    overlap: usize,
) -> Result<IngestReport> {
    let entries = std::fs::read_dir(raw_dir)
        .map_err(|e| RagError::io(e, format!("Failed to read {}", raw_dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RagError::io(e, "Failed to read directory entry"))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut report = IngestReport::default();

    for path in files {
        let Some(kind) = DocumentKind::from_path(&path) else {
            debug!("Ignoring {}", path.display());
            report.ignored += 1;
            continue;
        };

        info!("Processing {}", path.display());

        let pages = match extract_pages(&path, kind) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
                continue;
            }
        };

        let meta = registry.resolve(&path);
        let chunks = build_chunks(&meta, &pages, chunk_size, overlap);
        debug!("{}: {} chunks", meta.filename, chunks.len());

        if !chunks.is_empty() {
            report.documents += 1;
        }
        report.chunks.extend(chunks);
    }

    info!(
        "Ingested {} chunks from {} documents ({} failed)",
        report.chunks.len(),
        report.documents,
        report.failed.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn meta(doc_id: &str) -> DocumentMeta {
        DocumentMeta {
            doc_id: doc_id.to_string(),
            title: "Reglamento".to_string(),
            url: "https://ufro.cl/r".to_string(),
            vigencia: "2024".to_string(),
            filename: format!("{}.pdf", doc_id),
        }
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a \t\t b  \n\n\n\n c  "), "a b \n\n c");
        assert_eq!(clean_text("uno\n\ndos"), "uno\n\ndos");
        assert_eq!(clean_text(" \t \n "), "");
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(segment(&words(10), 900, 120), vec![words(10)]);
        // more words than the step but no more than the window
        assert_eq!(segment(&words(800), 900, 120), vec![words(800)]);
        assert_eq!(segment(&words(900), 900, 120), vec![words(900)]);
        assert_eq!(segment(&words(3), 3, 1), vec![words(3)]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(segment("", 900, 120).is_empty());
        assert!(segment(" \n\t ", 900, 120).is_empty());
    }

    #[test]
    fn test_windows_overlap_and_stop_at_last_word() {
        // 10 words, size 4, overlap 1 -> starts at 0, 3, 6
        let chunks = segment(&words(10), 4, 1);
        assert_eq!(chunks, vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9"]);
    }

    #[test]
    fn test_chunks_reconstruct_text_without_overlap() {
        for (n, size, overlap) in [(10usize, 4usize, 1usize), (2000, 900, 120), (901, 900, 0), (50, 7, 3)] {
            let text = words(n);
            let chunks = segment(&text, size, overlap);

            let mut rebuilt: Vec<String> = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let window: Vec<&str> = chunk.split_whitespace().collect();
                assert!(window.len() <= size);
                let skip = if i == 0 { 0 } else { overlap };
                rebuilt.extend(window.into_iter().skip(skip).map(str::to_string));
            }

            let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            assert_eq!(rebuilt, original, "n={} size={} overlap={}", n, size, overlap);
        }
    }

    #[test]
    fn test_chunk_count_formula() {
        for (n, size, overlap) in [
            (1800usize, 900usize, 120usize),
            (2000, 900, 120),
            (901, 900, 0),
            (50, 7, 3),
            (10, 4, 1),
        ] {
            let expected = (n - overlap).div_ceil(size - overlap);
            assert_eq!(segment(&words(n), size, overlap).len(), expected);
        }
    }

    #[test]
    fn test_overlap_at_least_chunk_size_terminates() {
        let chunks = segment(&words(5), 3, 3);
        assert_eq!(chunks, vec!["w0 w1 w2", "w1 w2 w3", "w2 w3 w4"]);

        let chunks = segment(&words(4), 2, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "w2 w3");
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        assert_eq!(segment("a b c", 0, 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_build_chunks_ids_and_pages() {
        // 5 words at size 3, overlap 1 -> starts at 0, 2
        let pages = vec![words(5), "   ".to_string(), words(3)];
        let chunks = build_chunks(&meta("REG"), &pages, 3, 1);

        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["REG_p1_c0", "REG_p1_c1", "REG_p3_c0"]);
        assert_eq!(chunks[2].page, 3);
        assert_eq!(chunks[0].title, "Reglamento");
        assert_eq!(chunks[0].filename, "REG.pdf");
    }

    #[test]
    fn test_payload_fields() {
        let chunk = build_chunks(&meta("A"), &[words(2)], 900, 120).remove(0);
        let payload = chunk.to_payload();
        assert_eq!(payload["chunk_id"], json!("A_p1_c0"));
        assert_eq!(payload["page"], json!(1));
        assert_eq!(payload["url"], json!("https://ufro.cl/r"));
        assert_eq!(payload["text"], json!("w0 w1"));
    }

    #[test]
    fn test_ingest_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "<p>Artículo primero del reglamento</p>").unwrap();
        std::fs::write(dir.path().join("b.txt"), "ignored").unwrap();
        // Not a real PDF: extraction fails (or pdftotext is absent) and the file is skipped
        std::fs::write(dir.path().join("c.pdf"), "not a pdf").unwrap();

        let report = ingest_directory(dir.path(), &SourceRegistry::default(), 900, 120).unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].chunk_id, "a_p1_c0");
        assert_eq!(report.chunks[0].text, "Artículo primero del reglamento");
    }
}

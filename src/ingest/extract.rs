//! Page text extraction for PDF and HTML documents

use std::path::Path;
use std::process::Command;

use scraper::Html;
use tracing::debug;

use crate::error::{RagError, Result};

/// Page separator emitted by `pdftotext`
const FORM_FEED: char = '\u{c}';

/// Elements whose text never reaches the corpus
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Document formats the ingester understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Html,
}

impl DocumentKind {
    /// Classify by file extension, `None` for anything else
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "html" | "htm" => Some(DocumentKind::Html),
            _ => None,
        }
    }
}

/// Extract raw page texts, in page order
///
/// PDFs yield one entry per page (pages without text are empty strings so
/// numbering stays aligned); HTML files yield a single page.
pub fn extract_pages(path: &Path, kind: DocumentKind) -> Result<Vec<String>> {
    match kind {
        DocumentKind::Pdf => extract_pdf_pages(path),
        DocumentKind::Html => {
            let bytes = std::fs::read(path)
                .map_err(|e| RagError::io(e, format!("Failed to read {}", path.display())))?;
            let html = String::from_utf8_lossy(&bytes);
            Ok(vec![html_to_text(&html)])
        }
    }
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            message: format!("pdftotext command failed: {} (is poppler installed?)", e),
        })?;

    if !output.status.success() {
        return Err(RagError::Extraction {
            path: path.to_path_buf(),
            message: format!(
                "pdftotext failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let pages = split_pages(&text);
    debug!("{}: {} pages", path.display(), pages.len());
    Ok(pages)
}

/// Split `pdftotext` output into pages
pub(crate) fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(FORM_FEED).map(str::to_string).collect();
    // pdftotext terminates every page, including the last, with a form feed
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

/// Visible text of an HTML document, one text node per line
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });

        if !hidden {
            parts.push(&**text);
        }
    }

    parts.join("\n")
}

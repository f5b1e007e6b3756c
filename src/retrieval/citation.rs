//! Citation deduplication

use crate::retrieval::{Citation, RetrievedChunk};
use ahash::AHashSet;

/// One citation per distinct `(title, page, url)`, in first-occurrence order
///
/// Defaults are applied before comparing, so two chunks that both lack a
/// title collapse into a single "Documento Desconocido" citation.
pub fn dedupe_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    let mut seen: AHashSet<Citation> = AHashSet::with_capacity(chunks.len());

    chunks
        .iter()
        .map(RetrievedChunk::citation)
        .filter(|citation| seen.insert(citation.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::PageRef;

    fn chunk(title: Option<&str>, page: Option<u32>, url: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            text: "texto".to_string(),
            score: 0.5,
            chunk_id: None,
            doc_id: None,
            title: title.map(str::to_string),
            page: page.map(PageRef::Number),
            url: url.map(str::to_string),
            vigencia: None,
        }
    }

    #[test]
    fn test_keeps_first_occurrence_order() {
        let chunks = vec![
            chunk(Some("B"), Some(2), Some("u2")),
            chunk(Some("A"), Some(1), Some("u1")),
            chunk(Some("B"), Some(2), Some("u2")),
            chunk(Some("A"), Some(3), Some("u1")),
        ];

        let citations = dedupe_citations(&chunks);
        let titles: Vec<(&str, String)> = citations
            .iter()
            .map(|c| (c.title.as_str(), c.page.to_string()))
            .collect();
        assert_eq!(
            titles,
            vec![("B", "2".to_string()), ("A", "1".to_string()), ("A", "3".to_string())]
        );
    }

    #[test]
    fn test_defaults_collapse() {
        let chunks = vec![chunk(None, None, None), chunk(None, None, None)];
        let citations = dedupe_citations(&chunks);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].title, "Documento Desconocido");
        assert_eq!(citations[0].url, "#");
    }

    #[test]
    fn test_idempotent() {
        let chunks = vec![
            chunk(Some("A"), Some(1), Some("u")),
            chunk(Some("A"), Some(1), Some("u")),
            chunk(Some("C"), None, Some("u")),
        ];

        let once = dedupe_citations(&chunks);
        let as_chunks: Vec<RetrievedChunk> = once
            .iter()
            .map(|c| RetrievedChunk {
                title: Some(c.title.clone()),
                page: Some(c.page.clone()),
                url: Some(c.url.clone()),
                ..chunk(None, None, None)
            })
            .collect();

        assert_eq!(dedupe_citations(&as_chunks), once);
    }

    #[test]
    fn test_empty() {
        assert!(dedupe_citations(&[]).is_empty());
    }
}

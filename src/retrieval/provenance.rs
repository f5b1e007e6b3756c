//! Retrieved chunks and the citations derived from them

use crate::embedding::{Payload, ScoredPoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Title used when a chunk carries none
pub const DEFAULT_TITLE: &str = "Documento Desconocido";
/// Page label used when a chunk carries no page
pub const DEFAULT_PAGE: &str = "N/D";
/// URL used when a chunk carries none
pub const DEFAULT_URL: &str = "#";

/// A page number, or a free-form label when the page is not numeric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(u32),
    Label(String),
}

impl PageRef {
    /// Interpret a payload value; null and blank strings are absent
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(PageRef::Number)
                .or_else(|| Some(PageRef::Label(n.to_string()))),
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(
                        s.parse::<u32>()
                            .map(PageRef::Number)
                            .unwrap_or_else(|_| PageRef::Label(s.to_string())),
                    )
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Number(n) => write!(f, "{}", n),
            PageRef::Label(label) => f.write_str(label),
        }
    }
}

/// Source reference shown to the user: `{title, page, url}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub page: PageRef,
    pub url: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, p.{}] (URL: {})", self.title, self.page, self.url)
    }
}

/// A chunk returned by the retriever
///
/// Metadata is optional because payloads written by other tools may lack
/// fields; defaults are applied only when a [`Citation`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub chunk_id: Option<String>,
    pub doc_id: Option<String>,
    pub title: Option<String>,
    pub page: Option<PageRef>,
    pub url: Option<String>,
    pub vigencia: Option<String>,
}

impl RetrievedChunk {
    pub fn from_payload(payload: &Payload, score: f32) -> Self {
        Self {
            text: string_field(payload, "text").unwrap_or_default(),
            score,
            chunk_id: string_field(payload, "chunk_id"),
            doc_id: string_field(payload, "doc_id"),
            title: string_field(payload, "title"),
            page: payload.get("page").and_then(PageRef::from_value),
            url: string_field(payload, "url"),
            vigencia: string_field(payload, "vigencia"),
        }
    }

    /// Citation with defaults for missing title, page and url
    pub fn citation(&self) -> Citation {
        Citation {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            page: self
                .page
                .clone()
                .unwrap_or_else(|| PageRef::Label(DEFAULT_PAGE.to_string())),
            url: self.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
        }
    }
}

impl From<ScoredPoint> for RetrievedChunk {
    fn from(point: ScoredPoint) -> Self {
        Self::from_payload(&point.payload, point.score)
    }
}

/// Non-blank string field; numbers are rendered as text
fn string_field(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_full_payload() {
        let chunk = RetrievedChunk::from_payload(
            &payload(json!({
                "chunk_id": "REG_p3_c1",
                "title": "Reglamento de Convivencia",
                "page": 3,
                "url": "https://ufro.cl/conv.pdf",
                "text": "Artículo 12."
            })),
            0.83,
        );

        assert_eq!(chunk.text, "Artículo 12.");
        assert_eq!(chunk.page, Some(PageRef::Number(3)));
        assert_eq!(
            chunk.citation().to_string(),
            "[Reglamento de Convivencia, p.3] (URL: https://ufro.cl/conv.pdf)"
        );
    }

    #[test]
    fn test_missing_null_and_blank_fields_default() {
        let chunk = RetrievedChunk::from_payload(
            &payload(json!({"text": "x", "title": null, "url": "  "})),
            0.5,
        );

        let citation = chunk.citation();
        assert_eq!(citation.title, DEFAULT_TITLE);
        assert_eq!(citation.page, PageRef::Label(DEFAULT_PAGE.to_string()));
        assert_eq!(citation.url, DEFAULT_URL);
    }

    #[test]
    fn test_page_variants() {
        assert_eq!(PageRef::from_value(&json!("7")), Some(PageRef::Number(7)));
        assert_eq!(
            PageRef::from_value(&json!("iv")),
            Some(PageRef::Label("iv".to_string()))
        );
        assert_eq!(PageRef::from_value(&json!("")), None);
        assert_eq!(PageRef::from_value(&Value::Null), None);
    }

    #[test]
    fn test_citation_json_shape() {
        let citation = Citation {
            title: "T".to_string(),
            page: PageRef::Number(2),
            url: "#".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&citation).unwrap(),
            json!({"title": "T", "page": 2, "url": "#"})
        );

        let citation = RetrievedChunk::from_payload(&Payload::new(), 0.0).citation();
        assert_eq!(serde_json::to_value(&citation).unwrap()["page"], json!("N/D"));
    }
}

//! Citation data model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::extractor::extract_domain;
use crate::utils::truncate_chars;

/// Length of the `content_snippet` taken from page content.
pub const SNIPPET_CHARS: usize = 500;

/// Metadata describing one cited source. The URL is the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationMetadata {
    pub url: String,
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content_snippet: Option<String>,
    #[serde(default)]
    pub raw_content: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub favicon: Option<String>,

    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub credibility_score: f64,

    #[serde(default = "now_iso")]
    pub accessed_at: String,

    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl CitationMetadata {
    /// Create metadata for `url`; the domain is derived from the URL.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        let domain = Some(extract_domain(&url)).filter(|d| !d.is_empty());
        Self {
            url,
            title: title.into(),
            description: None,
            content_snippet: None,
            raw_content: None,
            domain,
            author: None,
            published_date: None,
            language: None,
            images: Vec::new(),
            favicon: None,
            relevance_score: 0.0,
            credibility_score: 0.0,
            accessed_at: now_iso(),
            extra: Map::new(),
        }
    }

    /// Stable short id: first 12 hex chars of SHA-256 over the URL.
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.url.as_bytes());
        hex::encode(digest)[..12].to_string()
    }

    /// Build metadata from one search-result object
    /// (`{type, url, title, content|desc|description, score, raw_content}`).
    pub fn from_search_result(result: &Value, query: &str) -> Self {
        let url = result.get("url").and_then(Value::as_str).unwrap_or_default();
        let title = result
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled");
        let content = ["content", "desc"]
            .iter()
            .filter_map(|key| result.get(*key).and_then(Value::as_str))
            .find(|text| !text.is_empty());

        let mut metadata = Self::new(url, title);
        metadata.description = content
            .or_else(|| result.get("description").and_then(Value::as_str))
            .map(str::to_string);
        metadata.content_snippet = content
            .filter(|c| !c.is_empty())
            .map(|c| truncate_chars(c, SNIPPET_CHARS).to_string());
        metadata.raw_content = result
            .get("raw_content")
            .and_then(Value::as_str)
            .map(str::to_string);
        metadata.relevance_score = result.get("score").and_then(Value::as_f64).unwrap_or(0.0);
        metadata
            .extra
            .insert("query".to_string(), Value::String(query.to_string()));
        metadata.extra.insert(
            "result_type".to_string(),
            result
                .get("type")
                .cloned()
                .unwrap_or_else(|| Value::String("page".to_string())),
        );
        metadata
    }

    /// Where this entry came from (`web_search`, `crawl`), when known.
    pub fn source_type(&self) -> Option<&str> {
        self.extra.get("source_type").and_then(Value::as_str)
    }

    /// JSON form including the derived `id`.
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.insert("id".to_string(), Value::String(self.id()));
        }
        value
    }
}

/// A numbered reference to a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub number: usize,
    pub metadata: CitationMetadata,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub cited_text: Option<String>,
}

impl Citation {
    pub fn new(number: usize, metadata: CitationMetadata) -> Self {
        Self {
            number,
            metadata,
            context: None,
            cited_text: None,
        }
    }

    pub fn id(&self) -> String {
        self.metadata.id()
    }

    pub fn url(&self) -> &str {
        &self.metadata.url
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    /// `[Title](URL)`
    pub fn to_markdown_reference(&self) -> String {
        format!("[{}]({})", self.title(), self.url())
    }

    /// `[1] Title - URL`
    pub fn to_numbered_reference(&self) -> String {
        format!("[{}] {} - {}", self.number, self.title(), self.url())
    }

    /// `[^1]`
    pub fn to_inline_marker(&self) -> String {
        format!("[^{}]", self.number)
    }

    /// `[^1]: Title - URL`
    pub fn to_footnote(&self) -> String {
        format!("[^{}]: {} - {}", self.number, self.title(), self.url())
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "number": self.number,
            "metadata": self.metadata.to_json(),
            "context": self.context,
            "cited_text": self.cited_text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_is_stable_sha_prefix() {
        let a = CitationMetadata::new("https://example.com", "A");
        let b = CitationMetadata::new("https://example.com", "B");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 12);
        assert!(a.id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_domain_derived_from_url() {
        let m = CitationMetadata::new("https://docs.rs:8443/serde", "Serde");
        assert_eq!(m.domain.as_deref(), Some("docs.rs:8443"));
    }

    #[test]
    fn test_from_search_result_defaults() {
        let long = "x".repeat(800);
        let m = CitationMetadata::from_search_result(
            &json!({"url": "https://a.io/p", "content": long, "score": 0.7}),
            "rust",
        );
        assert_eq!(m.title, "Untitled");
        assert_eq!(m.content_snippet.as_ref().map(|s| s.len()), Some(500));
        assert_eq!(m.relevance_score, 0.7);
        assert_eq!(m.extra["query"], "rust");
        assert_eq!(m.extra["result_type"], "page");
    }

    #[test]
    fn test_renderings() {
        let c = Citation::new(3, CitationMetadata::new("https://a.io", "A"));
        assert_eq!(c.to_markdown_reference(), "[A](https://a.io)");
        assert_eq!(c.to_numbered_reference(), "[3] A - https://a.io");
        assert_eq!(c.to_inline_marker(), "[^3]");
        assert_eq!(c.to_footnote(), "[^3]: A - https://a.io");
        assert_eq!(c.to_json()["metadata"]["id"], c.id());
    }
}

//! Keyword retrieval over user-supplied resource files
//!
//! Each resource is split into paragraph chunks that are scored with BM25.
//! Results use the document shape `[{id, url, title, content}]`.

use crate::tools::registry::Tool;
use crate::types::{AppError, Resource, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub const LOCAL_SEARCH_TOOL: &str = "local_search_tool";

/// Chunks larger than this are split further
const MAX_CHUNK_CHARS: usize = 1500;

/// BM25 search index for lexical matching
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// Document ID -> tokenized content
    documents: HashMap<String, Vec<String>>,
    /// Term -> document IDs containing term
    inverted_index: HashMap<String, HashSet<String>>,
    document_frequencies: HashMap<String, usize>,
    avg_doc_length: f32,
    /// Term frequency saturation
    k1: f32,
    /// Length normalization
    b: f32,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            ..Default::default()
        }
    }

    /// Tokenize text into lowercase terms
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() > 1)
            .map(String::from)
            .collect()
    }

    pub fn add_document(&mut self, id: &str, content: &str) {
        let tokens = Self::tokenize(content);

        let unique_terms: HashSet<_> = tokens.iter().cloned().collect();
        for term in &unique_terms {
            *self.document_frequencies.entry(term.clone()).or_insert(0) += 1;
            self.inverted_index
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }

        self.documents.insert(id.to_string(), tokens);

        let total_tokens: usize = self.documents.values().map(|v| v.len()).sum();
        self.avg_doc_length = total_tokens as f32 / self.documents.len() as f32;
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f32;
        let n = self.documents.len() as f32;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_document(&self, doc_id: &str, query_terms: &[String]) -> f32 {
        let Some(doc_tokens) = self.documents.get(doc_id) else {
            return 0.0;
        };

        let doc_len = doc_tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for token in doc_tokens {
            *term_freq.entry(token.as_str()).or_insert(0) += 1;
        }

        query_terms
            .iter()
            .map(|term| {
                let tf = term_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
                let numerator = tf * (self.k1 + 1.0);
                let denominator =
                    tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length.max(1.0));
                self.idf(term) * numerator / denominator
            })
            .sum()
    }

    /// Search the index and return the top-k document ids with scores
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut candidates: HashSet<&String> = HashSet::new();
        for term in &query_terms {
            if let Some(docs) = self.inverted_index.get(term) {
                candidates.extend(docs.iter());
            }
        }

        let mut results: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|id| (id.clone(), self.score_document(id, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(top_k);
        results
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    uri: String,
    title: String,
    content: String,
}

/// BM25 retrieval over the resource files attached to a run
pub struct LocalSearchTool {
    index: Bm25Index,
    chunks: HashMap<String, Chunk>,
    top_k: usize,
}

/// Filesystem path behind a resource URI (`file://` or a plain path).
pub fn resource_path(uri: &str) -> PathBuf {
    if let Ok(parsed) = url::Url::parse(uri) {
        if parsed.scheme() == "file" {
            if let Ok(path) = parsed.to_file_path() {
                return path;
            }
        }
    }
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

/// Paragraph chunks, with long paragraphs split on character count.
fn split_into_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let chars: Vec<char> = paragraph.chars().collect();
        for piece in chars.chunks(MAX_CHUNK_CHARS) {
            chunks.push(piece.iter().collect());
        }
    }
    chunks
}

impl LocalSearchTool {
    /// Index already-loaded `(resource, text)` pairs.
    pub fn from_texts(documents: Vec<(Resource, String)>, top_k: usize) -> Self {
        let mut index = Bm25Index::new();
        let mut chunks = HashMap::new();

        for (resource, text) in documents {
            for (n, content) in split_into_chunks(&text).into_iter().enumerate() {
                let id = format!("{}#{}", resource.uri, n);
                index.add_document(&id, &content);
                chunks.insert(
                    id,
                    Chunk {
                        uri: resource.uri.clone(),
                        title: resource.title.clone(),
                        content,
                    },
                );
            }
        }

        Self {
            index,
            chunks,
            top_k: top_k.max(1),
        }
    }

    /// Read and index resource files. Unreadable files are skipped with a
    /// warning.
    pub async fn load(resources: &[Resource], top_k: usize) -> Self {
        let mut documents = Vec::with_capacity(resources.len());
        for resource in resources {
            let path = resource_path(&resource.uri);
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => documents.push((resource.clone(), text)),
                Err(e) => tracing::warn!("Skipping resource {:?}: {}", path, e),
            }
        }
        Self::from_texts(documents, top_k)
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl Tool for LocalSearchTool {
    fn name(&self) -> &str {
        LOCAL_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Retrieve information from the local resource files the user provided"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keywords": {
                    "type": "string",
                    "description": "Keywords to look up in the resource files"
                }
            },
            "required": ["keywords"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let keywords = args
            .get("keywords")
            .or_else(|| args.get("query"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'keywords' parameter".to_string()))?;

        let documents: Vec<Value> = self
            .index
            .search(keywords, self.top_k)
            .into_iter()
            .filter_map(|(id, _)| {
                self.chunks.get(&id).map(|chunk| {
                    json!({
                        "id": id,
                        "url": chunk.uri,
                        "title": chunk.title,
                        "content": chunk.content,
                    })
                })
            })
            .collect();

        if documents.is_empty() {
            return Ok(json!(format!("No results found for '{}'", keywords)));
        }
        Ok(Value::Array(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn resource(uri: &str, title: &str) -> Resource {
        Resource {
            uri: uri.to_string(),
            title: title.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_bm25_prefers_matching_document() {
        let mut index = Bm25Index::new();
        index.add_document("rust", "Rust ownership and borrowing rules");
        index.add_document("python", "Python garbage collection and reference counting");
        let results = index.search("borrowing in rust", 5);
        assert_eq!(results[0].0, "rust");
        assert_eq!(results.len(), 1);
        assert!(index.search("", 5).is_empty());
    }

    #[test]
    fn test_split_into_chunks() {
        let long = "x".repeat(MAX_CHUNK_CHARS + 10);
        let text = format!("first\n\n\n\nsecond\n\n{}", long);
        let chunks = split_into_chunks(&text);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], "first");
        assert_eq!(chunks[3].len(), 10);
    }

    #[rstest::rstest]
    #[case("file:///tmp/notes.md", "/tmp/notes.md")]
    #[case("docs/notes.md", "docs/notes.md")]
    fn test_resource_path(#[case] uri: &str, #[case] expected: &str) {
        assert_eq!(resource_path(uri), PathBuf::from(expected));
    }

    #[tokio::test]
    async fn test_local_search_over_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Quantum error correction uses surface codes.\n\nUnrelated gardening tips.")
            .unwrap();

        let tool = LocalSearchTool::load(
            &[
                resource(path.to_str().unwrap(), "Notes"),
                resource("/definitely/missing.md", "Missing"),
            ],
            3,
        )
        .await;
        assert_eq!(tool.chunk_count(), 2);

        let value = tool
            .execute(json!({"keywords": "surface codes"}))
            .await
            .unwrap();
        let docs = value.as_array().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["title"], "Notes");
        assert!(docs[0]["content"].as_str().unwrap().contains("surface codes"));

        let none = tool.execute(json!({"keywords": "volcano"})).await.unwrap();
        assert!(none.as_str().unwrap().starts_with("No results"));
    }
}

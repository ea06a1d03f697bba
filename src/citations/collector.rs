//! URL-keyed citation store with stable numbering.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::models::{Citation, CitationMetadata, SNIPPET_CHARS};
use crate::utils::truncate_chars;

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"))
}

fn bare_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s\)>\]]+").expect("valid url regex"))
}

/// Serialized form of a [`CitationCollector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorSnapshot {
    #[serde(default)]
    pub citations: Vec<CitationMetadata>,
    #[serde(default)]
    pub used_urls: Vec<String>,
}

/// Owns the canonical citation list for a run.
///
/// Every URL gets a number equal to its insertion position plus one, and
/// that number never changes while the collector lives, no matter how the
/// metadata behind it is updated later.
#[derive(Debug, Clone, Default)]
pub struct CitationCollector {
    citations: HashMap<String, CitationMetadata>,
    order: Vec<String>,
    used: HashSet<String>,
    url_to_index: HashMap<String, usize>,
}

impl CitationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collector from an ordered metadata list (first copy of a URL wins).
    pub fn from_metadata<'a>(metadata: impl IntoIterator<Item = &'a CitationMetadata>) -> Self {
        let mut collector = Self::new();
        for entry in metadata {
            collector.insert_new(entry.clone());
        }
        collector
    }

    fn insert_new(&mut self, metadata: CitationMetadata) -> bool {
        if metadata.url.is_empty() || self.citations.contains_key(&metadata.url) {
            return false;
        }
        let url = metadata.url.clone();
        self.url_to_index.insert(url.clone(), self.order.len());
        self.order.push(url.clone());
        self.citations.insert(url, metadata);
        true
    }

    /// Add search results; returns only the entries that were new.
    /// An already-known URL is replaced when the incoming score is
    /// strictly higher.
    pub fn add_from_search_results(
        &mut self,
        results: &[Value],
        query: &str,
    ) -> Vec<CitationMetadata> {
        let mut added = Vec::new();

        for result in results {
            if result.get("type").and_then(Value::as_str) == Some("image_url") {
                continue;
            }
            let Some(url) = result
                .get("url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
            else {
                continue;
            };

            let metadata = CitationMetadata::from_search_result(result, query);
            match self.citations.get_mut(url) {
                Some(existing) => {
                    if metadata.relevance_score > existing.relevance_score {
                        *existing = metadata;
                    }
                }
                None => {
                    self.insert_new(metadata.clone());
                    added.push(metadata);
                }
            }
        }

        tracing::info!(
            "Added {} new citations from search results (total: {})",
            added.len(),
            self.order.len()
        );
        added
    }

    /// Add or enrich an entry from a crawled page. Existing information is
    /// never lowered: the title only replaces an empty or "Untitled" one
    /// and the snippet is only backfilled.
    pub fn add_from_crawl_result(
        &mut self,
        url: &str,
        title: &str,
        content: &str,
        extra: Map<String, Value>,
    ) -> Option<CitationMetadata> {
        if url.is_empty() {
            return None;
        }

        if let Some(existing) = self.citations.get_mut(url) {
            if !title.is_empty()
                && title != "Untitled"
                && (existing.title.is_empty() || existing.title == "Untitled")
            {
                existing.title = title.to_string();
            }
            if !content.is_empty() {
                existing.raw_content = Some(content.to_string());
                if existing.content_snippet.as_deref().is_none_or(str::is_empty) {
                    existing.content_snippet =
                        Some(truncate_chars(content, SNIPPET_CHARS).to_string());
                }
            }
            existing.extra.extend(extra);
            return Some(existing.clone());
        }

        let title = if title.is_empty() { "Untitled" } else { title };
        let mut metadata = CitationMetadata::new(url, title);
        if !content.is_empty() {
            metadata.raw_content = Some(content.to_string());
            metadata.content_snippet = Some(truncate_chars(content, SNIPPET_CHARS).to_string());
        }
        metadata.extra = extra;
        self.insert_new(metadata.clone());
        Some(metadata)
    }

    /// Mark a URL as cited in the report. Unknown URLs are ignored.
    pub fn mark_used(&mut self, url: &str) -> Option<usize> {
        let number = self.get_number(url)?;
        self.used.insert(url.to_string());
        Some(number)
    }

    /// 1-indexed position of `url`.
    pub fn get_number(&self, url: &str) -> Option<usize> {
        self.url_to_index.get(url).map(|i| i + 1)
    }

    pub fn get_metadata(&self, url: &str) -> Option<&CitationMetadata> {
        self.citations.get(url)
    }

    /// Every citation, numbered by position.
    pub fn get_all_citations(&self) -> Vec<Citation> {
        self.order
            .iter()
            .enumerate()
            .filter_map(|(i, url)| {
                self.citations
                    .get(url)
                    .map(|m| Citation::new(i + 1, m.clone()))
            })
            .collect()
    }

    /// Used citations only, renumbered 1..k in position order.
    pub fn get_used_citations(&self) -> Vec<Citation> {
        self.order
            .iter()
            .filter(|url| self.used.contains(*url))
            .filter_map(|url| self.citations.get(url))
            .enumerate()
            .map(|(i, m)| Citation::new(i + 1, m.clone()))
            .collect()
    }

    /// Metadata in position order.
    pub fn metadata_list(&self) -> Vec<CitationMetadata> {
        self.order
            .iter()
            .filter_map(|url| self.citations.get(url).cloned())
            .collect()
    }

    pub fn to_snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            citations: self.metadata_list(),
            used_urls: self
                .order
                .iter()
                .filter(|url| self.used.contains(*url))
                .cloned()
                .collect(),
        }
    }

    /// Rebuild a collector; the index is recomputed in list order.
    pub fn from_snapshot(snapshot: CollectorSnapshot) -> Self {
        let mut collector = Self::new();
        for metadata in snapshot.citations {
            collector.insert_new(metadata);
        }
        for url in snapshot.used_urls {
            if collector.citations.contains_key(&url) {
                collector.used.insert(url);
            }
        }
        collector
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.to_snapshot()).unwrap_or(Value::Null)
    }

    pub fn from_json(value: Value) -> crate::types::Result<Self> {
        let snapshot: CollectorSnapshot = serde_json::from_value(value)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Append `other`'s unseen URLs in its order and union the used sets.
    /// Existing metadata is kept as is.
    pub fn merge_with(&mut self, other: &CitationCollector) {
        for url in &other.order {
            if let Some(metadata) = other.citations.get(url) {
                self.insert_new(metadata.clone());
            }
        }
        for url in &other.used {
            if self.citations.contains_key(url) {
                self.used.insert(url.clone());
            }
        }
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn clear(&mut self) {
        self.citations.clear();
        self.order.clear();
        self.used.clear();
        self.url_to_index.clear();
    }
}

/// URLs mentioned in `text`: markdown link targets first, then bare
/// `http(s)` URLs not already inside a link, de-duplicated in order.
pub fn extract_urls_from_text(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for caps in markdown_link().captures_iter(text) {
        let url = &caps[2];
        if (url.starts_with("http://") || url.starts_with("https://"))
            && seen.insert(url.to_string())
        {
            urls.push(url.to_string());
        }
    }

    for m in bare_url().find_iter(text) {
        let preceded_by_bracket = text[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c == '(' || c == '[');
        if !preceded_by_bracket && seen.insert(m.as_str().to_string()) {
            urls.push(m.as_str().to_string());
        }
    }

    urls
}

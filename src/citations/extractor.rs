//! Pulls citation candidates out of an agent transcript.
//!
//! Tool results are recognized by the producing tool's name first and by
//! their JSON shape second, so a renamed or third-party search tool still
//! contributes citations as long as it returns the usual result objects.

use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::models::{CitationMetadata, SNIPPET_CHARS};
use crate::types::{Message, MessageRole};
use crate::utils::truncate_chars;

const SEARCH_TOOLS: &[&str] = &[
    "web_search",
    "tavily_search",
    "duckduckgo_search",
    "brave_search",
    "searx_search",
];

const CRAWL_TOOLS: &[&str] = &["crawl_tool", "crawl", "jina_crawl"];

/// Default cap for [`extract_title_from_content`].
pub const DEFAULT_TITLE_MAX_LEN: usize = 200;

const DESCRIPTION_CHARS: usize = 300;

fn html_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").expect("valid title regex"))
}

fn h1_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*$").expect("valid heading regex"))
}

fn sub_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{2,6}[ \t]+(.+?)[ \t]*$").expect("valid heading regex"))
}

fn title_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"?title"?\s*:\s*["']?([^"'\n]+)["']?"#).expect("valid title field regex")
    })
}

fn bare_host() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*(?::\d+)?)(?:[/?#]|$)",
        )
        .expect("valid host regex")
    })
}

/// Collect citation metadata from every tool-result message in `messages`.
/// URLs are deduplicated within the call; the first occurrence wins.
pub fn extract_citations_from_messages(messages: &[Message]) -> Vec<CitationMetadata> {
    let mut citations = Vec::new();
    let mut seen = HashSet::new();

    for message in messages {
        if message.role != MessageRole::Tool {
            continue;
        }
        let tool_name = message.name.as_deref().unwrap_or_default();
        for citation in extract_from_tool_message(tool_name, &message.content.to_text()) {
            if seen.insert(citation.url.clone()) {
                citations.push(citation);
            }
        }
    }

    tracing::info!(
        "Extracted {} unique citations from {} messages",
        citations.len(),
        messages.len()
    );
    citations
}

fn extract_from_tool_message(tool_name: &str, content: &str) -> Vec<CitationMetadata> {
    let data: Value = match serde_json::from_str(content) {
        Ok(data) => data,
        Err(_) => {
            tracing::debug!("Tool result from '{}' is not JSON; no citations", tool_name);
            return Vec::new();
        }
    };

    if SEARCH_TOOLS.contains(&tool_name) {
        return extract_from_search_result(&data);
    }
    if CRAWL_TOOLS.contains(&tool_name) {
        return extract_from_crawl_result(&data).into_iter().collect();
    }

    match &data {
        Value::Array(items) if items.first().is_some_and(|f| f.get("url").is_some()) => {
            extract_from_search_result(&data)
        }
        Value::Object(map)
            if map.contains_key("url")
                && (map.contains_key("crawled_content") || map.contains_key("content")) =>
        {
            extract_from_crawl_result(&data).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn extract_from_search_result(data: &Value) -> Vec<CitationMetadata> {
    let items = match data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => {
            if let Some(error) = map.get("error") {
                tracing::warn!("Search tool returned an error: {}", error);
                return Vec::new();
            }
            match map.get("results") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    items.iter().filter_map(citation_from_search_item).collect()
}

fn citation_from_search_item(item: &Value) -> Option<CitationMetadata> {
    let item = item.as_object()?;
    if item.get("type").and_then(Value::as_str) == Some("image_url") {
        return None;
    }
    let url = item
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())?;

    let title = item
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Untitled");
    let content = ["content", "desc"]
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    let mut metadata = CitationMetadata::new(url, title);
    metadata.description = Some(content.to_string());
    metadata.content_snippet = Some(truncate_chars(content, SNIPPET_CHARS).to_string());
    metadata.relevance_score = item.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    metadata.extra.insert(
        "source_type".to_string(),
        Value::String("web_search".to_string()),
    );
    Some(metadata)
}

fn extract_from_crawl_result(data: &Value) -> Option<CitationMetadata> {
    let map = data.as_object()?;
    let url = map
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())?;

    let crawled = map
        .get("crawled_content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let content = map
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .unwrap_or(crawled);

    let title = extract_title_from_content(crawled, DEFAULT_TITLE_MAX_LEN);
    let mut metadata = CitationMetadata::new(url, title);
    metadata.description = Some(truncate_chars(content, DESCRIPTION_CHARS).to_string());
    metadata.content_snippet = Some(truncate_chars(content, SNIPPET_CHARS).to_string());
    metadata.raw_content = Some(content.to_string());
    metadata
        .extra
        .insert("source_type".to_string(), Value::String("crawl".to_string()));
    Some(metadata)
}

/// Best-effort page title, capped at `max_len` characters.
///
/// Tried in order: HTML `<title>`, a `#` heading, a `##`..`######`
/// heading, a `title:` field, the first substantial prose line.
pub fn extract_title_from_content(content: &str, max_len: usize) -> String {
    if content.is_empty() {
        return "Untitled".to_string();
    }

    let cap = |title: &str| truncate_chars(title.trim(), max_len).to_string();

    if let Some(caps) = html_title().captures(content) {
        let title = caps[1].trim();
        if !title.is_empty() {
            return cap(title);
        }
    }

    for heading in [h1_heading(), sub_heading()] {
        if let Some(caps) = heading.captures(content) {
            let title = caps[1].trim();
            if !title.is_empty() {
                return cap(title);
            }
        }
    }

    if let Some(caps) = title_field().captures(content) {
        let title = caps[1].trim();
        if title.chars().count() > 3 {
            return cap(title);
        }
    }

    const SKIP_PREFIXES: &[&str] = &["```", "---", "***", "- ", "* ", "+ ", "#"];
    for line in content.lines() {
        let line = line.trim();
        if line.chars().count() > 10 && !SKIP_PREFIXES.iter().any(|p| line.starts_with(p)) {
            return cap(line);
        }
    }

    "Untitled".to_string()
}

/// `host[:port]` of a URL, or of a bare `example.com/path` string. Empty
/// when neither form matches.
pub fn extract_domain(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }

    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            return match parsed.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
        }
    }

    if let Some(caps) = bare_host().captures(url) {
        return caps[1].to_string();
    }

    tracing::warn!("Could not extract domain from URL: {}", url);
    String::new()
}

/// URL-keyed merge. New URLs are appended in order; an existing entry is
/// refreshed only by an incoming copy with a strictly higher score, and
/// then only in the fields the incoming copy actually fills.
pub fn merge_citations(
    existing: &[CitationMetadata],
    new: &[CitationMetadata],
) -> Vec<CitationMetadata> {
    let mut merged: Vec<CitationMetadata> = existing.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, c)| (c.url.clone(), i))
        .collect();

    for incoming in new {
        if incoming.url.is_empty() {
            continue;
        }
        match index.get(&incoming.url) {
            Some(&i) => {
                let current = &mut merged[i];
                if incoming.relevance_score > current.relevance_score {
                    current.relevance_score = incoming.relevance_score;
                    if !incoming.title.is_empty() {
                        current.title = incoming.title.clone();
                    }
                    if incoming.description.as_deref().is_some_and(|d| !d.is_empty()) {
                        current.description = incoming.description.clone();
                    }
                    if incoming
                        .content_snippet
                        .as_deref()
                        .is_some_and(|s| !s.is_empty())
                    {
                        current.content_snippet = incoming.content_snippet.clone();
                    }
                }
            }
            None => {
                index.insert(incoming.url.clone(), merged.len());
                merged.push(incoming.clone());
            }
        }
    }

    merged
}

/// Render a `## Key Citations` block, one markdown link per citation with
/// an HTML comment carrying domain and score.
pub fn citations_to_markdown_references(citations: &[CitationMetadata]) -> String {
    if citations.is_empty() {
        return String::new();
    }

    let mut lines = vec!["## Key Citations".to_string(), String::new()];
    for citation in citations {
        let title = if citation.title.is_empty() {
            "Untitled"
        } else {
            citation.title.as_str()
        };
        lines.push(format!("- [{}]({})", title, citation.url));

        let mut parts = Vec::new();
        if let Some(domain) = citation.domain.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("domain: {}", domain));
        }
        if citation.relevance_score > 0.0 {
            parts.push(format!("score: {:.2}", citation.relevance_score));
        }
        if !parts.is_empty() {
            lines.push(format!("  <!-- {} -->", parts.join(", ")));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

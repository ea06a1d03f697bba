//! Cleanup applied to raw search results before they reach a model.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::utils::truncate_chars;

fn base64_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"data:image/[^;]+;base64,[a-zA-Z0-9+/=]+").expect("valid base64 image regex")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultPostProcessor {
    /// Page results scoring below this are dropped
    pub min_score: Option<f64>,
    /// `content` cap in characters; `raw_content` gets twice as much
    pub max_content_length_per_page: Option<usize>,
}

impl Default for SearchResultPostProcessor {
    fn default() -> Self {
        Self {
            min_score: None,
            max_content_length_per_page: Some(4000),
        }
    }
}

impl SearchResultPostProcessor {
    pub fn new(min_score: Option<f64>, max_content_length_per_page: Option<usize>) -> Self {
        Self {
            min_score,
            max_content_length_per_page,
        }
    }

    /// Deduplicate, filter, clean, truncate and sort results by score.
    pub fn process(&self, results: Vec<Value>) -> Vec<Value> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut processed: Vec<Value> = Vec::with_capacity(results.len());

        for result in results {
            let Value::Object(mut item) = result else {
                continue;
            };

            let key = match item.get("type").and_then(Value::as_str) {
                Some("image_url") => item.get("image_url").and_then(Value::as_str),
                _ => item.get("url").and_then(Value::as_str),
            }
            .map(str::to_string);

            if let Some(key) = key {
                if !seen.insert(key) {
                    continue;
                }
            }

            let is_page = item.get("type").and_then(Value::as_str) != Some("image_url");
            if is_page {
                if let Some(min) = self.min_score {
                    let score = item.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                    if score < min {
                        continue;
                    }
                }
                self.clean_page(&mut item);
            }

            processed.push(Value::Object(item));
        }

        processed.sort_by(|a, b| {
            let sa = a.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let sb = b.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        processed
    }

    fn clean_page(&self, item: &mut Map<String, Value>) {
        for (field, factor) in [("content", 1), ("raw_content", 2)] {
            let Some(text) = item.get(field).and_then(Value::as_str) else {
                continue;
            };
            let mut cleaned = base64_image_regex().replace_all(text, " ").into_owned();
            if let Some(max) = self.max_content_length_per_page {
                let limit = max * factor;
                if cleaned.chars().count() > limit {
                    cleaned = format!("{}...", truncate_chars(&cleaned, limit));
                }
            }
            item.insert(field.to_string(), Value::String(cleaned));
        }
    }
}

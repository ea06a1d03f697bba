//! Web search and crawl tools using daedra
//!
//! Search goes through DuckDuckGo; results come back in the page-result
//! shape the citation extractor understands:
//! `[{type: "page", url, title, content, score}]`.

use crate::tools::postprocessor::SearchResultPostProcessor;
use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use crate::utils::truncate_chars;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const WEB_SEARCH_TOOL: &str = "web_search";
pub const CRAWL_TOOL: &str = "crawl_tool";

/// Characters of crawled markdown handed back to the model
pub const CRAWL_CONTENT_LIMIT: usize = 1000;

/// Web search tool powered by daedra
pub struct SearchTool {
    max_results: usize,
    postprocessor: SearchResultPostProcessor,
}

impl SearchTool {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
            postprocessor: SearchResultPostProcessor::default(),
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: SearchResultPostProcessor) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// Run a search and return cleaned page results.
    pub async fn search(&self, query: &str) -> Result<Vec<Value>> {
        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: self.max_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| AppError::Tool(format!("Search failed: {}", e)))?;

        let total = response.data.len().max(1) as f64;
        let results: Vec<Value> = response
            .data
            .iter()
            .enumerate()
            .map(|(rank, r)| {
                json!({
                    "type": "page",
                    "title": r.title,
                    "url": r.url,
                    "content": r.description,
                    "score": rank_score(rank, total),
                })
            })
            .collect();

        let mut processed = self.postprocessor.process(results);
        processed.truncate(self.max_results);
        Ok(processed)
    }
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new(3)
    }
}

/// DuckDuckGo returns no relevance score, so rank order stands in for one.
fn rank_score(rank: usize, total: f64) -> f64 {
    let score = 1.0 - rank as f64 / total;
    (score * 1000.0).round() / 1000.0
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information using DuckDuckGo"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'query' parameter".to_string()))?;

        match self.search(query).await {
            Ok(results) => Ok(Value::Array(results)),
            Err(e) => {
                tracing::warn!("web_search failed: {}", e);
                Ok(json!({"error": e.to_string()}))
            }
        }
    }
}

/// Page crawling tool powered by daedra
pub struct CrawlTool;

impl CrawlTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CrawlTool {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the URL path names a PDF document.
pub fn is_pdf_url(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    };
    path.ends_with(".pdf")
}

#[async_trait]
impl Tool for CrawlTool {
    fn name(&self) -> &str {
        CRAWL_TOOL
    }

    fn description(&self) -> &str {
        "Crawl a URL and return its content as markdown"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to crawl"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidInput("Missing 'url' parameter".to_string()))?;

        if is_pdf_url(url) {
            return Ok(json!({
                "url": url,
                "error": "PDF files cannot be crawled directly. Please download and view the PDF manually.",
                "crawled_content": null,
                "is_pdf": true,
            }));
        }

        let fetch_args = daedra::VisitPageArgs {
            url: url.to_string(),
            include_images: false,
            selector: None,
        };

        match daedra::tools::fetch::fetch_page(&fetch_args).await {
            Ok(page) => Ok(json!({
                "url": url,
                "title": page.title,
                "crawled_content": truncate_chars(&page.content, CRAWL_CONTENT_LIMIT),
            })),
            Err(e) => {
                tracing::warn!("crawl_tool failed: {}", e);
                Ok(json!({
                    "url": url,
                    "error": format!("Failed to crawl: {}", e),
                }))
            }
        }
    }
}

//! Built-in Tools for Worker Agents
//!
//! This module provides the tools research workers call while answering a
//! sub-question.
//!
//! # Module Structure
//!
//! - [`registry`](crate::tools::registry) - The `Tool` trait and an ordered registry
//! - [`search`](crate::tools::search) - `web_search` and `crawl_tool` (DuckDuckGo via daedra)
//! - [`postprocessor`](crate::tools::postprocessor) - Search result dedup and cleanup
//! - [`retriever`](crate::tools::retriever) - `local_search_tool` over user resource files
//! - [`python`](crate::tools::python) - `python_repl` for the coder
//!
//! # Tool Registry
//!
//! ```ignore
//! let registry = ToolRegistry::from_tools(vec![Arc::new(SearchTool::new(3))]);
//! let definitions = registry.get_tool_definitions();
//! let results = registry.execute("web_search", json!({"query": "rust"})).await?;
//! ```

/// Search result post-processing.
pub mod postprocessor;
/// Python execution tool.
pub mod python;
/// Tool trait and registry.
pub mod registry;
/// BM25 retrieval over resource files.
pub mod retriever;
/// Web search and crawl tools using DuckDuckGo.
pub mod search;

pub use postprocessor::SearchResultPostProcessor;
pub use python::{PythonReplTool, PYTHON_REPL_TOOL};
pub use registry::{Tool, ToolRegistry};
pub use retriever::{LocalSearchTool, LOCAL_SEARCH_TOOL};
pub use search::{CrawlTool, SearchTool, CRAWL_TOOL, WEB_SEARCH_TOOL};

//! Citation pipeline: extraction from tool results, URL-stable numbering
//! and report rendering.

pub mod collector;
pub mod extractor;
pub mod formatter;
pub mod models;

pub use collector::{extract_urls_from_text, CitationCollector, CollectorSnapshot};
pub use extractor::{
    citations_to_markdown_references, extract_citations_from_messages, extract_domain,
    extract_title_from_content, merge_citations,
};
pub use formatter::{parse_citations_from_report, CitationFormatter, CitationStyle};
pub use models::{Citation, CitationMetadata};

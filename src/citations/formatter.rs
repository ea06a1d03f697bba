//! Report-ready rendering of citations, and parsing them back out of a
//! finished report.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::OnceLock;

use super::models::Citation;
use crate::types::AppError;
use crate::utils::truncate_chars;

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

/// Default section headers searched by [`parse_citations_from_report`].
pub const DEFAULT_SECTION_PATTERNS: &[&str] =
    &[r"(?:##\s*Key Citations|##\s*References|##\s*Sources|##\s*Bibliography)"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Numbered,
    Superscript,
    Footnote,
    Inline,
}

impl FromStr for CitationStyle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "numbered" => Ok(CitationStyle::Numbered),
            "superscript" => Ok(CitationStyle::Superscript),
            "footnote" => Ok(CitationStyle::Footnote),
            "inline" => Ok(CitationStyle::Inline),
            other => Err(AppError::InvalidInput(format!(
                "Unknown citation style: {}",
                other
            ))),
        }
    }
}

fn markdown_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"))
}

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\d+\]\s+([^-\n]+?)\s*-\s*(https?://[^\s]+)").expect("valid numbered regex")
    })
}

fn footnote_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\^(\d+)\]:\s+([^-\n]+?)\s*-\s*(https?://[^\s]+)")
            .expect("valid footnote regex")
    })
}

fn html_links() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r#"(?i)<a\s+(?:[^>]*?\s)?href="([^"]+)"[^>]*>([^<]+)</a>"#)
                .expect("valid anchor regex"),
            Regex::new(r#"(?i)<a\s+(?:[^>]*?\s)?href='([^']+)'[^>]*>([^<]+)</a>"#)
                .expect("valid anchor regex"),
        ]
    })
}

/// Stateless citation renderer for one [`CitationStyle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CitationFormatter {
    pub style: CitationStyle,
}

impl CitationFormatter {
    pub fn new(style: CitationStyle) -> Self {
        Self { style }
    }

    /// Marker placed after cited text: `[1]`, `¹`, `[^1]`.
    pub fn format_inline_marker(&self, number: usize) -> String {
        match self.style {
            CitationStyle::Superscript => number
                .to_string()
                .chars()
                .filter_map(|d| d.to_digit(10))
                .map(|d| SUPERSCRIPT_DIGITS[d as usize])
                .collect(),
            CitationStyle::Footnote => format!("[^{}]", number),
            CitationStyle::Numbered | CitationStyle::Inline => format!("[{}]", number),
        }
    }

    /// Multi-line reference with author, source, date and a short excerpt.
    pub fn format_reference(&self, citation: &Citation) -> String {
        let metadata = &citation.metadata;
        let mut parts = vec![format!("[{}] **{}**", citation.number, metadata.title)];

        if let Some(author) = metadata.author.as_deref().filter(|a| !a.is_empty()) {
            parts.push(format!("   *{}*", author));
        }
        if let Some(domain) = metadata.domain.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("   Source: {}", domain));
        }
        if let Some(date) = metadata.published_date.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("   Published: {}", date));
        }
        parts.push(format!("   URL: {}", metadata.url));

        if let Some(description) = metadata.description.as_deref().filter(|d| !d.is_empty()) {
            let excerpt = truncate_chars(description, 200);
            let ellipsis = if excerpt.len() < description.len() { "..." } else { "" };
            parts.push(format!("   > {}{}", excerpt, ellipsis));
        }

        parts.join("\n")
    }

    /// `- [Title](URL)`
    pub fn format_simple_reference(&self, citation: &Citation) -> String {
        format!("- [{}]({})", citation.title(), citation.url())
    }

    /// Simple reference plus an HTML comment with domain, relevance and
    /// access date.
    pub fn format_rich_reference(&self, citation: &Citation) -> String {
        let metadata = &citation.metadata;
        let mut parts = vec![self.format_simple_reference(citation)];

        let mut meta = Vec::new();
        if let Some(domain) = metadata.domain.as_deref().filter(|d| !d.is_empty()) {
            meta.push(format!("domain: {}", domain));
        }
        if metadata.relevance_score > 0.0 {
            meta.push(format!("relevance: {:.2}", metadata.relevance_score));
        }
        if !metadata.accessed_at.is_empty() {
            meta.push(format!("accessed: {}", truncate_chars(&metadata.accessed_at, 10)));
        }
        if !meta.is_empty() {
            parts.push(format!("  <!-- {} -->", meta.join(", ")));
        }

        parts.join("\n")
    }

    /// The `## Key Citations` block.
    pub fn format_citations_section(&self, citations: &[Citation], include_metadata: bool) -> String {
        if citations.is_empty() {
            return String::new();
        }

        let mut lines = vec!["## Key Citations".to_string(), String::new()];
        for citation in citations {
            if include_metadata {
                lines.push(self.format_rich_reference(citation));
            } else {
                lines.push(self.format_simple_reference(citation));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Footnote definitions, separated from the body by a rule.
    pub fn format_footnotes_section(&self, citations: &[Citation]) -> String {
        if citations.is_empty() {
            return String::new();
        }

        let mut lines = vec![String::new(), "---".to_string(), String::new()];
        lines.extend(citations.iter().map(Citation::to_footnote));
        lines.join("\n")
    }

    /// Append a marker after every markdown link whose URL has a number.
    /// Links to unknown URLs are left alone.
    pub fn add_citation_markers_to_text(
        &self,
        text: &str,
        url_to_number: &HashMap<String, usize>,
    ) -> String {
        markdown_link()
            .replace_all(text, |caps: &regex::Captures| {
                let whole = &caps[0];
                match url_to_number.get(&caps[2]) {
                    Some(&number) => format!("{}{}", whole, self.format_inline_marker(number)),
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }

    /// `{citations: [...], count}` for front-end consumers.
    pub fn build_citation_data_json(&self, citations: &[Citation]) -> Value {
        json!({
            "citations": citations.iter().map(Citation::to_json).collect::<Vec<_>>(),
            "count": citations.len(),
        })
    }
}

/// Slices of `report` that follow a citation-section header, each running
/// up to the next `##` heading line.
fn citation_sections<'a>(report: &'a str, patterns: &[&str]) -> Vec<&'a str> {
    let mut sections = Vec::new();

    for pattern in patterns {
        let header = match Regex::new(&format!("(?im){}", pattern)) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Skipping invalid citation section pattern '{}': {}", pattern, e);
                continue;
            }
        };

        for m in header.find_iter(report) {
            let rest = &report[m.end()..];
            // Header must be followed by optional whitespace and a newline.
            let Some(newline) = rest.find('\n') else {
                continue;
            };
            if !rest[..newline].trim().is_empty() {
                continue;
            }
            let body = &rest[newline + 1..];

            let mut end = body.len();
            let mut offset = 0;
            for line in body.split_inclusive('\n') {
                if line.starts_with("##") {
                    end = offset;
                    break;
                }
                offset += line.len();
            }
            sections.push(&body[..end]);
        }
    }

    sections
}

/// Extract citations listed under the report's citation sections.
///
/// Recognizes markdown links, `[n] Title - URL`, `[^n]: Title - URL` and
/// HTML anchors. URLs are de-duplicated across all sections; the first
/// match wins. Returns `{citations: [{title, url, format}], count}`.
pub fn parse_citations_from_report(report: &str, section_patterns: Option<&[&str]>) -> Value {
    let patterns = section_patterns.unwrap_or(DEFAULT_SECTION_PATTERNS);
    let mut citations = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |title: &str, url: &str, format: &str| {
        if seen.insert(url.to_string()) {
            citations.push(json!({
                "title": title.trim(),
                "url": url.trim(),
                "format": format,
            }));
        }
    };

    for section in citation_sections(report, patterns) {
        for caps in markdown_link().captures_iter(section) {
            let url = &caps[2];
            if url.starts_with("http") {
                push(&caps[1], url, "markdown");
            }
        }

        for caps in numbered_line().captures_iter(section) {
            push(&caps[1], &caps[2], "numbered");
        }

        for caps in footnote_line().captures_iter(section) {
            push(&caps[2], &caps[3], "footnote");
        }

        let mut anchors: Vec<(usize, String, String)> = html_links()
            .iter()
            .flat_map(|re| re.captures_iter(section))
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                Some((start, caps[2].to_string(), caps[1].to_string()))
            })
            .collect();
        anchors.sort_by_key(|(start, _, _)| *start);
        for (_, title, url) in anchors {
            push(&title, &url, "html");
        }
    }

    let count = citations.len();
    json!({ "citations": citations, "count": count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::models::CitationMetadata;
    use rstest::rstest;

    fn citation(number: usize, url: &str, title: &str) -> Citation {
        Citation::new(number, CitationMetadata::new(url, title))
    }

    #[rstest]
    #[case(CitationStyle::Numbered, 12, "[12]")]
    #[case(CitationStyle::Inline, 3, "[3]")]
    #[case(CitationStyle::Superscript, 12, "¹²")]
    #[case(CitationStyle::Superscript, 40, "⁴⁰")]
    #[case(CitationStyle::Footnote, 7, "[^7]")]
    fn test_inline_markers(#[case] style: CitationStyle, #[case] n: usize, #[case] expected: &str) {
        assert_eq!(CitationFormatter::new(style).format_inline_marker(n), expected);
    }

    #[test]
    fn test_style_from_str() {
        assert_eq!("Footnote".parse::<CitationStyle>().unwrap(), CitationStyle::Footnote);
        assert!("roman".parse::<CitationStyle>().is_err());
    }

    #[test]
    fn test_format_reference_with_excerpt() {
        let mut c = citation(1, "https://a.io/x", "A");
        c.metadata.author = Some("Ada".to_string());
        c.metadata.description = Some("d".repeat(250));
        let formatted = CitationFormatter::default().format_reference(&c);
        let lines: Vec<_> = formatted.lines().collect();
        assert_eq!(lines[0], "[1] **A**");
        assert_eq!(lines[1], "   *Ada*");
        assert_eq!(lines[2], "   Source: a.io");
        assert_eq!(lines[3], "   URL: https://a.io/x");
        assert!(lines[4].ends_with("..."));
    }

    #[test]
    fn test_citations_section() {
        let mut c = citation(1, "https://a.io", "A");
        c.metadata.relevance_score = 0.5;
        c.metadata.accessed_at = "2024-05-01T10:00:00Z".to_string();
        let formatter = CitationFormatter::default();

        assert_eq!(
            formatter.format_citations_section(std::slice::from_ref(&c), false),
            "## Key Citations\n\n- [A](https://a.io)\n"
        );
        assert_eq!(
            formatter.format_citations_section(&[c], true),
            "## Key Citations\n\n- [A](https://a.io)\n  <!-- domain: a.io, relevance: 0.50, accessed: 2024-05-01 -->\n"
        );
        assert_eq!(formatter.format_citations_section(&[], true), "");
    }

    #[test]
    fn test_footnotes_section() {
        let section = CitationFormatter::new(CitationStyle::Footnote)
            .format_footnotes_section(&[citation(1, "https://a.io", "A")]);
        assert_eq!(section, "\n---\n\n[^1]: A - https://a.io");
    }

    #[test]
    fn test_add_markers_leaves_unknown_links() {
        let mut numbers = HashMap::new();
        numbers.insert("https://a.io".to_string(), 2);
        let text = "See [A](https://a.io) and [B](https://b.io).";
        let marked = CitationFormatter::default().add_citation_markers_to_text(text, &numbers);
        assert_eq!(marked, "See [A](https://a.io)[2] and [B](https://b.io).");
    }

    #[test]
    fn test_citation_data_json() {
        let data = CitationFormatter::default()
            .build_citation_data_json(&[citation(1, "https://a.io", "A")]);
        assert_eq!(data["count"], 1);
        assert_eq!(data["citations"][0]["metadata"]["url"], "https://a.io");
    }

    #[test]
    fn test_parse_citations_from_report() {
        let report = "# Report\n\nBody with [inline](https://inline.io).\n\n\
                      ## Key Citations\n\n\
                      - [Alpha](https://alpha.io)\n\
                      [2] Beta Source - https://beta.io\n\
                      [^3]: Gamma - https://gamma.io\n\
                      <a href='https://delta.io'>Delta</a>\n\
                      - [Alpha again](https://alpha.io)\n\n\
                      ## Appendix\n\n- [Ignored](https://ignored.io)\n\n\
                      ## references\n\n- [Epsilon](https://epsilon.io)\n";

        let parsed = parse_citations_from_report(report, None);
        let urls: Vec<_> = parsed["citations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["url"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://alpha.io",
                "https://beta.io",
                "https://gamma.io",
                "https://delta.io",
                "https://epsilon.io"
            ]
        );
        assert_eq!(parsed["count"], 5);
        assert_eq!(parsed["citations"][1]["title"], "Beta Source");
        assert_eq!(parsed["citations"][1]["format"], "numbered");
        assert_eq!(parsed["citations"][3]["format"], "html");
    }
}

//! Lenient JSON handling for model output.
//!
//! Models wrap JSON in markdown fences, append trailing chatter after the
//! closing bracket, or stop mid-object. Everything that tries to fix that
//! lives here, behind [`parse_lenient_json`], so callers only ever see a
//! parsed [`Value`] or a [`JsonRepairError`].

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::truncate_chars;

/// Default cap applied by [`sanitize_tool_response`].
pub const DEFAULT_TOOL_RESPONSE_MAX: usize = 50_000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JsonRepairError {
    #[error("content is empty")]
    Empty,

    #[error("content is not a JSON object or array")]
    NotStructured,

    #[error("content could not be repaired into JSON: {0}")]
    Invalid(String),
}

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*```(?:json|ts)?[ \t]*\n+").expect("valid fence regex")
    })
}

fn closing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)\n*```[ \t]*$").expect("valid fence regex"))
}

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid comma regex"))
}

fn control_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B-\x0C\x0E-\x1F\x7F-\x9F]").expect("valid control regex")
    })
}

/// Remove ```json / ```ts / ``` fences around model output.
pub fn strip_code_fences(content: &str) -> String {
    let content = content.trim();
    if !content.contains("```") {
        return content.to_string();
    }
    let without_open = opening_fence().replace_all(content, "");
    let without_close = closing_fence().replace_all(&without_open, "");
    without_close.trim().to_string()
}

/// Cut `content` after the last point where an object or array closes
/// back to depth zero. String literals and escapes are respected. Content
/// without any balanced structure is returned unchanged.
pub fn extract_json_from_content(content: &str) -> String {
    let content = content.trim();

    let mut brace_depth: i64 = 0;
    let mut bracket_depth: i64 = 0;
    let mut seen_brace = false;
    let mut seen_bracket = false;
    let mut in_string = false;
    let mut escape_next = false;
    let mut last_valid_end: Option<usize> = None;

    for (idx, ch) in content.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => {
                escape_next = true;
                continue;
            }
            '"' => {
                in_string = !in_string;
                continue;
            }
            _ if in_string => continue,
            '{' => {
                brace_depth += 1;
                seen_brace = true;
            }
            '}' => {
                brace_depth -= 1;
                if brace_depth == 0 && seen_brace {
                    last_valid_end = Some(idx);
                }
            }
            '[' => {
                bracket_depth += 1;
                seen_bracket = true;
            }
            ']' => {
                bracket_depth -= 1;
                if bracket_depth == 0 && seen_bracket {
                    last_valid_end = Some(idx);
                }
            }
            _ => {}
        }
    }

    match last_valid_end {
        Some(end) if end > 0 => {
            let truncated = &content[..=end];
            if truncated.len() != content.len() {
                tracing::debug!(
                    "Truncated JSON content from {} to {} bytes",
                    content.len(),
                    truncated.len()
                );
            }
            truncated.to_string()
        }
        _ => content.to_string(),
    }
}

/// Append whatever closers an unfinished object/array still needs.
fn close_open_structures(content: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in content.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = content.trim_end().to_string();
    if in_string {
        repaired.push('"');
    }
    let trimmed = repaired.trim_end_matches([',', ' ', '\n', '\t', '\r']).len();
    repaired.truncate(trimmed);
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

fn parse_structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        _ => None,
    }
}

/// Best-effort parse of model output into a JSON object or array.
pub fn parse_lenient_json(text: &str) -> Result<Value, JsonRepairError> {
    let content = strip_code_fences(text);
    if content.is_empty() {
        return Err(JsonRepairError::Empty);
    }

    let extracted = extract_json_from_content(&content);

    match serde_json::from_str::<Value>(&extracted) {
        Ok(value) if value.is_object() || value.is_array() => return Ok(value),
        Ok(_) => return Err(JsonRepairError::NotStructured),
        Err(_) => {}
    }

    let Some(start) = extracted.find(['{', '[']) else {
        return Err(JsonRepairError::NotStructured);
    };
    let body = &extracted[start..];

    let without_commas = trailing_comma().replace_all(body, "$1");
    if let Some(value) = parse_structured(&without_commas) {
        return Ok(value);
    }

    let closed = close_open_structures(&without_commas);
    let closed = trailing_comma().replace_all(&closed, "$1");
    parse_structured(&closed).ok_or_else(|| {
        JsonRepairError::Invalid(truncate_chars(body, 120).to_string())
    })
}

/// Normalize JSON-looking model output into compact JSON text. Content that
/// cannot be repaired is returned stripped of fences and trailing tokens.
pub fn repair_json_output(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match parse_lenient_json(trimmed) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| trimmed.to_string()),
        Err(err) => {
            tracing::debug!("JSON repair failed: {}", err);
            extract_json_from_content(&strip_code_fences(trimmed))
        }
    }
}

/// Clean a worker or tool response before it is stored: drop trailing
/// tokens after JSON, cap the length and strip control characters.
pub fn sanitize_tool_response(content: &str, max_length: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let mut content = content.trim().to_string();
    if content.starts_with('{') || content.starts_with('[') {
        content = extract_json_from_content(&content);
    }

    if content.chars().count() > max_length {
        tracing::warn!(
            "Tool response truncated from {} to {} chars",
            content.chars().count(),
            max_length
        );
        content = format!("{}...", truncate_chars(&content, max_length).trim_end());
    }

    control_chars().replace_all(&content, "").into_owned()
}

use serde_json::{json, Value};

use crate::types::{Message, MessageContent, MessageRole};
use crate::utils::truncate_chars;

/// `raw_content` fields in search results are cut to this many characters.
pub const RAW_CONTENT_LIMIT: usize = 1024;

/// Search results shorter than this are never parsed for compression.
const COMPRESSION_FAST_PATH_CHARS: usize = 2048;

/// Flat estimate added for a message that carries tool calls.
const TOOL_CALL_TOKENS: usize = 50;

/// Default cap used by [`validate_message_content`].
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 100_000;

/// Keeps an agent transcript inside a model's context window.
///
/// Token counts are a cheap deterministic estimate, not a tokenizer:
/// ASCII text costs a token per four characters, anything else a token per
/// character, scaled by a per-role factor.
#[derive(Debug, Clone)]
pub struct ContextManager {
    token_limit: Option<usize>,
    preserve_prefix_message_count: usize,
}

impl ContextManager {
    pub fn new(token_limit: Option<usize>, preserve_prefix_message_count: usize) -> Self {
        Self {
            token_limit,
            preserve_prefix_message_count,
        }
    }

    pub fn token_limit(&self) -> Option<usize> {
        self.token_limit
    }

    pub fn preserve_prefix_message_count(&self) -> usize {
        self.preserve_prefix_message_count
    }

    pub fn count_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(count_message_tokens).sum()
    }

    /// False when no limit is configured.
    pub fn is_over_limit(&self, messages: &[Message]) -> bool {
        match self.token_limit {
            Some(limit) => self.count_tokens(messages) > limit,
            None => false,
        }
    }

    /// Return a copy of `messages` that fits the token budget as well as
    /// possible. Search-result payloads are trimmed first; if that is not
    /// enough, messages after the preserved prefix are re-added newest
    /// first until the set fits and the older ones are dropped. The
    /// preserved prefix always survives, even over budget.
    pub fn compress_messages(&self, messages: &[Message]) -> Vec<Message> {
        let Some(limit) = self.token_limit else {
            tracing::debug!("No token limit set; context compression disabled");
            return messages.to_vec();
        };

        let original_tokens = self.count_tokens(messages);
        if original_tokens <= limit {
            tracing::debug!(
                "Messages within limit ({} <= {} tokens)",
                original_tokens,
                limit
            );
            return messages.to_vec();
        }

        let mut compressed: Vec<Message> = messages.to_vec();
        for message in compressed.iter_mut() {
            compress_search_payload(message);
        }

        if self.is_over_limit(&compressed) {
            compressed = self.evict_oldest(compressed);
        }

        let compressed_tokens = self.count_tokens(&compressed);
        tracing::warn!(
            "Message compression executed: {} -> {} tokens (limit: {}), {} -> {} messages",
            original_tokens,
            compressed_tokens,
            limit,
            messages.len(),
            compressed.len()
        );

        if compressed_tokens > limit {
            tracing::warn!(
                "Message compression failed to bring tokens below limit: {} > {} tokens ({} messages). \
                 Consider a larger token limit or a smaller preserved prefix.",
                compressed_tokens,
                limit,
                compressed.len()
            );
        }

        compressed
    }

    /// Rebuild the tail after the preserved prefix from the newest message
    /// backwards, stopping as soon as the kept set is within budget. The
    /// newest message is always kept, even when it alone is over budget.
    fn evict_oldest(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let Some(limit) = self.token_limit else {
            return messages;
        };
        let keep = self.preserve_prefix_message_count.min(messages.len());
        let remaining = messages.split_off(keep);
        let mut result = messages;

        let mut used = self.count_tokens(&result);
        let mut retained = Vec::new();
        for message in remaining.into_iter().rev() {
            used += count_message_tokens(&message);
            retained.push(message);
            if used <= limit {
                break;
            }
        }

        retained.reverse();
        result.extend(retained);
        result
    }
}

/// Estimated tokens for one message.
pub fn count_message_tokens(message: &Message) -> usize {
    let content = match &message.content {
        MessageContent::Text(text) => count_text_tokens(text),
        other => count_text_tokens(&other.to_text()),
    };
    let base = content + count_text_tokens(message.role.as_str());

    let factor = match message.role {
        MessageRole::System => 1.1,
        MessageRole::Ai => 1.2,
        MessageRole::Tool => 1.3,
        MessageRole::Human => 1.0,
    };
    let mut tokens = (base as f64 * factor) as usize;

    if !message.metadata.is_empty() {
        tokens += count_text_tokens(&Value::Object(message.metadata.clone()).to_string());
    }
    if !message.tool_calls.is_empty() {
        let calls = serde_json::to_string(&message.tool_calls).unwrap_or_default();
        tokens += count_text_tokens(&calls) + TOOL_CALL_TOKENS;
    }

    tokens.max(1)
}

/// ASCII at four characters per token, everything else one per character.
pub fn count_text_tokens(text: &str) -> usize {
    let (ascii, other) = text.chars().fold((0usize, 0usize), |(a, o), c| {
        if c.is_ascii() {
            (a + 1, o)
        } else {
            (a, o + 1)
        }
    });
    ascii / 4 + other
}

/// Truncate oversized `raw_content` fields of a `web_search` tool result.
fn compress_search_payload(message: &mut Message) {
    if message.role != MessageRole::Tool || !message.name_is("web_search") {
        return;
    }

    let mut data = match &message.content {
        MessageContent::Text(text) => {
            if text.chars().count() < COMPRESSION_FAST_PATH_CHARS {
                return;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(
                        "Failed to parse JSON content in web_search tool message: {}. Content: {}",
                        e,
                        truncate_chars(text, 200)
                    );
                    return;
                }
            }
        }
        MessageContent::Blocks(blocks) => match serde_json::to_value(blocks) {
            Ok(data) => data,
            Err(_) => return,
        },
        MessageContent::Raw(value) => value.clone(),
    };

    let Value::Array(items) = &mut data else {
        return;
    };

    let mut modified = false;
    for item in items.iter_mut() {
        if let Some(Value::String(raw)) = item.get_mut("raw_content") {
            if raw.chars().count() > RAW_CONTENT_LIMIT {
                *raw = truncate_chars(raw, RAW_CONTENT_LIMIT).to_string();
                modified = true;
            }
        }
    }

    if modified {
        message.content = MessageContent::Text(data.to_string());
    }
}

/// Normalize every message body to plain text before it reaches a model.
///
/// Null becomes the empty string, blocks and JSON become serialized JSON,
/// and content longer than `max_content_length` characters is cut with a
/// trailing `...`. A message that cannot be rendered gets a placeholder
/// body instead of failing the batch.
pub fn validate_message_content(messages: Vec<Message>, max_content_length: usize) -> Vec<Message> {
    messages
        .into_iter()
        .enumerate()
        .map(|(i, mut message)| {
            let rendered = match &message.content {
                MessageContent::Text(text) => Ok(text.clone()),
                MessageContent::Raw(Value::Null) => {
                    tracing::warn!(
                        "Message {} ({}) has null content, setting to empty string",
                        i,
                        message.role.as_str()
                    );
                    Ok(String::new())
                }
                MessageContent::Blocks(blocks) => {
                    tracing::debug!("Message {} has block content, converting to JSON", i);
                    serde_json::to_string(blocks)
                }
                MessageContent::Raw(Value::String(s)) => Ok(s.clone()),
                MessageContent::Raw(value) => serde_json::to_string(value),
            };

            let text = match rendered {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Error validating message {}: {}", i, e);
                    message.content = MessageContent::Text(fallback_content(&message, &e.to_string()));
                    return message;
                }
            };

            let length = text.chars().count();
            let text = if length > max_content_length {
                tracing::warn!(
                    "Message {} content truncated from {} to {} chars",
                    i,
                    length,
                    max_content_length
                );
                format!("{}...", truncate_chars(&text, max_content_length).trim_end())
            } else {
                text
            };

            message.content = MessageContent::Text(text);
            message
        })
        .collect()
}

fn fallback_content(message: &Message, error: &str) -> String {
    if message.role == MessageRole::Tool {
        json!({ "error": error }).to_string()
    } else {
        format!("[Error processing message: {}]", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use rstest::rstest;

    #[rstest]
    #[case("", 0)]
    #[case("abcd", 1)]
    #[case("abcdefg", 1)]
    #[case("你好世界", 4)]
    #[case("hi 你好", 2)]
    fn test_count_text_tokens(#[case] text: &str, #[case] expected: usize) {
        assert_eq!(count_text_tokens(text), expected);
    }

    #[test]
    fn test_role_factors() {
        let text = "a".repeat(400);
        // 100 content tokens plus the role tag
        assert_eq!(count_message_tokens(&Message::human(text.as_str())), 101);
        assert_eq!(count_message_tokens(&Message::system(text.as_str())), 111);
        assert_eq!(count_message_tokens(&Message::ai(text.as_str())), 120);
        assert_eq!(count_message_tokens(&Message::tool("t", "1", text.as_str())), 131);
    }

    #[test]
    fn test_minimum_one_token_and_tool_call_surcharge() {
        assert_eq!(count_message_tokens(&Message::human("")), 1);
        let call = ToolCall {
            id: "1".to_string(),
            name: "web_search".to_string(),
            arguments: serde_json::json!({}),
        };
        let with_call = Message::ai("").with_tool_calls(vec![call]);
        assert!(count_message_tokens(&with_call) > TOOL_CALL_TOKENS);
    }

    #[test]
    fn test_no_limit_is_noop() {
        let manager = ContextManager::new(None, 0);
        let messages = vec![Message::human("x".repeat(10_000))];
        assert!(!manager.is_over_limit(&messages));
        assert_eq!(manager.compress_messages(&messages), messages);
    }

    #[test]
    fn test_within_budget_unchanged() {
        let manager = ContextManager::new(Some(1000), 1);
        let messages = vec![Message::system("sys"), Message::human("hello")];
        assert_eq!(manager.compress_messages(&messages), messages);
    }

    #[test]
    fn test_raw_content_truncated_first() {
        let results = serde_json::json!([
            {"type": "page", "url": "https://a.io", "raw_content": "r".repeat(5000)}
        ]);
        let messages = vec![Message::tool("web_search", "1", results.to_string())];
        let manager = ContextManager::new(Some(600), 0);

        let compressed = manager.compress_messages(&messages);
        assert_eq!(compressed.len(), 1);
        let data: Value = serde_json::from_str(&compressed[0].text()).unwrap();
        assert_eq!(data[0]["raw_content"].as_str().unwrap().len(), RAW_CONTENT_LIMIT);
        // input untouched
        assert!(messages[0].text().len() > 5000);
    }

    #[test]
    fn test_eviction_stops_once_within_budget() {
        let manager = ContextManager::new(Some(120), 1);
        let messages: Vec<Message> = std::iter::once(Message::system("system prompt"))
            .chain((0..10).map(|i| Message::human(format!("{}{}", i, "m".repeat(160)))))
            .collect();

        let compressed = manager.compress_messages(&messages);
        // prefix plus the newest message already fit, so nothing older is re-added
        assert_eq!(compressed, vec![messages[0].clone(), messages[10].clone()]);
        assert!(manager.count_tokens(&compressed) <= 120);
    }

    #[test]
    fn test_oversized_tail_is_kept_over_budget() {
        let manager = ContextManager::new(Some(10), 2);
        let messages = vec![
            Message::system("s".repeat(400)),
            Message::human("h".repeat(400)),
            Message::human("tail".repeat(100)),
        ];
        let compressed = manager.compress_messages(&messages);
        assert_eq!(compressed, messages);
        assert!(manager.is_over_limit(&compressed));
    }

    #[test]
    fn test_validate_message_content() {
        let messages = vec![
            Message::new(MessageRole::Human, MessageContent::Raw(Value::Null)),
            Message::new(MessageRole::Ai, MessageContent::Raw(serde_json::json!({"a": 1}))),
            Message::human("x".repeat(20)),
        ];
        let validated = validate_message_content(messages, 10);
        assert_eq!(validated[0].content, MessageContent::Text(String::new()));
        assert_eq!(validated[1].content, MessageContent::Text(r#"{"a":1}"#.to_string()));
        assert_eq!(validated[2].text(), format!("{}...", "x".repeat(10)));
        assert!(validated.iter().all(|m| m.content.is_text()));
    }
}

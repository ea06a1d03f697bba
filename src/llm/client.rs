//! LLM client abstraction and provider selection
//!
//! Workflow nodes and worker agents only see [`LLMClient`]; the concrete
//! provider is picked from configuration through [`Provider`].

use crate::types::{AppError, Message, MessageRole, Result, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Boxed stream of content chunks.
pub type ContentStream = Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>;

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// One chat completion over a full transcript
    async fn invoke(&self, messages: &[Message]) -> Result<Message>;

    /// Chat completion with tools bound; the model may answer with tool calls
    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Stream the completion as content chunks
    async fn stream(&self, messages: &[Message]) -> Result<ContentStream>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Response from an LLM generation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
}

impl LLMResponse {
    /// The response as an AI transcript message.
    pub fn into_message(self) -> Message {
        Message::ai(self.content).with_tool_calls(self.tool_calls)
    }
}

/// Model class an agent runs on. Each class maps to one `[models.*]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Basic,
    Reasoning,
    Vision,
    Code,
}

impl LlmType {
    pub const ALL: [LlmType; 4] = [
        LlmType::Basic,
        LlmType::Reasoning,
        LlmType::Vision,
        LlmType::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::Basic => "basic",
            LlmType::Reasoning => "reasoning",
            LlmType::Vision => "vision",
            LlmType::Code => "code",
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(LlmType::Basic),
            "reasoning" => Ok(LlmType::Reasoning),
            "vision" => Ok(LlmType::Vision),
            "code" => Ok(LlmType::Code),
            other => Err(AppError::InvalidInput(format!("Unknown LLM type: {}", other))),
        }
    }
}

/// Provider enum for runtime selection
///
/// | Provider | Feature | Streaming | Tool Calling |
/// |----------|---------|-----------|--------------|
/// | Ollama | `ollama` (default) | ✅ | JSON protocol |
/// | OpenAI | `openai` | ✅ | native |
#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// OpenAI API provider (including compatible endpoints)
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the provider's cargo feature is
    /// not compiled in.
    pub async fn create_client(&self) -> Result<Arc<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Arc::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Arc::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone()).await?,
            )),

            #[allow(unreachable_patterns)]
            other => Err(AppError::Configuration(format!(
                "Provider '{}' is not compiled in; enable the '{}' feature",
                other.name(),
                other.feature()
            ))),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    fn feature(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "openai",
            Provider::Ollama { .. } => "ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Chat roles understood by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Flatten a transcript into plain role/text pairs for providers without
/// native tool messages. Tool results become user turns labelled with the
/// tool name, and requested tool calls are spelled out in the assistant
/// turn that made them.
pub fn to_chat_turns(messages: &[Message]) -> Vec<(ChatRole, String)> {
    messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => (ChatRole::System, message.text()),
            MessageRole::Human => (ChatRole::User, message.text()),
            MessageRole::Ai => {
                let mut text = message.text();
                for call in &message.tool_calls {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!(
                        "[tool call {}] {}({})",
                        call.id, call.name, call.arguments
                    ));
                }
                (ChatRole::Assistant, text)
            }
            MessageRole::Tool => (
                ChatRole::User,
                format!(
                    "[tool result {}] {}:\n{}",
                    message.tool_call_id.as_deref().unwrap_or("-"),
                    message.name.as_deref().unwrap_or("tool"),
                    message.text()
                ),
            ),
        })
        .collect()
}

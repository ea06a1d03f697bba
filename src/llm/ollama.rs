use crate::llm::client::{to_chat_turns, ChatRole, ContentStream, LLMClient, LLMResponse};
use crate::types::{AppError, Message, Result, ToolCall, ToolDefinition};
use crate::utils::json_utils::parse_lenient_json;
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    Ollama,
};
use serde_json::Value;

const DEFAULT_OLLAMA_PORT: u16 = 11434;

pub struct OllamaClient {
    client: Ollama,
    model: String,
}

impl OllamaClient {
    pub async fn new(base_url: String, model: String) -> Result<Self> {
        let client = Ollama::from_url(ollama_url(&base_url)?);

        Ok(Self { client, model })
    }

    fn request(&self, messages: &[Message]) -> ChatMessageRequest {
        let chat_messages: Vec<ChatMessage> = to_chat_turns(messages)
            .into_iter()
            .map(|(role, content)| match role {
                ChatRole::System => ChatMessage::system(content),
                ChatRole::User => ChatMessage::user(content),
                ChatRole::Assistant => ChatMessage::assistant(content),
            })
            .collect();

        ChatMessageRequest::new(self.model.clone(), chat_messages)
    }

    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let response = self
            .client
            .send_chat_messages(self.request(messages))
            .await
            .map_err(|e| AppError::LLM(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }
}

/// Parse the configured base URL, defaulting the port to Ollama's.
fn ollama_url(base_url: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(base_url).map_err(|e| {
        AppError::Configuration(format!("Invalid Ollama base URL '{}': {}", base_url, e))
    })?;
    if url.port().is_none() {
        url.set_port(Some(DEFAULT_OLLAMA_PORT)).map_err(|_| {
            AppError::Configuration(format!("Ollama base URL '{}' cannot take a port", base_url))
        })?;
    }
    Ok(url)
}

/// System turn describing the JSON tool-call protocol used with Ollama.
fn tool_protocol_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You can call tools. To call one or more tools, reply with ONLY a JSON object of the form \
         {\"tool_calls\": [{\"name\": \"<tool name>\", \"arguments\": {...}}]}. \
         When you have the final answer, reply with plain text and no tool_calls object.\n\n\
         Available tools:\n",
    );
    for tool in tools {
        prompt.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    prompt
}

/// Tool calls requested through the JSON protocol. Calls naming tools that
/// were not offered are ignored.
fn parse_tool_protocol(content: &str, tools: &[ToolDefinition]) -> Vec<ToolCall> {
    if !content.contains("tool_calls") {
        return Vec::new();
    }
    let Ok(value) = parse_lenient_json(content) else {
        return Vec::new();
    };
    let Some(calls) = value.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let name = call.get("name").and_then(Value::as_str)?;
            if !tools.iter().any(|t| t.name == name) {
                tracing::warn!(tool = %name, "Model requested a tool that was not offered");
                return None;
            }
            let arguments = match call.get("arguments") {
                Some(Value::String(raw)) => parse_lenient_json(raw).unwrap_or(Value::Null),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            let arguments = if arguments.is_object() {
                arguments
            } else {
                serde_json::json!({})
            };
            Some(ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let content = self.complete(messages).await?;
        Ok(Message::ai(content))
    }

    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        if tools.is_empty() {
            let content = self.complete(messages).await?;
            return Ok(LLMResponse {
                content,
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            });
        }

        // Tool calling goes through a JSON protocol described in a leading
        // system turn so it works with models lacking native tool support.
        let mut with_protocol = Vec::with_capacity(messages.len() + 1);
        with_protocol.push(Message::system(tool_protocol_prompt(tools)));
        with_protocol.extend_from_slice(messages);

        let content = self.complete(&with_protocol).await?;
        let tool_calls = parse_tool_protocol(&content, tools);

        if tool_calls.is_empty() {
            Ok(LLMResponse {
                content,
                tool_calls,
                finish_reason: "stop".to_string(),
            })
        } else {
            Ok(LLMResponse {
                content: String::new(),
                tool_calls,
                finish_reason: "tool_calls".to_string(),
            })
        }
    }

    async fn stream(&self, messages: &[Message]) -> Result<ContentStream> {
        let mut stream_response = self
            .client
            .send_chat_messages_stream(self.request(messages))
            .await
            .map_err(|e| AppError::LLM(format!("Ollama stream error: {}", e)))?;

        let output_stream = stream! {
            while let Some(chunk_result) = stream_response.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let content = chunk.message.content;
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Err(_) => {
                        yield Err(AppError::LLM("Stream chunk error".to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(output_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

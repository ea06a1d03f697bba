//! Human approval before selected tool calls
//!
//! Tools named in `interrupt_before_tools` are wrapped in an
//! [`InterceptedTool`]. Each call first asks a [`FeedbackProvider`]; only
//! an approving answer lets the real tool run.

use crate::tools::{Tool, ToolRegistry};
use crate::types::Result;
use crate::utils::log_sanitizer::{sanitize_feedback, sanitize_tool_input, sanitize_tool_name};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Keywords that mark feedback as approval (case-insensitive substring).
pub const APPROVAL_KEYWORDS: [&str; 10] = [
    "approved",
    "approve",
    "yes",
    "proceed",
    "continue",
    "ok",
    "okay",
    "accepted",
    "accept",
    "[approved]",
];

/// Source of human answers to interrupt prompts.
#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn request_feedback(&self, prompt: &str) -> Result<String>;
}

/// Reads one line from standard input per prompt.
pub struct StdinFeedback;

#[async_trait]
impl FeedbackProvider for StdinFeedback {
    async fn request_feedback(&self, prompt: &str) -> Result<String> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{}\n> ", prompt).as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim().to_string())
    }
}

/// Answers every prompt with the same text.
pub struct FixedFeedback(pub String);

#[async_trait]
impl FeedbackProvider for FixedFeedback {
    async fn request_feedback(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// True when the feedback contains an approval keyword.
pub fn is_approval(feedback: Option<&str>) -> bool {
    let Some(feedback) = feedback else {
        return false;
    };
    let lowered = feedback.trim().to_lowercase();
    if lowered.is_empty() {
        tracing::warn!("Empty feedback received, treating as rejection");
        return false;
    }
    let approved = APPROVAL_KEYWORDS.iter().any(|k| lowered.contains(k));
    if !approved {
        tracing::warn!(
            "No approval keywords found in feedback: {}. Treating as rejection.",
            sanitize_feedback(feedback)
        );
    }
    approved
}

/// Pretty JSON for objects and arrays, the raw text for strings.
pub fn format_tool_input(input: &Value) -> String {
    match input {
        Value::Null => "No input".to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Prompt shown before an intercepted tool runs.
pub fn interrupt_prompt(tool_name: &str, input: &Value) -> String {
    format!(
        "About to execute tool: '{}'\n\nInput:\n{}\n\nApprove execution?",
        tool_name,
        format_tool_input(input)
    )
}

/// Result returned in place of a rejected tool call.
pub fn rejection_result(tool_name: &str) -> Value {
    json!({
        "error": "Tool execution rejected by user",
        "tool": tool_name,
        "status": "rejected",
    })
}

pub struct InterceptedTool {
    inner: Arc<dyn Tool>,
    feedback: Arc<dyn FeedbackProvider>,
}

impl InterceptedTool {
    pub fn new(inner: Arc<dyn Tool>, feedback: Arc<dyn FeedbackProvider>) -> Self {
        Self { inner, feedback }
    }
}

#[async_trait]
impl Tool for InterceptedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let name = self.inner.name().to_string();
        let safe_name = sanitize_tool_name(&name);
        tracing::info!(
            tool = %safe_name,
            input = %sanitize_tool_input(&args.to_string()),
            "Interrupting before tool"
        );

        let prompt = interrupt_prompt(&name, &args);
        let feedback = match self.feedback.request_feedback(&prompt).await {
            Ok(feedback) => Some(feedback),
            Err(e) => {
                tracing::error!(tool = %safe_name, "Error during tool interrupt: {}", e);
                None
            }
        };

        if !is_approval(feedback.as_deref()) {
            tracing::warn!(tool = %safe_name, "User rejected tool execution");
            return Ok(rejection_result(&name));
        }

        tracing::info!(tool = %safe_name, "User approved tool execution, proceeding");
        self.inner.execute(args).await
    }
}

/// Wrap every tool whose name is listed in `interrupt_before_tools`.
pub fn wrap_tools_with_interceptor(
    registry: ToolRegistry,
    interrupt_before_tools: &[String],
    feedback: Arc<dyn FeedbackProvider>,
) -> ToolRegistry {
    if interrupt_before_tools.is_empty() {
        return registry;
    }

    let mut wrapped = ToolRegistry::new();
    for name in registry.tool_names() {
        let Some(tool) = registry.get(&name) else {
            continue;
        };
        if interrupt_before_tools.iter().any(|t| t == &name) {
            tracing::debug!(tool = %sanitize_tool_name(&name), "Wrapping tool with interrupt");
            wrapped.register(Arc::new(InterceptedTool::new(tool, Arc::clone(&feedback))));
        } else {
            wrapped.register(tool);
        }
    }
    wrapped
}

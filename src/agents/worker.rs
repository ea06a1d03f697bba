//! Tool-calling worker agents
//!
//! A worker answers one sub-question by looping between the model and its
//! tools. The loop is exposed as a stream of [`AgentChunk`]s, each carrying
//! the full transcript so far, so a caller that hits the recursion limit
//! still holds everything the worker produced.
//!
//! # Example
//!
//! ```rust,ignore
//! let agent = ToolCallingAgent::new("researcher", system_prompt, llm, tools);
//! let mut stream = agent.stream(input, 25);
//! while let Some(chunk) = stream.next().await {
//!     last = chunk?.messages;
//! }
//! ```

use crate::agents::interceptor::{wrap_tools_with_interceptor, FeedbackProvider};
use crate::llm::LLMClient;
use crate::memory::ContextManager;
use crate::prompt::{PromptRenderer, PromptVars};
use crate::tools::ToolRegistry;
use crate::types::{AppError, Message, Result, ToolCall};
use crate::utils::log_sanitizer::sanitize_tool_name;
use futures::Stream;
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for a single tool execution
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Snapshot of a worker's transcript after one step.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentChunk {
    pub messages: Vec<Message>,
}

/// Stream of transcript snapshots produced by a worker.
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentChunk>> + Send>>;

/// A worker that can run one sub-question.
pub trait WorkerAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Rendered system prompt, reused by the recursion fallback.
    fn system_prompt(&self) -> &str;

    /// Run the worker over `input`. A model call and a round of tool calls
    /// each count as one step; more than `recursion_limit` steps ends the
    /// stream with [`AppError::RecursionLimit`].
    fn stream(&self, input: Vec<Message>, recursion_limit: usize) -> AgentStream;
}

/// Rewrites the transcript before every model call.
pub trait PreModelHook: Send + Sync {
    fn before_model(&self, messages: &[Message]) -> Vec<Message>;
}

impl PreModelHook for ContextManager {
    fn before_model(&self, messages: &[Message]) -> Vec<Message> {
        self.compress_messages(messages)
    }
}

/// Model-and-tools loop in the shape of a ReAct agent.
pub struct ToolCallingAgent {
    name: String,
    system_prompt: String,
    llm: Arc<dyn LLMClient>,
    tools: Arc<ToolRegistry>,
    pre_model_hook: Option<Arc<dyn PreModelHook>>,
    tool_timeout: Duration,
}

impl ToolCallingAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LLMClient>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            llm,
            tools: Arc::new(tools),
            pre_model_hook: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_pre_model_hook(mut self, hook: Arc<dyn PreModelHook>) -> Self {
        self.pre_model_hook = Some(hook);
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

/// Execute one tool call. Failures become an `{"error": ...}` result so
/// the model can see them and carry on.
async fn execute_tool_call(
    tools: &ToolRegistry,
    call: &ToolCall,
    tool_timeout: Duration,
) -> Message {
    let safe_name = sanitize_tool_name(&call.name);
    tracing::debug!(tool = %safe_name, call_id = %call.id, "Executing tool call");

    let result = match timeout(tool_timeout, tools.execute(&call.name, call.arguments.clone())).await
    {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::warn!(tool = %safe_name, "Tool call failed: {}", e);
            json!({"error": e.to_string()})
        }
        Err(_) => {
            tracing::warn!(tool = %safe_name, "Tool call timed out after {:?}", tool_timeout);
            json!({"error": "Tool execution timed out"})
        }
    };

    let content = match result {
        Value::String(text) => text,
        other => other.to_string(),
    };
    Message::tool(call.name.clone(), call.id.clone(), content)
}

impl WorkerAgent for ToolCallingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn stream(&self, input: Vec<Message>, recursion_limit: usize) -> AgentStream {
        let name = self.name.clone();
        let system_prompt = self.system_prompt.clone();
        let llm = Arc::clone(&self.llm);
        let tools = Arc::clone(&self.tools);
        let hook = self.pre_model_hook.clone();
        let tool_timeout = self.tool_timeout;
        let definitions = tools.get_tool_definitions();

        Box::pin(async_stream::stream! {
            let mut transcript = input;
            let mut steps = 0usize;

            loop {
                if steps >= recursion_limit {
                    yield Err(AppError::RecursionLimit(recursion_limit));
                    return;
                }
                steps += 1;

                let visible = match &hook {
                    Some(hook) => hook.before_model(&transcript),
                    None => transcript.clone(),
                };
                let mut request = Vec::with_capacity(visible.len() + 1);
                request.push(Message::system(system_prompt.as_str()));
                request.extend(visible);

                let response = match llm.invoke_with_tools(&request, &definitions).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let tool_calls = response.tool_calls.clone();
                transcript.push(response.into_message().with_name(name.as_str()));
                yield Ok(AgentChunk { messages: transcript.clone() });

                if tool_calls.is_empty() {
                    tracing::debug!(agent = %name, steps, "Worker finished");
                    return;
                }

                if steps >= recursion_limit {
                    yield Err(AppError::RecursionLimit(recursion_limit));
                    return;
                }
                steps += 1;

                for call in &tool_calls {
                    transcript.push(execute_tool_call(&tools, call, tool_timeout).await);
                }
                yield Ok(AgentChunk { messages: transcript.clone() });
            }
        })
    }
}

/// Everything needed to build the worker for one step.
pub struct WorkerSpec {
    /// `researcher`, `analyst` or `coder`; also the prompt template name
    pub role: String,
    pub llm: Arc<dyn LLMClient>,
    pub tools: ToolRegistry,
    pub pre_model_hook: Option<Arc<dyn PreModelHook>>,
    pub interrupt_before_tools: Vec<String>,
    pub locale: String,
}

/// Builds worker agents; swapped for scripted agents in tests.
pub trait AgentFactory: Send + Sync {
    fn create(&self, spec: WorkerSpec) -> Result<Arc<dyn WorkerAgent>>;
}

/// Renders the role's prompt template and builds a [`ToolCallingAgent`].
pub struct DefaultAgentFactory {
    prompts: Arc<dyn PromptRenderer>,
    feedback: Option<Arc<dyn FeedbackProvider>>,
}

impl DefaultAgentFactory {
    pub fn new(prompts: Arc<dyn PromptRenderer>) -> Self {
        Self {
            prompts,
            feedback: None,
        }
    }

    /// Provider asked before any tool listed in `interrupt_before_tools`.
    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackProvider>) -> Self {
        self.feedback = Some(feedback);
        self
    }
}

impl AgentFactory for DefaultAgentFactory {
    fn create(&self, spec: WorkerSpec) -> Result<Arc<dyn WorkerAgent>> {
        let system_prompt = self
            .prompts
            .system_prompt(&spec.role, &PromptVars::new(), &spec.locale)?;

        let tools = if spec.interrupt_before_tools.is_empty() {
            spec.tools
        } else {
            let feedback = self.feedback.clone().ok_or_else(|| {
                AppError::Configuration(format!(
                    "interrupt_before_tools is set for {} but no feedback provider is configured",
                    spec.role
                ))
            })?;
            wrap_tools_with_interceptor(spec.tools, &spec.interrupt_before_tools, feedback)
        };

        tracing::debug!(
            agent = %spec.role,
            tools = ?tools.tool_names(),
            "Creating worker agent"
        );

        let mut agent = ToolCallingAgent::new(spec.role, system_prompt, spec.llm, tools);
        if let Some(hook) = spec.pre_model_hook {
            agent = agent.with_pre_model_hook(hook);
        }
        Ok(Arc::new(agent))
    }
}

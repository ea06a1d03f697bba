//! Mock implementations for testing.
//!
//! Scripted model clients, worker agents, prompts and tools shared by the
//! integration tests.

#![allow(dead_code)]

use ares_research::agents::{AgentChunk, AgentFactory, AgentStream, WorkerAgent, WorkerSpec};
use ares_research::llm::{ContentStream, LLMClient, LLMResponse, LlmType, ModelRegistry};
use ares_research::prompt::{PromptRenderer, PromptVars};
use ares_research::tools::Tool;
use ares_research::types::{AppError, Message, Result, ToolCall, ToolDefinition};
use ares_research::utils::toml_config::ResearchConfig;
use ares_research::workflows::{ToolSet, WorkflowRuntime};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A plain text answer.
pub fn reply(content: &str) -> LLMResponse {
    LLMResponse {
        content: content.to_string(),
        tool_calls: vec![],
        finish_reason: "stop".to_string(),
    }
}

/// An answer that asks for one tool call.
pub fn tool_call(name: &str, arguments: Value) -> LLMResponse {
    LLMResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments,
        }],
        finish_reason: "tool_calls".to_string(),
    }
}

/// Mock LLM client that plays back scripted responses in order.
///
/// Every request is recorded so tests can inspect what the model was
/// shown. Once the script runs out the fallback answer is returned.
///
/// ```ignore
/// let client = MockLLMClient::scripted(vec![
///     tool_call("web_search", json!({"query": "rust"})),
///     reply("Rust is a systems language."),
/// ]);
/// ```
pub struct MockLLMClient {
    script: Mutex<VecDeque<LLMResponse>>,
    fallback: String,
    should_fail: bool,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLLMClient {
    /// Create a new mock client that always returns the given response.
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![]).with_fallback(response)
    }

    /// Play back `responses`, then fall back to an empty answer.
    pub fn scripted(responses: Vec<LLMResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: String::new(),
            should_fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::scripted(vec![])
        }
    }

    pub fn with_fallback(mut self, response: &str) -> Self {
        self.fallback = response.to_string();
        self
    }

    /// Every transcript the client was called with, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn next(&self, messages: &[Message]) -> Result<LLMResponse> {
        self.requests.lock().push(messages.to_vec());
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| reply(&self.fallback)))
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        Ok(Message::ai(self.next(messages)?.content))
    }

    async fn invoke_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        self.next(messages)
    }

    async fn stream(&self, messages: &[Message]) -> Result<ContentStream> {
        let content = self.next(messages)?.content;
        let chunks: Vec<Result<String>> = content
            .split_inclusive('\n')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        Ok(Box::new(futures::stream::iter(chunks)))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Worker agent that emits scripted transcripts, optionally ending with an
/// error.
pub struct MockWorkerAgent {
    name: String,
    answers: Vec<Message>,
    error: Option<fn() -> AppError>,
}

impl MockWorkerAgent {
    /// Appends `answers` one chunk at a time and finishes.
    pub fn answering(name: &str, answers: Vec<Message>) -> Self {
        Self {
            name: name.to_string(),
            answers,
            error: None,
        }
    }

    /// Appends `answers`, then fails with `error`.
    pub fn failing_after(name: &str, answers: Vec<Message>, error: fn() -> AppError) -> Self {
        Self {
            name: name.to_string(),
            answers,
            error: Some(error),
        }
    }
}

impl WorkerAgent for MockWorkerAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn system_prompt(&self) -> &str {
        "You are a mock worker."
    }

    fn stream(&self, input: Vec<Message>, _recursion_limit: usize) -> AgentStream {
        let answers = self.answers.clone();
        let error = self.error;
        Box::pin(async_stream::stream! {
            let mut transcript = input;
            yield Ok(AgentChunk { messages: transcript.clone() });
            for answer in answers {
                transcript.push(answer);
                yield Ok(AgentChunk { messages: transcript.clone() });
            }
            if let Some(error) = error {
                yield Err(error());
            }
        })
    }
}

/// What the factory was asked to build.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpec {
    pub role: String,
    pub tools: Vec<String>,
    pub locale: String,
    pub has_hook: bool,
}

/// Factory handing out pre-built agents per role, recording each request.
#[derive(Default)]
pub struct MockAgentFactory {
    agents: Mutex<HashMap<String, VecDeque<Arc<dyn WorkerAgent>>>>,
    specs: Mutex<Vec<RecordedSpec>>,
}

impl MockAgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an agent for the next step of `role`.
    pub fn push(&self, role: &str, agent: impl WorkerAgent + 'static) {
        self.agents
            .lock()
            .entry(role.to_string())
            .or_default()
            .push_back(Arc::new(agent));
    }

    pub fn specs(&self) -> Vec<RecordedSpec> {
        self.specs.lock().clone()
    }
}

impl AgentFactory for MockAgentFactory {
    fn create(&self, spec: WorkerSpec) -> Result<Arc<dyn WorkerAgent>> {
        self.specs.lock().push(RecordedSpec {
            role: spec.role.clone(),
            tools: spec.tools.tool_names(),
            locale: spec.locale.clone(),
            has_hook: spec.pre_model_hook.is_some(),
        });
        self.agents
            .lock()
            .get_mut(&spec.role)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| AppError::Internal(format!("No mock agent queued for {}", spec.role)))
    }
}

/// Prompt renderer with one-line templates; unknown names are errors just
/// like the file-backed renderer.
#[derive(Default)]
pub struct InMemoryPrompts {
    rendered: Mutex<Vec<(String, PromptVars)>>,
}

const PROMPT_NAMES: &[&str] = &[
    "coordinator",
    "question_decomposer",
    "researcher",
    "analyst",
    "coder",
    "reporter",
    "recursion_fallback",
];

impl InMemoryPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template names rendered so far, in order.
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Variables of the most recent render of `name`.
    pub fn last_vars(&self, name: &str) -> Option<PromptVars> {
        self.rendered
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, vars)| vars.clone())
    }
}

impl PromptRenderer for InMemoryPrompts {
    fn system_prompt(&self, name: &str, vars: &PromptVars, locale: &str) -> Result<String> {
        if !PROMPT_NAMES.contains(&name) {
            return Err(AppError::NotFound(format!("Template '{}' not found", name)));
        }
        self.rendered.lock().push((name.to_string(), vars.clone()));
        Ok(format!("[{}] prompt for {}", locale, name))
    }
}

/// Search tool returning the same results for every query.
pub struct CannedSearchTool {
    name: String,
    results: Value,
    calls: AtomicUsize,
}

impl CannedSearchTool {
    pub fn new(results: Value) -> Self {
        Self::named("web_search", results)
    }

    pub fn named(name: &str, results: Value) -> Self {
        Self {
            name: name.to_string(),
            results,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CannedSearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Canned search results"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}

/// Two page results with distinct URLs.
pub fn sample_search_results() -> Value {
    json!([
        {
            "type": "page",
            "url": "https://example.com/solid-state",
            "title": "Solid-state batteries explained",
            "content": "Solid electrolytes replace the liquid in lithium cells.",
            "score": 0.9
        },
        {
            "type": "page",
            "url": "https://news.example.org/density",
            "title": "Energy density records",
            "content": "New cells reach 500 Wh/kg in the lab.",
            "score": 0.7
        }
    ])
}

/// Tool set whose every slot answers with canned data.
pub fn canned_tools(search: Arc<CannedSearchTool>) -> ToolSet {
    ToolSet {
        web_search: search,
        crawl: Arc::new(CannedSearchTool::named(
            "crawl_tool",
            json!({"url": "https://example.com/solid-state", "crawled_content": "# Solid-state"}),
        )),
        python: Arc::new(CannedSearchTool::named(
            "python_repl",
            json!({"success": true, "stdout": "42\n", "stderr": ""}),
        )),
    }
}

/// Runtime wired to mocks: every LLM type resolves to `llm`.
pub fn mock_runtime(
    config: ResearchConfig,
    llm: Arc<MockLLMClient>,
    prompts: Arc<dyn PromptRenderer>,
    agents: Arc<dyn AgentFactory>,
    tools: ToolSet,
) -> WorkflowRuntime {
    let models = Arc::new(ModelRegistry::new(config.models.clone()));
    for llm_type in LlmType::ALL {
        models.insert(llm_type, llm.clone());
    }
    WorkflowRuntime::new(Arc::new(config), prompts, agents)
        .with_models(models)
        .with_tools(tools)
}

/// Defaults with reports and checkpoints inside `dir`.
pub fn test_config(dir: &std::path::Path) -> ResearchConfig {
    let mut config = ResearchConfig::default();
    config.output.report_dir = dir.join("reports");
    config.output.checkpoint_dir = dir.join("checkpoints");
    config
}

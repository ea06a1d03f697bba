//! Shared dependencies of the workflow nodes.

use crate::agents::AgentFactory;
use crate::llm::{LLMClient, ModelRegistry};
use crate::prompt::PromptRenderer;
use crate::research::WorkflowState;
use crate::tools::{CrawlTool, LocalSearchTool, PythonReplTool, SearchTool, Tool, ToolRegistry};
use crate::types::Result;
use crate::utils::toml_config::{ResearchConfig, WorkflowConfig};
use crate::workflows::WorkerRole;
use std::sync::Arc;

/// The external tools a run may hand to its workers.
#[derive(Clone)]
pub struct ToolSet {
    pub web_search: Arc<dyn Tool>,
    pub crawl: Arc<dyn Tool>,
    pub python: Arc<dyn Tool>,
}

impl ToolSet {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            web_search: Arc::new(SearchTool::new(config.max_search_results)),
            crawl: Arc::new(CrawlTool::new()),
            python: Arc::new(PythonReplTool::new()),
        }
    }
}

/// Configuration, model clients, prompts, worker construction and tools,
/// bundled so every node sees the same instances.
pub struct WorkflowRuntime {
    pub config: Arc<ResearchConfig>,
    pub models: Arc<ModelRegistry>,
    pub prompts: Arc<dyn PromptRenderer>,
    pub agents: Arc<dyn AgentFactory>,
    pub tools: ToolSet,
}

impl WorkflowRuntime {
    pub fn new(
        config: Arc<ResearchConfig>,
        prompts: Arc<dyn PromptRenderer>,
        agents: Arc<dyn AgentFactory>,
    ) -> Self {
        Self {
            models: Arc::new(ModelRegistry::new(config.models.clone())),
            tools: ToolSet::from_config(&config.workflow),
            config,
            prompts,
            agents,
        }
    }

    pub fn with_models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = models;
        self
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn workflow(&self) -> &WorkflowConfig {
        &self.config.workflow
    }

    /// Fresh state for `topic` carrying the configured per-run switches.
    pub fn initial_state(&self, topic: &str, locale: &str) -> WorkflowState {
        let mut state = WorkflowState::new(topic).with_locale(locale);
        state.auto_accept_plan = self.workflow().auto_accept_plan;
        state.enable_background_investigation = self.workflow().enable_background_investigation;
        state.enable_clarification = self.workflow().enable_clarification;
        state
    }

    /// Model client configured for an agent.
    pub async fn llm_for(&self, agent: &str) -> Result<Arc<dyn LLMClient>> {
        self.models.get(self.config.agent_llm_type(agent)).await
    }

    /// Context window of the model configured for an agent.
    pub fn token_limit_for(&self, agent: &str) -> Option<usize> {
        self.models.token_limit(self.config.agent_llm_type(agent))
    }

    /// Tools a worker role gets for the current run.
    ///
    /// The researcher gets `local_search_tool` first when the run has
    /// resource files, then `web_search` and `crawl_tool` when web search
    /// is enabled. The coder gets `python_repl`; the analyst nothing.
    pub async fn tools_for(&self, role: WorkerRole, state: &WorkflowState) -> ToolRegistry {
        let wf = self.workflow();
        let mut registry = ToolRegistry::new();

        match role {
            WorkerRole::Researcher => {
                if !state.resources.is_empty() {
                    let local =
                        LocalSearchTool::load(&state.resources, wf.max_search_results).await;
                    if local.chunk_count() > 0 {
                        registry.register(Arc::new(local));
                    } else {
                        tracing::warn!("No readable resource files; local search is unavailable");
                    }
                }
                if wf.enable_web_search {
                    registry.register(Arc::clone(&self.tools.web_search));
                    if wf.crawl_enabled {
                        registry.register(Arc::clone(&self.tools.crawl));
                    }
                } else {
                    tracing::info!("Web search is disabled, using only local resources");
                }
                if registry.is_empty() {
                    tracing::warn!(
                        "No tools available for the researcher; it will answer from reasoning alone"
                    );
                }
            }
            WorkerRole::Coder => registry.register(Arc::clone(&self.tools.python)),
            WorkerRole::Analyst => {}
        }

        registry
    }
}

//! # A.R.E.S Research
//!
//! A multi-agent deep research engine: a coordinator triages the request,
//! a decomposer splits it into sub-questions, researcher, analyst and coder
//! agents answer them one by one, and a reporter writes a cited report.
//!
//! ## Overview
//!
//! A.R.E.S Research can be used in two ways:
//!
//! 1. **As a command-line tool** - Run the `ares-research` binary
//! 2. **As a library** - Drive the [`WorkflowEngine`] from your own code
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use ares_research::{
//!     agents::DefaultAgentFactory, prompt::TemplatePrompts, ResearchConfig, RunOutcome,
//!     WorkflowEngine, WorkflowRuntime,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ares_research::Result<()> {
//!     let config = Arc::new(ResearchConfig::load_or_default("research.toml")?);
//!     let prompts = Arc::new(TemplatePrompts::builtin());
//!     let agents = Arc::new(DefaultAgentFactory::new(prompts.clone()));
//!
//!     let runtime = WorkflowRuntime::new(config, prompts, agents);
//!     let state = runtime.initial_state("How do solid-state batteries work?", "en-US");
//!     let engine = WorkflowEngine::new(runtime);
//!
//!     match engine.run(state).await? {
//!         RunOutcome::Completed(state) => println!("{}", state.final_report.unwrap_or_default()),
//!         RunOutcome::Paused(checkpoint) => println!("review plan {}", checkpoint.id),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//! | `openai` | OpenAI API and compatible endpoints |
//!
//! ## Modules
//!
//! - [`workflows`] - The research graph, its nodes and the engine driving it
//! - [`agents`] - Tool-calling worker agents and the tool interceptor
//! - [`citations`] - Citation collection, extraction and formatting
//! - [`memory`] - Context compression for long transcripts
//! - [`llm`] - LLM client implementations
//! - [`tools`] - Search, crawl, local retrieval and Python tools
//! - [`types`] - Messages and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Worker agents and tool interception.
pub mod agents;
/// Citation tracking for research runs.
pub mod citations;
/// Command-line parsing and terminal output.
pub mod cli;
/// LLM provider clients and abstractions.
pub mod llm;
/// Context compression for model input.
pub mod memory;
/// Prompt templates.
pub mod prompt;
/// Research plans and workflow state.
pub mod research;
/// Built-in tools (web search, crawl, local search, Python).
pub mod tools;
/// Core types (messages, errors).
pub mod types;
/// Configuration and parsing utilities.
pub mod utils;
/// The research workflow graph and engine.
pub mod workflows;

// Re-export commonly used types
pub use citations::{Citation, CitationCollector, CitationMetadata};
pub use llm::{LLMClient, LLMResponse, LlmType, ModelRegistry};
pub use memory::ContextManager;
pub use research::{DecompositionResult, WorkflowState};
pub use tools::registry::ToolRegistry;
pub use types::{AppError, Message, Result};
pub use utils::toml_config::{ConfigManager, ResearchConfig};
pub use workflows::{RunOutcome, WorkflowEngine, WorkflowRuntime};

//! LLM Provider Clients and Abstractions
//!
//! This module provides the model boundary of the research workflow. Nodes
//! and worker agents talk to [`LLMClient`]; the concrete provider is chosen
//! per [`LlmType`] from the `[models.*]` sections of `research.toml`.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - Runtime provider selection and client construction
//! - [`ModelRegistry`] - Memoizes one client per LLM type
//! - [`token_limits`] - Context-window lookup by model name
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Example
//!
//! ```ignore
//! use ares_research::llm::{LlmType, ModelRegistry};
//! use ares_research::types::Message;
//!
//! let registry = ModelRegistry::new(config.models.clone());
//! let client = registry.get(LlmType::Basic).await?;
//! let reply = client.invoke(&[Message::human("What is 2+2?")]).await?;
//! println!("{}", reply.text());
//! ```

/// Core LLM client trait, provider selection and LLM types.
pub mod client;
/// Memoized clients per LLM type.
pub mod registry;
/// Context-window sizes by model name.
pub mod token_limits;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{ContentStream, LLMClient, LLMResponse, LlmType, Provider};
pub use registry::ModelRegistry;
pub use token_limits::{infer_token_limit, DEFAULT_TOKEN_LIMIT};

//! Worker agents for research steps
//!
//! - [`worker`] - The [`WorkerAgent`] stream contract, the default
//!   [`ToolCallingAgent`] and the [`AgentFactory`] that builds one per step
//! - [`interceptor`] - Human approval before selected tools run

pub mod interceptor;
pub mod worker;

pub use interceptor::{
    is_approval, wrap_tools_with_interceptor, FeedbackProvider, FixedFeedback, InterceptedTool,
    StdinFeedback,
};
pub use worker::{
    AgentChunk, AgentFactory, AgentStream, DefaultAgentFactory, PreModelHook, ToolCallingAgent,
    WorkerAgent, WorkerSpec,
};

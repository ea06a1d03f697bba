//! Research Workflow Engine
//!
//! The research run is a small state machine. Each node reads the current
//! [`WorkflowState`](crate::research::WorkflowState) and returns a
//! [`Command`]: a partial state update plus the next node.
//!
//! ```text
//! coordinator ─┬─> background_investigator ─> decomposer
//!              └─> decomposer ─┬─> human_feedback ─> research_team
//!                              └─> reporter
//! research_team ─> researcher | analyst | coder ─> research_team
//! research_team ─> reporter ─> end
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = WorkflowEngine::new(runtime).with_checkpoints(CheckpointStore::new(dir));
//! match engine.run(WorkflowState::new("How do solid-state batteries work?")).await? {
//!     RunOutcome::Completed(state) => println!("{:?}", state.report_path),
//!     RunOutcome::Paused(checkpoint) => println!("resume with id {}", checkpoint.id),
//! }
//! ```

pub mod checkpoint;
pub mod engine;
pub mod executor;
pub mod nodes;
pub mod runtime;

use crate::research::StateUpdate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use engine::{RunOutcome, WorkflowEngine};
pub use executor::{execute_step, WorkerRole};
pub use runtime::{ToolSet, WorkflowRuntime};

/// A node of the research graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Coordinator,
    BackgroundInvestigator,
    Decomposer,
    HumanFeedback,
    ResearchTeam,
    Researcher,
    Analyst,
    Coder,
    Reporter,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Coordinator => "coordinator",
            Node::BackgroundInvestigator => "background_investigator",
            Node::Decomposer => "decomposer",
            Node::HumanFeedback => "human_feedback",
            Node::ResearchTeam => "research_team",
            Node::Researcher => "researcher",
            Node::Analyst => "analyst",
            Node::Coder => "coder",
            Node::Reporter => "reporter",
            Node::End => "end",
        }
    }

    /// Worker role for the step-executor nodes.
    pub fn worker_role(&self) -> Option<WorkerRole> {
        match self {
            Node::Researcher => Some(WorkerRole::Researcher),
            Node::Analyst => Some(WorkerRole::Analyst),
            Node::Coder => Some(WorkerRole::Coder),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a node returns: the state changes and where to go next.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: Node,
}

impl Command {
    pub fn new(update: StateUpdate, goto: Node) -> Self {
        Self { update, goto }
    }

    /// Route without touching the state.
    pub fn goto(goto: Node) -> Self {
        Self {
            update: StateUpdate::default(),
            goto,
        }
    }
}

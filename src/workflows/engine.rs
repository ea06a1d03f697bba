//! Workflow Engine
//!
//! Drives the research graph node by node. Runs pause at plan review
//! unless the state auto-accepts plans; a paused run is returned as a
//! [`Checkpoint`] and continues with [`WorkflowEngine::resume`].

use crate::research::WorkflowState;
use crate::types::{AppError, Result};
use crate::utils::log_sanitizer::sanitize_feedback;
use crate::workflows::checkpoint::{Checkpoint, CheckpointStore};
use crate::workflows::executor::execute_step;
use crate::workflows::nodes::{
    background_investigation_node, coordinator_node, decomposer_node, human_feedback_node,
    reporter_node, research_team_node, PLAN_REVIEW_PROMPT,
};
use crate::workflows::{Command, Node, WorkflowRuntime};
use std::time::Instant;

/// How a call to [`WorkflowEngine::run`] or [`WorkflowEngine::resume`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(WorkflowState),
    /// Waiting for plan review
    Paused(Checkpoint),
}

pub struct WorkflowEngine {
    runtime: WorkflowRuntime,
    checkpoints: Option<CheckpointStore>,
}

impl WorkflowEngine {
    pub fn new(runtime: WorkflowRuntime) -> Self {
        Self {
            runtime,
            checkpoints: None,
        }
    }

    /// Persist pause points to `store`.
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn runtime(&self) -> &WorkflowRuntime {
        &self.runtime
    }

    /// Start a run at the coordinator.
    pub async fn run(&self, state: WorkflowState) -> Result<RunOutcome> {
        self.drive(state, Node::Coordinator, None).await
    }

    /// Continue a paused run at its checkpointed node with `feedback`.
    pub async fn resume(&self, checkpoint: Checkpoint, feedback: &str) -> Result<RunOutcome> {
        if checkpoint.node != Node::HumanFeedback {
            return Err(AppError::InvalidInput(format!(
                "Checkpoint {} is at node '{}', which does not take feedback",
                checkpoint.id, checkpoint.node
            )));
        }
        tracing::info!(
            id = %checkpoint.id,
            feedback = %sanitize_feedback(feedback),
            "Resuming run"
        );

        let id = checkpoint.id.clone();
        let outcome = self
            .drive(checkpoint.state, checkpoint.node, Some(feedback.to_string()))
            .await?;
        if let Some(store) = &self.checkpoints {
            store.remove(&id).await?;
        }
        Ok(outcome)
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        mut node: Node,
        mut feedback: Option<String>,
    ) -> Result<RunOutcome> {
        let max_transitions = self.runtime.workflow().max_transitions;
        let mut transitions = 0usize;
        let mut guard_tripped = false;

        loop {
            if node == Node::End {
                tracing::info!(transitions, "Workflow finished");
                return Ok(RunOutcome::Completed(state));
            }

            if transitions >= max_transitions && !guard_tripped {
                tracing::warn!(
                    "Stopping after {} node transitions at '{}'; moving to the reporter",
                    transitions,
                    node
                );
                guard_tripped = true;
                node = Node::Reporter;
            }
            transitions += 1;

            if node == Node::HumanFeedback && !state.auto_accept_plan && feedback.is_none() {
                let checkpoint =
                    Checkpoint::new(node, state, Some(PLAN_REVIEW_PROMPT.to_string()));
                if let Some(store) = &self.checkpoints {
                    store.save(&checkpoint).await?;
                }
                tracing::info!(id = %checkpoint.id, "Paused for plan review");
                return Ok(RunOutcome::Paused(checkpoint));
            }

            let started = Instant::now();
            let command = self.step(node, &state, &mut feedback).await?;
            tracing::debug!(
                node = %node,
                next = %command.goto,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Node finished"
            );

            command.update.apply(&mut state);
            node = command.goto;
            if guard_tripped && node != Node::End {
                node = if state.final_report.is_some() {
                    Node::End
                } else {
                    Node::Reporter
                };
            }
        }
    }

    async fn step(
        &self,
        node: Node,
        state: &WorkflowState,
        feedback: &mut Option<String>,
    ) -> Result<Command> {
        let rt = &self.runtime;
        match node {
            Node::Coordinator => coordinator_node(rt, state).await,
            Node::BackgroundInvestigator => background_investigation_node(rt, state).await,
            Node::Decomposer => decomposer_node(rt, state).await,
            Node::HumanFeedback => human_feedback_node(rt, state, feedback.take().as_deref()),
            Node::ResearchTeam => Ok(research_team_node(state)),
            Node::Researcher | Node::Analyst | Node::Coder => match node.worker_role() {
                Some(role) => execute_step(rt, state, role).await,
                None => Err(AppError::Internal(format!("'{}' is not a worker", node))),
            },
            Node::Reporter => reporter_node(rt, state).await,
            Node::End => Ok(Command::goto(Node::End)),
        }
    }
}

//! Research data model
//!
//! - [`plan::DecompositionResult`] - the ordered sub-questions produced by
//!   the decomposer, mutated as workers record their results
//! - [`state::WorkflowState`] - the state threaded through every node, and
//!   [`state::StateUpdate`], the partial update a node returns

/// Sub-question plan and its repair/validation rules.
pub mod plan;
/// Workflow state and partial updates.
pub mod state;

pub use plan::{validate_and_fix_subquestions, DecompositionResult, StepType, SubQuestion};
pub use state::{StateUpdate, WorkflowState};

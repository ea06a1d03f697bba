//! Decomposition result: the ordered sub-questions of a research topic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{AppError, Result};
use crate::utils::json_utils::parse_lenient_json;

/// Placeholder title used when the model returns neither title nor thought.
pub const DEFAULT_PLAN_TITLE: &str = "Decomposition Result";

/// Nature of a sub-question; decides which worker runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Research,
    Analysis,
    Processing,
    /// Anything the model invents; dispatched like research.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubQuestion {
    pub question: String,
    /// What the answer should cover and why it matters
    #[serde(default)]
    pub description: String,
    pub step_type: StepType,
    /// Whether web or local search is required
    #[serde(default)]
    pub need_search: bool,
    /// Result written by the worker that handled this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_res: Option<String>,
}

impl SubQuestion {
    pub fn is_complete(&self) -> bool {
        self.execution_res.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecompositionResult {
    /// e.g. `en-US` or `zh-CN`
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub has_enough_context: bool,
    /// Brief rationale for the split
    #[serde(default)]
    pub thought: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<SubQuestion>,
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl DecompositionResult {
    /// Deserialize a repaired plan object.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Parse(format!("Invalid decomposition result: {}", e)))
    }

    /// Parse raw model output: lenient JSON, capped to `max_questions`
    /// sub-questions, then validation and repair. The cap comes first so the
    /// search requirement holds for the steps that are kept.
    pub fn parse(
        raw: &str,
        max_questions: usize,
        enforce_web_search: bool,
        enable_web_search: bool,
    ) -> Result<Self> {
        let mut value = parse_lenient_json(raw).map_err(|e| AppError::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(AppError::Parse(
                "Decomposition result is not a JSON object".to_string(),
            ));
        }
        if let Some(questions) = value.get_mut("questions").and_then(Value::as_array_mut) {
            if questions.len() > max_questions {
                tracing::info!(
                    "Plan has {} sub-questions; keeping the first {}",
                    questions.len(),
                    max_questions
                );
                questions.truncate(max_questions);
            }
        }
        let value = validate_and_fix_subquestions(value, enforce_web_search, enable_web_search);
        Self::from_value(value)
    }

    /// Index of the first sub-question without a result.
    pub fn first_incomplete(&self) -> Option<usize> {
        self.questions.iter().position(|q| !q.is_complete())
    }

    /// True when every sub-question has a result (including an empty plan).
    pub fn is_complete(&self) -> bool {
        self.questions.iter().all(SubQuestion::is_complete)
    }

    /// JSON schema handed to the decomposer prompt.
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(DecompositionResult)).unwrap_or(Value::Null)
    }
}

/// Repair a raw decomposition object so it deserializes and satisfies the
/// search requirement. Running it twice changes nothing the second time.
///
/// - `has_enough_context` defaults to false
/// - `title` falls back to `thought`, then to [`DEFAULT_PLAN_TITLE`]
/// - a missing `step_type` becomes `research` when `need_search` is set,
///   `analysis` otherwise
/// - with search enforced and enabled, at least one step searches: the
///   first research step is flipped, else the first step becomes research,
///   else a default research step is added
pub fn validate_and_fix_subquestions(
    mut plan: Value,
    enforce_web_search: bool,
    enable_web_search: bool,
) -> Value {
    if let Some(map) = plan.as_object_mut() {
        fix_plan(map, enforce_web_search && enable_web_search);
    }
    plan
}

fn fix_plan(map: &mut Map<String, Value>, enforce_search: bool) {
    if !map.contains_key("has_enough_context") {
        map.insert("has_enough_context".to_string(), Value::Bool(false));
    }

    let has_title = map
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_title {
        let thought = map
            .get("thought")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_PLAN_TITLE)
            .to_string();
        map.insert("title".to_string(), Value::String(thought));
    }

    if !matches!(map.get("questions"), Some(Value::Array(_))) {
        map.insert("questions".to_string(), Value::Array(Vec::new()));
    }
    let Some(Value::Array(questions)) = map.get_mut("questions") else {
        return;
    };

    for (idx, question) in questions.iter_mut().enumerate() {
        let Some(q) = question.as_object_mut() else {
            continue;
        };
        let has_type = q
            .get("step_type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if !has_type {
            let need_search = q.get("need_search").and_then(Value::as_bool).unwrap_or(false);
            let inferred = if need_search { "research" } else { "analysis" };
            q.insert("step_type".to_string(), Value::String(inferred.to_string()));
            tracing::info!(
                "Repaired missing step_type for question {}: inferred as '{}' (need_search={})",
                idx,
                inferred,
                need_search
            );
        }
    }

    if enforce_search {
        let has_search_step = questions
            .iter()
            .any(|q| q.get("need_search").and_then(Value::as_bool).unwrap_or(false));

        if !has_search_step {
            if questions.is_empty() {
                tracing::warn!("Decomposition has no questions; adding a default research step");
                questions.push(json!({
                    "need_search": true,
                    "question": "Initial Research",
                    "description": "Gather information about the topic",
                    "step_type": "research",
                }));
            } else if let Some(research) = questions
                .iter_mut()
                .find(|q| q.get("step_type").and_then(Value::as_str) == Some("research"))
            {
                research["need_search"] = Value::Bool(true);
                tracing::info!("Enforced web search on the first research step");
            } else if let Some(first) = questions.first_mut().and_then(Value::as_object_mut) {
                first.insert("step_type".to_string(), Value::String("research".to_string()));
                first.insert("need_search".to_string(), Value::Bool(true));
                tracing::info!("Converted first step to research with web search enforcement");
            }
        }
    }
}

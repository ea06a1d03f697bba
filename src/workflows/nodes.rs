//! Workflow nodes other than the step executors.

use crate::citations::citations_to_markdown_references;
use crate::llm::LlmType;
use crate::prompt::{apply_prompt_template, PromptVars};
use crate::research::{
    validate_and_fix_subquestions, DecompositionResult, StateUpdate, StepType, WorkflowState,
};
use crate::types::{Message, Result, ToolDefinition};
use crate::utils::log_sanitizer::{sanitize_feedback, sanitize_log_input};
use crate::workflows::{Command, Node, WorkflowRuntime};
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const DIRECT_RESPONSE: &str = "direct_response";
pub const HANDOFF_TO_DECOMPOSER: &str = "handoff_to_question_decomposer";
pub const HANDOFF_AFTER_CLARIFICATION: &str = "handoff_after_clarification";

/// Prompt shown when the run pauses for plan review.
pub const PLAN_REVIEW_PROMPT: &str = "Please Review the subquestions";

/// Feedback starting with this marker asks for a new decomposition.
pub const EDIT_PLAN_MARKER: &str = "[EDIT_PLAN]";

const CLARIFICATION_DISABLED: &str = "Clarification is DISABLED. For research questions, use handoff_to_question_decomposer. \
For greetings or small talk, use direct_response. Do NOT ask clarifying questions.";

const CLARIFICATION_ENABLED: &str = "Clarification is ENABLED. Once the research topic is clear, use handoff_after_clarification \
with the clarified topic, or handoff_to_question_decomposer if no clarification was needed. \
For greetings or small talk, use direct_response.";

fn locale_property() -> Value {
    json!({
        "type": "string",
        "description": "The user's detected language locale (e.g., en-US, zh-CN)."
    })
}

/// Tools the coordinator chooses between. The clarified handoff is only
/// offered when clarification is enabled.
pub fn coordinator_tools(enable_clarification: bool) -> Vec<ToolDefinition> {
    let mut tools = vec![
        ToolDefinition {
            name: HANDOFF_TO_DECOMPOSER.to_string(),
            description: "Handoff to question decomposer for research tasks.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "research_topic": {
                        "type": "string",
                        "description": "The topic of the research task to be handed off"
                    },
                    "locale": locale_property()
                },
                "required": ["research_topic", "locale"]
            }),
        },
        ToolDefinition {
            name: DIRECT_RESPONSE.to_string(),
            description: "Respond directly to user for greetings or simple requests.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The response message to send directly to user"
                    },
                    "locale": locale_property()
                },
                "required": ["message", "locale"]
            }),
        },
    ];
    if enable_clarification {
        tools.push(ToolDefinition {
            name: HANDOFF_AFTER_CLARIFICATION.to_string(),
            description: "Handoff after clarification with clarified research topic.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "locale": locale_property(),
                    "research_topic": {
                        "type": "string",
                        "description": "The clarified research topic based on all clarification rounds."
                    }
                },
                "required": ["locale", "research_topic"]
            }),
        });
    }
    tools
}

fn non_empty_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Classify the latest user turn: answer directly and end, or hand the
/// topic to the decomposer (through background investigation when on).
pub async fn coordinator_node(rt: &WorkflowRuntime, state: &WorkflowState) -> Result<Command> {
    tracing::info!("Coordinator talking");

    let mut messages =
        apply_prompt_template(rt.prompts.as_ref(), "coordinator", state, PromptVars::new())?;
    messages.push(Message::system(if state.enable_clarification {
        CLARIFICATION_ENABLED
    } else {
        CLARIFICATION_DISABLED
    }));

    let llm = rt.llm_for("coordinator").await?;
    let response = llm
        .invoke_with_tools(&messages, &coordinator_tools(state.enable_clarification))
        .await?;

    let mut goto = Node::End;
    let mut research_topic = state.research_topic.clone();
    let mut locale = state.locale.clone();
    let mut direct_reply = None;

    for call in &response.tool_calls {
        match call.name.as_str() {
            HANDOFF_TO_DECOMPOSER | HANDOFF_AFTER_CLARIFICATION => {
                tracing::info!("Handing off to decomposer");
                goto = Node::Decomposer;
                if let Some(topic) = non_empty_arg(&call.arguments, "research_topic") {
                    research_topic = topic;
                }
                if let Some(l) = non_empty_arg(&call.arguments, "locale") {
                    locale = l;
                }
                break;
            }
            DIRECT_RESPONSE => {
                direct_reply = non_empty_arg(&call.arguments, "message");
                if let Some(l) = non_empty_arg(&call.arguments, "locale") {
                    locale = l;
                }
                break;
            }
            other => tracing::warn!("Coordinator called unknown tool '{}'", sanitize_log_input(other, 100)),
        }
    }

    if response.tool_calls.is_empty() {
        tracing::warn!("Coordinator response contains no tool calls; ending the run");
    }

    let mut update = StateUpdate {
        locale: Some(locale),
        clarified_research_topic: Some(research_topic.clone()),
        research_topic: Some(research_topic),
        ..Default::default()
    };
    if !response.content.trim().is_empty() {
        update
            .messages
            .push(Message::human(response.content).with_name("coordinator"));
    }
    if let Some(reply) = direct_reply {
        update.messages.push(Message::ai(reply).with_name("coordinator"));
    }

    if goto == Node::Decomposer && state.enable_background_investigation {
        goto = Node::BackgroundInvestigator;
    }

    Ok(Command::new(update, goto))
}

/// Search the topic once before decomposition. Provider errors degrade to
/// an empty list.
pub async fn background_investigation_node(
    rt: &WorkflowRuntime,
    state: &WorkflowState,
) -> Result<Command> {
    tracing::info!("Background investigation node is running");

    let snippets: Vec<String> = if !rt.workflow().enable_web_search {
        tracing::info!("Web search is disabled, skipping background investigation");
        Vec::new()
    } else {
        let query = state.effective_topic();
        match rt.tools.web_search.execute(json!({ "query": query })).await {
            Ok(Value::Array(results)) => results
                .iter()
                .map(|r| {
                    format!(
                        "## {}\n\n{}",
                        r.get("title").and_then(Value::as_str).unwrap_or("Untitled"),
                        r.get("content").and_then(Value::as_str).unwrap_or("")
                    )
                })
                .collect(),
            Ok(Value::Object(obj)) if obj.contains_key("error") => {
                tracing::error!("Background search error: {}", obj["error"]);
                Vec::new()
            }
            Ok(other) => {
                tracing::error!(
                    "Unexpected search response: {}",
                    sanitize_log_input(&other.to_string(), 300)
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Background search failed: {}", e);
                Vec::new()
            }
        }
    };

    let results = serde_json::to_string(&snippets)?;
    let update = StateUpdate {
        background_investigation_results: Some(results),
        ..Default::default()
    };
    Ok(Command::new(update, Node::Decomposer))
}

/// Route for a decomposition that could not be parsed: salvage with the
/// reporter when an earlier round produced a plan, abort otherwise.
fn parse_failure_route(iterations: usize, threshold: usize) -> Node {
    if iterations > threshold {
        Node::Reporter
    } else {
        Node::End
    }
}

/// Turn the topic into a plan of sub-questions.
///
/// Each plan produced counts as one decomposition round. Once
/// `max_decompose_iterations` rounds have run, the reporter takes over.
pub async fn decomposer_node(rt: &WorkflowRuntime, state: &WorkflowState) -> Result<Command> {
    let wf = rt.workflow();
    let iterations = state.decompose_iterations;
    tracing::info!(locale = %state.locale, "Decomposer generating sub-questions");

    if let Some(plan) = &state.plan {
        if !plan.questions.is_empty() && plan.is_complete() {
            tracing::info!("Every sub-question already has a result; skipping decomposition");
            return Ok(Command::goto(Node::Reporter));
        }
    }

    if iterations >= wf.max_decompose_iterations {
        tracing::info!(
            "Reached {} decomposition rounds; moving to the reporter",
            iterations
        );
        return Ok(Command::goto(Node::Reporter));
    }

    let mut vars = PromptVars::new();
    vars.insert(
        "MAX_SON_QUESTIONS".to_string(),
        wf.max_son_questions.to_string(),
    );
    vars.insert(
        "DECOMPOSITION_SCHEMA".to_string(),
        serde_json::to_string_pretty(&DecompositionResult::json_schema())?,
    );
    let mut messages =
        apply_prompt_template(rt.prompts.as_ref(), "question_decomposer", state, vars)?;

    if state.enable_background_investigation {
        if let Some(results) = state
            .background_investigation_results
            .as_deref()
            .filter(|r| !r.is_empty())
        {
            messages.push(Message::human(format!(
                "background investigation results of user query:\n{}\n",
                results
            )));
        }
    }

    let full_response = if wf.enable_deep_thinking {
        let llm = rt.models.get(LlmType::Reasoning).await?;
        let mut stream = llm.stream(&messages).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        text
    } else {
        let llm = rt.llm_for("decomposer").await?;
        llm.invoke(&messages).await?.text()
    };
    tracing::debug!(
        "Decomposer response: {}",
        sanitize_log_input(&full_response, 2000)
    );

    let plan = match DecompositionResult::parse(
        &full_response,
        wf.max_son_questions,
        wf.enforce_web_search,
        wf.enable_web_search,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!("Decomposer response is not a valid plan: {}", e);
            return Ok(Command::goto(parse_failure_route(iterations, 0)));
        }
    };

    let goto = if plan.has_enough_context {
        tracing::info!("Decomposer response has enough context");
        Node::Reporter
    } else {
        Node::HumanFeedback
    };

    let update = StateUpdate {
        plan: Some(plan),
        decompose_iterations: Some(iterations + 1),
        ..Default::default()
    }
    .with_message(Message::ai(full_response).with_name("decomposer"));
    Ok(Command::new(update, goto))
}

/// How a reviewer answered the plan review prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanFeedback {
    /// Nothing was said; decompose again
    Empty,
    /// Decompose again with the reviewer's request
    Edit(String),
    Accepted,
}

/// Classify review feedback. The edit marker wins over approval words;
/// anything that is neither is treated as an edit request.
pub fn classify_plan_feedback(feedback: Option<&str>) -> PlanFeedback {
    let Some(feedback) = feedback.map(str::trim).filter(|f| !f.is_empty()) else {
        return PlanFeedback::Empty;
    };
    if feedback.to_uppercase().starts_with(EDIT_PLAN_MARKER) {
        return PlanFeedback::Edit(feedback.to_string());
    }
    if crate::agents::is_approval(Some(feedback)) {
        PlanFeedback::Accepted
    } else {
        PlanFeedback::Edit(feedback.to_string())
    }
}

/// Apply the reviewer's answer to the current plan. With auto-accept on
/// the plan goes straight to the research team.
pub fn human_feedback_node(
    rt: &WorkflowRuntime,
    state: &WorkflowState,
    feedback: Option<&str>,
) -> Result<Command> {
    if !state.auto_accept_plan {
        match classify_plan_feedback(feedback) {
            PlanFeedback::Empty => {
                tracing::warn!("Received empty feedback; returning to decomposer for a new plan");
                return Ok(Command::goto(Node::Decomposer));
            }
            PlanFeedback::Edit(request) => {
                tracing::info!("Plan edit requested by user: {}", sanitize_feedback(&request));
                let update =
                    StateUpdate::new().with_message(Message::human(request).with_name("feedback"));
                return Ok(Command::new(update, Node::Decomposer));
            }
            PlanFeedback::Accepted => tracing::info!("Plan accepted"),
        }
    }

    let wf = rt.workflow();
    let iterations = state.decompose_iterations;
    let revalidated = state
        .plan
        .as_ref()
        .ok_or_else(|| crate::types::AppError::Parse("No plan to accept".to_string()))
        .and_then(|plan| Ok(serde_json::to_value(plan)?))
        .map(|value| validate_and_fix_subquestions(value, wf.enforce_web_search, wf.enable_web_search))
        .and_then(DecompositionResult::from_value);

    let plan = match revalidated {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!("Failed to validate the accepted plan: {}", e);
            return Ok(Command::goto(parse_failure_route(iterations, 1)));
        }
    };

    let locale = Some(plan.locale.clone()).filter(|l| !l.trim().is_empty());
    let update = StateUpdate {
        locale,
        plan: Some(plan),
        ..Default::default()
    };
    Ok(Command::new(update, Node::ResearchTeam))
}

/// Pick the worker for the first unanswered sub-question, or the reporter
/// when there is none.
pub fn route_next(state: &WorkflowState) -> Node {
    let Some(plan) = &state.plan else {
        return Node::Reporter;
    };
    match plan.questions.iter().find(|q| !q.is_complete()) {
        Some(question) => match question.step_type {
            StepType::Research => Node::Researcher,
            StepType::Analysis => Node::Analyst,
            StepType::Processing => Node::Coder,
            StepType::Other => Node::Researcher,
        },
        None => Node::Reporter,
    }
}

pub fn research_team_node(state: &WorkflowState) -> Command {
    tracing::debug!("Research team is collaborating on tasks");
    Command::goto(route_next(state))
}

/// `report_YYYYMMDD_HHMMSS.md` inside `dir`.
pub fn report_file_path(dir: &Path) -> PathBuf {
    dir.join(
        chrono::Local::now()
            .format("report_%Y%m%d_%H%M%S.md")
            .to_string(),
    )
}

/// Write the final report. Runs once; a state that already holds a report
/// ends immediately.
pub async fn reporter_node(rt: &WorkflowRuntime, state: &WorkflowState) -> Result<Command> {
    if state.final_report.is_some() {
        tracing::info!("Final report already exists; skipping report generation");
        return Ok(Command::goto(Node::End));
    }
    tracing::info!("Reporter is generating the final report");

    let mut vars = PromptVars::new();
    vars.insert(
        "REPORT_STYLE".to_string(),
        rt.workflow().report_style.to_string(),
    );
    let mut messages = apply_prompt_template(rt.prompts.as_ref(), "reporter", state, vars)?;

    let references = citations_to_markdown_references(&state.citations);
    if !references.is_empty() {
        messages.push(Message::human(references));
    }

    let llm = rt.llm_for("reporter").await?;
    let content = llm.invoke(&messages).await?.text();

    let dir = &rt.config.output.report_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = report_file_path(dir);
    tokio::fs::write(&path, &content).await?;
    tracing::info!(path = %path.display(), "Report written");

    let update = StateUpdate {
        final_report: Some(content.clone()),
        report_path: Some(path.display().to_string()),
        ..Default::default()
    }
    .with_message(Message::ai(content).with_name("reporter"));
    Ok(Command::new(update, Node::End))
}

//! Step execution for the researcher, analyst and coder nodes
//!
//! All three workers share one protocol: pick the first unanswered
//! sub-question, build the worker input, run the worker under a step limit
//! and record the outcome. A failing worker never fails the run; its error
//! becomes the step's result and the dispatcher moves on.

use crate::agents::{PreModelHook, WorkerAgent, WorkerSpec};
use crate::citations::{extract_citations_from_messages, merge_citations};
use crate::llm::LLMClient;
use crate::memory::{validate_message_content, ContextManager, STEP_PRESERVE_PREFIX};
use crate::prompt::PromptVars;
use crate::research::{DecompositionResult, StateUpdate, WorkflowState};
use crate::tools::WEB_SEARCH_TOOL;
use crate::types::{AnswerRecord, AppError, Message, MessageRole, Result};
use crate::utils::json_utils::{sanitize_tool_response, DEFAULT_TOOL_RESPONSE_MAX};
use crate::workflows::{Command, Node, WorkflowRuntime};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;

/// Appended to a researcher answer produced without a web search.
pub const WEB_SEARCH_WARNING: &str = "\n\n[WARNING] This research was completed without using the web_search tool. \
Please verify that the information provided is accurate and up-to-date.\
\n\n[VALIDATION WARNING] Researcher did not use the web_search tool as recommended.";

const CITATION_FORMAT_REMINDER: &str = "IMPORTANT: DO NOT include inline citations in the text. \
Instead, track all sources and include a References section at the end using link reference format. \
Include an empty line between each citation for better readability. \
Use this format for each reference:\n- [Source Title](URL)\n\n- [Another Source](URL)";

/// The worker that handles a sub-question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Researcher,
    Analyst,
    Coder,
}

impl WorkerRole {
    /// Agent name, also the prompt template and `[agents]` key.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Researcher => "researcher",
            WorkerRole::Analyst => "analyst",
            WorkerRole::Coder => "coder",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            WorkerRole::Researcher => "Researcher",
            WorkerRole::Analyst => "Analyst",
            WorkerRole::Coder => "Coder",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The worker's input: the plan title, a recap of finished steps and the
/// current step. The researcher also gets its resource list and the
/// citation format reminder.
pub fn build_step_input(
    state: &WorkflowState,
    plan: &DecompositionResult,
    index: usize,
    role: WorkerRole,
) -> Vec<Message> {
    let current = &plan.questions[index];

    let mut completed = String::new();
    let finished: Vec<_> = plan.questions[..index]
        .iter()
        .filter_map(|q| q.execution_res.as_ref().map(|res| (q, res)))
        .collect();
    if !finished.is_empty() {
        completed.push_str("# Completed Research Steps\n\n");
        for (i, (question, result)) in finished.iter().enumerate() {
            completed.push_str(&format!(
                "## Completed Step {}: {}\n\n<finding>\n{}\n</finding>\n\n",
                i + 1,
                question.question,
                result
            ));
        }
    }

    let mut messages = vec![Message::human(format!(
        "# Research Topic\n\n{}\n\n{}# Current Step\n\n## Question\n\n{}\n\n## Description\n\n{}\n\n## Locale\n\n{}",
        plan.title, completed, current.question, current.description, state.locale
    ))];

    if role == WorkerRole::Researcher {
        if !state.resources.is_empty() {
            let mut resources_info =
                String::from("**The user mentioned the following resource files:**\n\n");
            for resource in &state.resources {
                resources_info.push_str(&format!(
                    "- {} ({})\n",
                    resource.title, resource.description
                ));
            }
            messages.push(Message::human(format!(
                "{}\n\nYou MUST use the **local_search_tool** to retrieve the information from the resource files.",
                resources_info
            )));
        }
        messages.push(Message::human(CITATION_FORMAT_REMINDER).with_name("system"));
    }

    messages
}

/// True when any message shows a call to, or a result from, `web_search`.
pub fn used_web_search(messages: &[Message], agent: &str) -> bool {
    let used = messages.iter().any(|m| {
        m.name_is(WEB_SEARCH_TOOL) || m.tool_calls.iter().any(|c| c.name == WEB_SEARCH_TOOL)
    });
    if used {
        tracing::info!(agent = %agent, "[VALIDATION] web_search was used");
    } else {
        tracing::warn!(agent = %agent, "[VALIDATION] web_search was not used");
    }
    used
}

/// Human-readable error stored as the result of a failed step.
pub fn step_error_report(role: WorkerRole, question: &str, error: &AppError) -> String {
    format!(
        "[ERROR] {} Agent Error\n\nStep: {}\n\nError Details:\n{}\n\nPlease check the logs for more information.",
        role.title(),
        question,
        error
    )
}

/// Drive the worker stream, keeping the latest transcript. On failure the
/// transcript gathered so far is returned with the error.
async fn run_worker(
    agent: &dyn WorkerAgent,
    input: Vec<Message>,
    recursion_limit: usize,
) -> std::result::Result<Vec<Message>, (Vec<Message>, AppError)> {
    let mut accumulated = Vec::new();
    let mut stream = agent.stream(input, recursion_limit);
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => accumulated = chunk.messages,
            Err(e) => return Err((accumulated, e)),
        }
    }
    Ok(accumulated)
}

/// One extra model call without tools that summarizes what the worker
/// gathered before it ran out of steps.
async fn recursion_fallback(
    rt: &WorkflowRuntime,
    agent: &dyn WorkerAgent,
    llm: &dyn LLMClient,
    accumulated: Vec<Message>,
    locale: &str,
) -> Result<Vec<Message>> {
    let mut cleared = accumulated;
    while cleared
        .last()
        .is_some_and(|m| m.role == MessageRole::System)
    {
        cleared.pop();
    }

    let limit_prompt = rt
        .prompts
        .system_prompt("recursion_fallback", &PromptVars::new(), locale)?;

    let mut request = cleared.clone();
    request.push(Message::system(agent.system_prompt()));
    request.push(Message::system(limit_prompt));

    let response = llm.invoke(&request).await?;
    let content = sanitize_tool_response(&response.text(), DEFAULT_TOOL_RESPONSE_MAX);
    tracing::info!(
        agent = %agent.name(),
        "Graceful fallback succeeded, generated {} characters",
        content.chars().count()
    );

    cleared.push(Message::ai(content).with_name(agent.name()));
    Ok(cleared)
}

/// Run the first unanswered sub-question through the worker for `role`
/// and return to the dispatcher.
pub async fn execute_step(
    rt: &WorkflowRuntime,
    state: &WorkflowState,
    role: WorkerRole,
) -> Result<Command> {
    let Some(plan) = state.plan.as_ref().filter(|p| !p.questions.is_empty()) else {
        tracing::warn!(agent = %role, "No sub-questions available");
        return Ok(Command::goto(Node::ResearchTeam));
    };
    let Some(index) = plan.first_incomplete() else {
        tracing::warn!(
            agent = %role,
            "No unexecuted step found in {} total steps",
            plan.questions.len()
        );
        return Ok(Command::goto(Node::ResearchTeam));
    };

    let question = plan.questions[index].question.clone();
    tracing::info!(agent = %role, step = %question, "Executing step");

    let wf = rt.workflow();
    let agent_name = role.as_str();

    let input = build_step_input(state, plan, index, role);
    let mut input = validate_message_content(input, wf.max_content_length);

    let token_limit = rt.token_limit_for(agent_name);
    let context = ContextManager::new(token_limit, STEP_PRESERVE_PREFIX);
    if token_limit.is_some() {
        let before = context.count_tokens(&input);
        input = context.compress_messages(&input);
        tracing::info!(
            agent = %role,
            "Context compression: {} messages, estimated tokens before: ~{}, after: ~{}",
            input.len(),
            before,
            context.count_tokens(&input)
        );
    }

    let llm = rt.llm_for(agent_name).await?;
    let tools = rt.tools_for(role, state).await;
    tracing::info!(agent = %role, tools = ?tools.tool_names(), "Worker tools");

    let agent = rt.agents.create(WorkerSpec {
        role: agent_name.to_string(),
        llm: Arc::clone(&llm),
        tools,
        pre_model_hook: Some(Arc::new(context) as Arc<dyn PreModelHook>),
        interrupt_before_tools: wf.interrupt_before_tools.clone(),
        locale: state.locale.clone(),
    })?;

    let input_len = input.len();
    let outcome = match run_worker(agent.as_ref(), input, wf.recursion_limit).await {
        Ok(messages) => Ok(messages),
        Err((accumulated, AppError::RecursionLimit(limit))) if wf.enable_recursion_fallback => {
            tracing::warn!(
                agent = %role,
                "Recursion limit {} reached, attempting graceful fallback with {} accumulated messages",
                limit,
                accumulated.len()
            );
            if accumulated.is_empty() {
                Err(AppError::RecursionLimit(limit))
            } else {
                recursion_fallback(rt, agent.as_ref(), llm.as_ref(), accumulated, &state.locale)
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            agent = %role,
                            "Recursion fallback failed: {}. Falling back to standard error handling.",
                            e
                        );
                        e
                    })
            }
        }
        Err((_, e)) => Err(e),
    };

    let mut plan = plan.clone();
    let mut answers = state.answers.clone();

    let messages = match outcome {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!(agent = %role, step = %question, "Error executing step: {}", e);
            let report = step_error_report(role, &question, &e);
            plan.questions[index].execution_res = Some(report.clone());
            answers.push(AnswerRecord {
                question,
                answer: report.clone(),
                agent: agent_name.to_string(),
            });

            let update = StateUpdate {
                plan: Some(plan),
                answers: Some(answers),
                ..Default::default()
            }
            .with_message(Message::human(report).with_name(agent_name));
            return Ok(Command::new(update, Node::ResearchTeam));
        }
    };

    let produced: Vec<Message> = messages[input_len.min(messages.len())..].to_vec();
    let content = messages
        .last()
        .map(|m| sanitize_tool_response(&m.text(), DEFAULT_TOOL_RESPONSE_MAX))
        .unwrap_or_default();

    let mut validation_info = "";
    if role == WorkerRole::Researcher
        && wf.enforce_researcher_search
        && wf.enable_web_search
        && !used_web_search(&produced, agent_name)
    {
        tracing::warn!("[VALIDATION] Researcher did not use web_search tool. Adding reminder to response.");
        validation_info = WEB_SEARCH_WARNING;
    }

    plan.questions[index].execution_res = Some(content.clone());
    answers.push(AnswerRecord {
        question: question.clone(),
        answer: format!("{}{}", content, validation_info),
        agent: agent_name.to_string(),
    });

    let tool_results = produced
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .count();
    let new_citations = extract_citations_from_messages(&produced);
    let citations = merge_citations(&state.citations, &new_citations);
    tracing::info!(
        agent = %role,
        step = %question,
        tool_results,
        new_citations = new_citations.len(),
        total_citations = citations.len(),
        "Step completed"
    );

    let update = StateUpdate {
        plan: Some(plan),
        answers: Some(answers),
        citations: Some(citations),
        messages: produced,
        ..Default::default()
    };
    Ok(Command::new(update, Node::ResearchTeam))
}

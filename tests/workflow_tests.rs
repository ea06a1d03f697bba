//! End-to-end runs of the research graph against scripted models.

mod common;

use ares_research::agents::DefaultAgentFactory;
use ares_research::types::{AppError, Message, MessageRole};
use ares_research::utils::toml_config::ResearchConfig;
use ares_research::workflows::executor::WEB_SEARCH_WARNING;
use ares_research::workflows::nodes::PLAN_REVIEW_PROMPT;
use ares_research::workflows::{Checkpoint, CheckpointStore, Node, RunOutcome, WorkflowEngine};
use ares_research::WorkflowState;
use common::mocks::*;
use serde_json::json;
use std::sync::Arc;

fn handoff(topic: &str) -> ares_research::LLMResponse {
    tool_call(
        "handoff_to_question_decomposer",
        json!({"research_topic": topic, "locale": "en-US"}),
    )
}

fn two_step_plan() -> String {
    json!({
        "locale": "en-US",
        "has_enough_context": false,
        "thought": "Define the technology, then compare numbers.",
        "title": "Solid-state battery outlook",
        "questions": [
            {
                "question": "What are solid electrolytes?",
                "description": "Materials and how they differ from liquid electrolytes",
                "step_type": "research",
                "need_search": true
            },
            {
                "question": "Compare energy density",
                "description": "Solid-state versus lithium-ion",
                "step_type": "analysis",
                "need_search": false
            }
        ]
    })
    .to_string()
}

fn one_step_plan(question: &str) -> String {
    format!(
        "```json\n{}\n```",
        json!({
            "locale": "en-US",
            "title": "Battery plan",
            "thought": "",
            "questions": [
                {"question": question, "description": "", "step_type": "research", "need_search": true}
            ]
        })
    )
}

struct Harness {
    engine: WorkflowEngine,
    llm: Arc<MockLLMClient>,
    search: Arc<CannedSearchTool>,
    prompts: Arc<InMemoryPrompts>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn report_dir(&self) -> std::path::PathBuf {
        self.engine.runtime().config.output.report_dir.clone()
    }

    fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.engine.runtime().config.output.checkpoint_dir)
    }

    fn state(&self, topic: &str) -> WorkflowState {
        self.engine.runtime().initial_state(topic, "en-US")
    }
}

/// Engine with the real worker agents on a scripted model.
fn harness(
    script: Vec<ares_research::LLMResponse>,
    configure: impl FnOnce(&mut ResearchConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let llm = Arc::new(MockLLMClient::scripted(script));
    let search = Arc::new(CannedSearchTool::new(sample_search_results()));
    let prompts = Arc::new(InMemoryPrompts::new());
    let agents = Arc::new(DefaultAgentFactory::new(prompts.clone()));
    let checkpoints = CheckpointStore::new(&config.output.checkpoint_dir);

    let runtime = mock_runtime(
        config,
        llm.clone(),
        prompts.clone(),
        agents,
        canned_tools(search.clone()),
    );
    Harness {
        engine: WorkflowEngine::new(runtime).with_checkpoints(checkpoints),
        llm,
        search,
        prompts,
        _dir: dir,
    }
}

/// Engine whose workers come from `factory`.
fn harness_with_factory(
    script: Vec<ares_research::LLMResponse>,
    factory: Arc<MockAgentFactory>,
    configure: impl FnOnce(&mut ResearchConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let llm = Arc::new(MockLLMClient::scripted(script));
    let search = Arc::new(CannedSearchTool::new(sample_search_results()));
    let prompts = Arc::new(InMemoryPrompts::new());
    let runtime = mock_runtime(
        config,
        llm.clone(),
        prompts.clone(),
        factory,
        canned_tools(search.clone()),
    );
    Harness {
        engine: WorkflowEngine::new(runtime),
        llm,
        search,
        prompts,
        _dir: dir,
    }
}

fn completed(outcome: RunOutcome) -> WorkflowState {
    match outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Paused(checkpoint) => panic!("run paused at {}", checkpoint.node),
    }
}

fn paused(outcome: RunOutcome) -> Checkpoint {
    match outcome {
        RunOutcome::Paused(checkpoint) => checkpoint,
        RunOutcome::Completed(_) => panic!("run completed without pausing"),
    }
}

#[tokio::test]
async fn test_full_run_with_auto_accept() {
    let h = harness(
        vec![
            handoff("Solid-state batteries"),
            reply(&two_step_plan()),
            tool_call("web_search", json!({"query": "solid electrolytes"})),
            reply("Solid electrolytes are ceramics or polymers."),
            reply("Solid-state cells store about 40% more energy."),
            reply("# Solid-State Batteries\n\nThey are coming."),
        ],
        |c| c.workflow.auto_accept_plan = true,
    );

    let state = completed(h.engine.run(h.state("tell me about batteries")).await.unwrap());

    assert_eq!(state.clarified_research_topic, "Solid-state batteries");
    assert_eq!(state.decompose_iterations, 1);
    assert_eq!(h.llm.call_count(), 6);
    assert_eq!(h.search.calls(), 2, "background investigation plus researcher");

    let background = state.background_investigation_results.as_deref().unwrap();
    assert!(background.contains("## Solid-state batteries explained"));

    let plan = state.plan.as_ref().unwrap();
    assert_eq!(
        plan.questions[0].execution_res.as_deref(),
        Some("Solid electrolytes are ceramics or polymers.")
    );
    assert_eq!(
        plan.questions[1].execution_res.as_deref(),
        Some("Solid-state cells store about 40% more energy.")
    );

    assert_eq!(state.answers.len(), 2);
    assert_eq!(state.answers[0].agent, "researcher");
    assert!(!state.answers[0].answer.contains("[WARNING]"));
    assert_eq!(state.answers[1].agent, "analyst");

    let urls: Vec<_> = state.citations.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/solid-state",
            "https://news.example.org/density"
        ]
    );

    let report = state.final_report.as_deref().unwrap();
    assert_eq!(report, "# Solid-State Batteries\n\nThey are coming.");
    let path = state.report_path.as_deref().unwrap();
    assert!(path.starts_with(h.report_dir().to_str().unwrap()));
    assert_eq!(std::fs::read_to_string(path).unwrap(), report);

    let reporter_request = h.llm.requests().pop().unwrap();
    assert!(reporter_request
        .iter()
        .any(|m| m.text().starts_with("## Key Citations")));

    assert_eq!(
        h.prompts.rendered(),
        vec![
            "coordinator",
            "question_decomposer",
            "researcher",
            "analyst",
            "reporter"
        ]
    );
    assert!(h
        .prompts
        .last_vars("question_decomposer")
        .unwrap()
        .contains_key("DECOMPOSITION_SCHEMA"));
}

#[tokio::test]
async fn test_pause_edit_and_resume() {
    let h = harness(
        vec![
            handoff("Battery costs"),
            reply(&one_step_plan("Who makes solid-state cells?")),
            reply(&one_step_plan("What do solid-state cells cost?")),
            reply("Around $400/kWh today."),
            reply("Final report"),
        ],
        |c| c.workflow.enable_background_investigation = false,
    );
    let store = h.store();

    let first = paused(h.engine.run(h.state("battery costs")).await.unwrap());
    assert_eq!(first.node, Node::HumanFeedback);
    assert_eq!(first.interrupt.as_deref(), Some(PLAN_REVIEW_PROMPT));
    assert_eq!(store.list().await.unwrap(), vec![first.id.clone()]);

    let loaded = store.load(&first.id).await.unwrap();
    let second = paused(
        h.engine
            .resume(loaded, "[EDIT_PLAN] focus on cost instead")
            .await
            .unwrap(),
    );
    assert_ne!(second.id, first.id);
    assert_eq!(second.state.decompose_iterations, 2);
    assert_eq!(
        second.state.plan.as_ref().unwrap().questions[0].question,
        "What do solid-state cells cost?"
    );

    let redo_request = &h.llm.requests()[2];
    assert!(redo_request
        .iter()
        .any(|m| m.name_is("feedback") && m.text() == "[EDIT_PLAN] focus on cost instead"));

    let state = completed(h.engine.resume(second, "[ACCEPTED]").await.unwrap());
    assert!(store.list().await.unwrap().is_empty());

    // The researcher never searched, so its logged answer carries the warning.
    let answer = &state.answers[0].answer;
    assert!(answer.starts_with("Around $400/kWh today."));
    assert!(answer.ends_with(WEB_SEARCH_WARNING));
    assert_eq!(
        state.plan.as_ref().unwrap().questions[0].execution_res.as_deref(),
        Some("Around $400/kWh today.")
    );
    assert_eq!(state.final_report.as_deref(), Some("Final report"));
}

#[tokio::test]
async fn test_empty_feedback_redecomposes() {
    let h = harness(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("First")),
            reply(&one_step_plan("Second")),
        ],
        |c| c.workflow.enable_background_investigation = false,
    );

    let checkpoint = paused(h.engine.run(h.state("batteries")).await.unwrap());
    let again = paused(h.engine.resume(checkpoint, "   ").await.unwrap());
    assert_eq!(again.state.plan.unwrap().questions[0].question, "Second");
    assert!(!again
        .state
        .messages
        .iter()
        .any(|m| m.name_is("feedback")));
}

#[tokio::test]
async fn test_iteration_cap_goes_to_reporter() {
    let h = harness(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("First")),
            reply("Report from the only plan"),
        ],
        |c| {
            c.workflow.enable_background_investigation = false;
            c.workflow.max_decompose_iterations = 1;
        },
    );

    let checkpoint = paused(h.engine.run(h.state("batteries")).await.unwrap());
    let state = completed(
        h.engine
            .resume(checkpoint, "[EDIT_PLAN] more please")
            .await
            .unwrap(),
    );

    assert_eq!(state.decompose_iterations, 1);
    assert_eq!(state.final_report.as_deref(), Some("Report from the only plan"));
    assert!(state.plan.unwrap().questions[0].execution_res.is_none());
    assert_eq!(h.llm.call_count(), 3);
}

#[tokio::test]
async fn test_direct_response_ends_run() {
    let h = harness(
        vec![tool_call(
            "direct_response",
            json!({"message": "Hello! How can I help?", "locale": "en-US"}),
        )],
        |_| {},
    );

    let state = completed(h.engine.run(h.state("hi")).await.unwrap());

    let last = state.messages.last().unwrap();
    assert_eq!(last.role, MessageRole::Ai);
    assert!(last.name_is("coordinator"));
    assert_eq!(last.text(), "Hello! How can I help?");
    assert!(state.final_report.is_none());
    assert!(state.plan.is_none());
    assert_eq!(h.search.calls(), 0);
    assert!(!h.report_dir().exists());
}

#[tokio::test]
async fn test_coordinator_without_tool_calls_ends_run() {
    let h = harness(vec![reply("I am not sure what you mean.")], |_| {});

    let state = completed(h.engine.run(h.state("???")).await.unwrap());

    let last = state.messages.last().unwrap();
    assert!(last.name_is("coordinator"));
    assert_eq!(last.role, MessageRole::Human);
    assert!(state.final_report.is_none());
}

#[tokio::test]
async fn test_unparseable_first_plan_ends_run() {
    let h = harness(
        vec![handoff("Batteries"), reply("I cannot produce JSON today.")],
        |c| c.workflow.auto_accept_plan = true,
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());
    assert!(state.plan.is_none());
    assert!(state.final_report.is_none());
    assert_eq!(state.decompose_iterations, 0);
}

#[tokio::test]
async fn test_enough_context_skips_review() {
    let plan = json!({
        "locale": "en-US",
        "has_enough_context": true,
        "title": "Already known",
        "thought": "",
        "questions": []
    })
    .to_string();
    let h = harness(
        vec![handoff("Batteries"), reply(&plan), reply("Short report")],
        |_| {},
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());
    assert_eq!(state.final_report.as_deref(), Some("Short report"));
}

#[tokio::test]
async fn test_worker_failure_is_recorded_and_run_continues() {
    let factory = Arc::new(MockAgentFactory::new());
    factory.push(
        "researcher",
        MockWorkerAgent::failing_after("researcher", vec![], || {
            AppError::LLM("connection reset".to_string())
        }),
    );
    let h = harness_with_factory(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("Who makes solid-state cells?")),
            reply("Report despite the failure"),
        ],
        factory,
        |c| c.workflow.auto_accept_plan = true,
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());

    let result = state.plan.as_ref().unwrap().questions[0]
        .execution_res
        .clone()
        .unwrap();
    assert!(result.starts_with("[ERROR] Researcher Agent Error"));
    assert!(result.contains("Step: Who makes solid-state cells?"));
    assert!(result.contains("connection reset"));
    assert!(state
        .messages
        .iter()
        .any(|m| m.name_is("researcher") && m.text() == result));
    assert_eq!(
        state.final_report.as_deref(),
        Some("Report despite the failure")
    );
}

#[tokio::test]
async fn test_recursion_limit_falls_back_to_summary() {
    let gathered = vec![
        Message::ai("").with_tool_calls(vec![ares_research::types::ToolCall {
            id: "call_1".to_string(),
            name: "web_search".to_string(),
            arguments: json!({"query": "solid-state"}),
        }]),
        Message::tool("web_search", "call_1", sample_search_results().to_string()),
    ];
    let factory = Arc::new(MockAgentFactory::new());
    factory.push(
        "researcher",
        MockWorkerAgent::failing_after("researcher", gathered, || AppError::RecursionLimit(25)),
    );
    let h = harness_with_factory(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("Who makes solid-state cells?")),
            reply("Summary of what was found before the limit."),
            reply("Report"),
        ],
        factory,
        |c| c.workflow.auto_accept_plan = true,
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());

    assert_eq!(
        state.plan.as_ref().unwrap().questions[0]
            .execution_res
            .as_deref(),
        Some("Summary of what was found before the limit.")
    );
    assert_eq!(state.citations.len(), 2);
    assert!(h.prompts.rendered().contains(&"recursion_fallback".to_string()));

    let fallback_request = &h.llm.requests()[2];
    let tail: Vec<_> = fallback_request.iter().rev().take(2).collect();
    assert!(tail.iter().all(|m| m.role == MessageRole::System));
    assert!(fallback_request
        .iter()
        .any(|m| m.role == MessageRole::Tool && m.name_is("web_search")));
}

#[tokio::test]
async fn test_recursion_limit_without_fallback_records_error() {
    let factory = Arc::new(MockAgentFactory::new());
    factory.push(
        "researcher",
        MockWorkerAgent::failing_after(
            "researcher",
            vec![Message::ai("thinking").with_name("researcher")],
            || AppError::RecursionLimit(25),
        ),
    );
    let h = harness_with_factory(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("Who makes solid-state cells?")),
            reply("Report"),
        ],
        factory,
        |c| {
            c.workflow.auto_accept_plan = true;
            c.workflow.enable_recursion_fallback = false;
        },
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());
    let result = state.plan.unwrap().questions[0].execution_res.clone().unwrap();
    assert!(result.starts_with("[ERROR] Researcher Agent Error"));
    assert!(!h.prompts.rendered().contains(&"recursion_fallback".to_string()));
}

#[tokio::test]
async fn test_workers_get_role_tools() {
    let plan = json!({
        "locale": "zh-CN",
        "title": "Mixed plan",
        "thought": "",
        "questions": [
            {"question": "Find data", "description": "", "step_type": "research", "need_search": true},
            {"question": "Compute growth", "description": "", "step_type": "processing", "need_search": false},
            {"question": "Interpret", "description": "", "step_type": "analysis", "need_search": false}
        ]
    })
    .to_string();

    let factory = Arc::new(MockAgentFactory::new());
    factory.push(
        "researcher",
        MockWorkerAgent::answering("researcher", vec![Message::ai("data")]),
    );
    factory.push(
        "coder",
        MockWorkerAgent::answering("coder", vec![Message::ai("42")]),
    );
    factory.push(
        "analyst",
        MockWorkerAgent::answering("analyst", vec![Message::ai("it grows")]),
    );
    let h = harness_with_factory(
        vec![handoff("Growth"), reply(&plan), reply("Report")],
        factory.clone(),
        |c| c.workflow.auto_accept_plan = true,
    );

    let state = completed(h.engine.run(h.state("growth")).await.unwrap());
    assert_eq!(state.locale, "zh-CN");

    let specs = factory.specs();
    let roles: Vec<_> = specs.iter().map(|s| s.role.as_str()).collect();
    assert_eq!(roles, vec!["researcher", "coder", "analyst"]);
    assert_eq!(specs[0].tools, vec!["web_search", "crawl_tool"]);
    assert_eq!(specs[1].tools, vec!["python_repl"]);
    assert!(specs[2].tools.is_empty());
    assert!(specs.iter().all(|s| s.has_hook && s.locale == "zh-CN"));
}

#[tokio::test]
async fn test_transition_guard_forces_report() {
    let h = harness(
        vec![
            handoff("Batteries"),
            reply(&one_step_plan("Who makes solid-state cells?")),
            reply("Report written early"),
        ],
        |c| {
            c.workflow.auto_accept_plan = true;
            c.workflow.max_transitions = 3;
        },
    );

    let state = completed(h.engine.run(h.state("batteries")).await.unwrap());
    assert_eq!(state.final_report.as_deref(), Some("Report written early"));
    assert!(state.plan.unwrap().questions[0].execution_res.is_none());
}

#[tokio::test]
async fn test_resume_rejects_non_review_checkpoint() {
    let h = harness(vec![], |_| {});
    let checkpoint = Checkpoint::new(Node::Reporter, WorkflowState::new("x"), None);
    assert!(matches!(
        h.engine.resume(checkpoint, "[ACCEPTED]").await,
        Err(AppError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_model_failure_is_fatal_outside_workers() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLLMClient::failing());
    let prompts = Arc::new(InMemoryPrompts::new());
    let runtime = mock_runtime(
        test_config(dir.path()),
        llm,
        prompts.clone(),
        Arc::new(DefaultAgentFactory::new(prompts)),
        canned_tools(Arc::new(CannedSearchTool::new(json!([])))),
    );
    let engine = WorkflowEngine::new(runtime);

    assert!(matches!(
        engine.run(WorkflowState::new("batteries")).await,
        Err(AppError::LLM(_))
    ));
}

#[tokio::test]
async fn test_clarified_handoff_reaches_decomposer() {
    let h = harness(
        vec![
            tool_call(
                "handoff_after_clarification",
                json!({"locale": "en-GB", "research_topic": "Solid-state batteries for EVs"}),
            ),
            reply(&one_step_plan("What limits EV range?")),
        ],
        |c| {
            c.workflow.enable_background_investigation = false;
            c.workflow.enable_clarification = true;
        },
    );

    let checkpoint = paused(h.engine.run(h.state("batteries")).await.unwrap());

    assert_eq!(checkpoint.node, Node::HumanFeedback);
    assert!(checkpoint.state.enable_clarification);
    assert_eq!(checkpoint.state.clarified_research_topic, "Solid-state batteries for EVs");
    assert_eq!(checkpoint.state.locale, "en-GB");
    let coordinator_request = &h.llm.requests()[0];
    assert!(coordinator_request
        .last()
        .unwrap()
        .text()
        .starts_with("Clarification is ENABLED"));
}

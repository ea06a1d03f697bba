//! State threaded through every workflow node.

use serde::{Deserialize, Serialize};

use super::plan::DecompositionResult;
use crate::citations::CitationMetadata;
use crate::types::{AnswerRecord, Message, MessageRole, Resource};

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

/// Everything a run knows. Nodes never mutate it directly: each returns a
/// [`StateUpdate`] that the engine merges in, so fields a node does not
/// mention (locale, topic, resources, ...) carry over untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub research_topic: String,
    #[serde(default)]
    pub clarified_research_topic: String,
    #[serde(default)]
    pub clarification_history: Vec<String>,
    #[serde(default)]
    pub clarification_rounds: usize,
    /// Lets the coordinator hand off with a clarified topic
    #[serde(default)]
    pub enable_clarification: bool,
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Current decomposition, replaced on every decomposition round
    #[serde(default)]
    pub plan: Option<DecompositionResult>,
    #[serde(default)]
    pub decompose_iterations: usize,
    #[serde(default)]
    pub auto_accept_plan: bool,

    #[serde(default = "default_true")]
    pub enable_background_investigation: bool,
    #[serde(default)]
    pub background_investigation_results: Option<String>,

    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    #[serde(default)]
    pub citations: Vec<CitationMetadata>,
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub final_report: Option<String>,
    #[serde(default)]
    pub report_path: Option<String>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            research_topic: String::new(),
            clarified_research_topic: String::new(),
            clarification_history: Vec::new(),
            clarification_rounds: 0,
            enable_clarification: false,
            resources: Vec::new(),
            plan: None,
            decompose_iterations: 0,
            auto_accept_plan: false,
            enable_background_investigation: true,
            background_investigation_results: None,
            answers: Vec::new(),
            citations: Vec::new(),
            messages: Vec::new(),
            final_report: None,
            report_path: None,
        }
    }
}

impl WorkflowState {
    /// Fresh state for a topic; the topic is also the first user message.
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            messages: vec![Message::human(topic.as_str())],
            research_topic: topic,
            ..Default::default()
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    /// Topic the decomposer should work on: the clarified one when present.
    pub fn effective_topic(&self) -> &str {
        if self.clarified_research_topic.is_empty() {
            &self.research_topic
        } else {
            &self.clarified_research_topic
        }
    }

    /// Most recent non-empty message written by the user.
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Human && m.name.is_none() && !m.text().is_empty())
    }
}

/// Partial update returned by a node. `None` leaves a field alone;
/// `messages` are appended to the transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub locale: Option<String>,
    pub research_topic: Option<String>,
    pub clarified_research_topic: Option<String>,
    pub plan: Option<DecompositionResult>,
    pub decompose_iterations: Option<usize>,
    pub background_investigation_results: Option<String>,
    pub answers: Option<Vec<AnswerRecord>>,
    pub citations: Option<Vec<CitationMetadata>>,
    pub messages: Vec<Message>,
    pub final_report: Option<String>,
    pub report_path: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_plan(mut self, plan: DecompositionResult) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn apply(self, state: &mut WorkflowState) {
        if let Some(locale) = self.locale {
            state.locale = locale;
        }
        if let Some(topic) = self.research_topic {
            state.research_topic = topic;
        }
        if let Some(topic) = self.clarified_research_topic {
            state.clarified_research_topic = topic;
        }
        if let Some(plan) = self.plan {
            state.plan = Some(plan);
        }
        if let Some(iterations) = self.decompose_iterations {
            state.decompose_iterations = iterations;
        }
        if let Some(results) = self.background_investigation_results {
            state.background_investigation_results = Some(results);
        }
        if let Some(answers) = self.answers {
            state.answers = answers;
        }
        if let Some(citations) = self.citations {
            state.citations = citations;
        }
        state.messages.extend(self.messages);
        if let Some(report) = self.final_report {
            state.final_report = Some(report);
        }
        if let Some(path) = self.report_path {
            state.report_path = Some(path);
        }
    }
}

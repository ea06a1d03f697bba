//! Prompt templates
//!
//! Templates are markdown files with `{{ NAME }}` placeholders. A template
//! directory may override any built-in template, per locale:
//! `{name}.{locale}.md` is tried first (with `en-US` written as `en_US`),
//! then `{name}.md`, then the built-in copy.

use crate::research::WorkflowState;
use crate::types::{AppError, Message, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Template variables
pub type PromptVars = HashMap<String, String>;

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("coordinator", include_str!("../../prompts/coordinator.md")),
    (
        "question_decomposer",
        include_str!("../../prompts/question_decomposer.md"),
    ),
    ("researcher", include_str!("../../prompts/researcher.md")),
    ("analyst", include_str!("../../prompts/analyst.md")),
    ("coder", include_str!("../../prompts/coder.md")),
    ("reporter", include_str!("../../prompts/reporter.md")),
    (
        "recursion_fallback",
        include_str!("../../prompts/recursion_fallback.md"),
    ),
];

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Renders named prompt templates into system prompts and message lists.
pub trait PromptRenderer: Send + Sync {
    /// The rendered system prompt for a template.
    fn system_prompt(&self, name: &str, vars: &PromptVars, locale: &str) -> Result<String>;

    /// The system prompt followed by `history`.
    fn render(
        &self,
        name: &str,
        vars: &PromptVars,
        locale: &str,
        history: &[Message],
    ) -> Result<Vec<Message>> {
        let system = self.system_prompt(name, vars, locale)?;
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system));
        messages.extend_from_slice(history);
        Ok(messages)
    }
}

/// `en-US` → `en_US`; blank locales become `en_US`.
pub fn normalize_locale(locale: &str) -> String {
    let trimmed = locale.trim();
    if trimmed.is_empty() {
        "en_US".to_string()
    } else {
        trimmed.replace('-', "_")
    }
}

/// Current local time in the format the templates show.
pub fn current_time() -> String {
    chrono::Local::now()
        .format("%a %b %d %Y %H:%M:%S %z")
        .to_string()
}

/// Substitute `{{ NAME }}` placeholders. Unknown names render empty.
pub fn substitute(template: &str, vars: &PromptVars) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match vars.get(key) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!("Prompt variable '{}' is not set", key);
                    String::new()
                }
            }
        })
        .into_owned()
}

/// File-backed templates with built-in fallbacks
#[derive(Debug, Clone, Default)]
pub struct TemplatePrompts {
    dir: Option<PathBuf>,
}

impl TemplatePrompts {
    /// Built-in templates only.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Templates from `dir`, falling back to the built-in set.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        BUILTIN_TEMPLATES.iter().map(|(name, _)| *name)
    }

    fn load(&self, name: &str, locale: &str) -> Result<String> {
        if let Some(dir) = &self.dir {
            let candidates = [
                dir.join(format!("{}.{}.md", name, normalize_locale(locale))),
                dir.join(format!("{}.md", name)),
            ];
            for path in candidates {
                if path.is_file() {
                    return std::fs::read_to_string(&path).map_err(|e| {
                        AppError::Configuration(format!(
                            "Error loading template {} from {:?}: {}",
                            name, path, e
                        ))
                    });
                }
            }
        }

        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, text)| text.to_string())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Prompt template '{}' for locale {} does not exist",
                    name, locale
                ))
            })
    }
}

impl PromptRenderer for TemplatePrompts {
    fn system_prompt(&self, name: &str, vars: &PromptVars, locale: &str) -> Result<String> {
        let template = self.load(name, locale)?;
        let mut all_vars = vars.clone();
        all_vars
            .entry("CURRENT_TIME".to_string())
            .or_insert_with(current_time);
        all_vars
            .entry("LOCALE".to_string())
            .or_insert_with(|| locale.to_string());
        Ok(substitute(&template, &all_vars))
    }
}

/// Variables every template can use, taken from the run state.
pub fn state_vars(state: &WorkflowState) -> PromptVars {
    let mut vars = PromptVars::new();
    vars.insert("CURRENT_TIME".to_string(), current_time());
    vars.insert("LOCALE".to_string(), state.locale.clone());
    vars.insert(
        "RESEARCH_TOPIC".to_string(),
        state.effective_topic().to_string(),
    );
    vars
}

/// Render a template over the state's transcript: the system prompt first,
/// then every message of the run so far.
pub fn apply_prompt_template(
    renderer: &dyn PromptRenderer,
    name: &str,
    state: &WorkflowState,
    extra_vars: PromptVars,
) -> Result<Vec<Message>> {
    let mut vars = state_vars(state);
    vars.extend(extra_vars);
    renderer.render(name, &vars, &state.locale, &state.messages)
}

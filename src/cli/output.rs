//! Colored output helpers for CLI
//!
//! Consistent terminal output for the ares-research binary.

use crate::research::WorkflowState;
use crate::workflows::Checkpoint;
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Summary of a finished run: plan, answered steps and the report file.
    pub fn run_completed(&self, state: &WorkflowState) {
        self.header("Research complete");
        self.kv("Topic", state.effective_topic());
        if let Some(plan) = &state.plan {
            self.kv("Plan", &plan.title);
            for question in &plan.questions {
                let status = if question.execution_res.is_some() {
                    "done"
                } else {
                    "pending"
                };
                self.list_item(&format!("[{}] {}", status, question.question));
            }
        }
        self.kv("Citations", &state.citations.len().to_string());

        match &state.report_path {
            Some(path) => self.report_path(path),
            None => self.warning("No report was written"),
        }
    }

    /// Print where the report landed
    pub fn report_path(&self, path: &str) {
        if self.colored {
            println!(
                "\n  {} {} {}",
                "🚀".green(),
                "Report written to".bright_green().bold(),
                path.bright_white()
            );
        } else {
            println!("\n  [DONE] Report written to {}", path);
        }
    }

    /// Show the plan waiting for review and how to continue the run.
    pub fn run_paused(&self, checkpoint: &Checkpoint) {
        self.header("Plan review");
        if let Some(prompt) = &checkpoint.interrupt {
            self.info(prompt);
        }
        if let Some(plan) = &checkpoint.state.plan {
            self.kv("Plan", &plan.title);
            for (i, question) in plan.questions.iter().enumerate() {
                self.list_item(&format!("{}. {}", i + 1, question.question));
            }
        }

        self.hint("Accept the plan or ask for changes:");
        self.command(&format!(
            "ares-research resume {} --feedback \"[ACCEPTED]\"",
            checkpoint.id
        ));
        self.command(&format!(
            "ares-research resume {} --feedback \"[EDIT_PLAN] ...\"",
            checkpoint.id
        ));
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::Node;

    #[test]
    fn test_output_new() {
        let output = Output::new();
        assert!(output.colored);
    }

    #[test]
    fn test_output_no_color() {
        let output = Output::no_color();
        assert!(!output.colored);
    }

    #[test]
    fn test_output_methods_no_panic() {
        let output = Output::no_color();

        output.success("test success");
        output.info("test info");
        output.warning("test warning");
        output.error("test error");
        output.header("Test Header");
        output.kv("key", "value");
        output.list_item("item");
        output.hint("hint message");
        output.command("some command");
        output.report_path("outputs/report.md");
        output.newline();
    }

    #[test]
    fn test_run_summaries_no_panic() {
        let mut state = WorkflowState::new("topic");
        state.report_path = Some("outputs/report.md".to_string());
        let checkpoint = Checkpoint::new(
            Node::HumanFeedback,
            WorkflowState::new("topic"),
            Some("Please Review the subquestions".to_string()),
        );

        for output in [Output::new(), Output::no_color()] {
            output.run_completed(&state);
            output.run_paused(&checkpoint);
        }
    }
}

//! CLI module for A.R.E.S Research
//!
//! Command-line parsing for the ares-research binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use crate::types::Resource;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// A.R.E.S Research - multi-agent deep research
///
/// Decomposes a research question into sub-questions, answers them with
/// researcher, analyst and coder agents, and writes a cited report.
#[derive(Parser, Debug)]
#[command(
    name = "ares-research",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "A.R.E.S Research - multi-agent deep research workflow",
    after_help = "EXAMPLES:\n    \
                  ares-research run \"State of solid-state batteries\"\n    \
                  ares-research run --auto-accept --locale zh-CN \"量子计算的发展\"\n    \
                  ares-research run --resource notes.md \"Summarize my notes\"\n    \
                  ares-research resume 3f2a9c --feedback \"[ACCEPTED]\"\n    \
                  ares-research config --validate"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "research.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a research run on a topic
    Run {
        /// The research question
        topic: String,

        /// Accept the first plan without asking for review
        #[arg(long)]
        auto_accept: bool,

        /// Locale of the plan and report (e.g. en-US, zh-CN)
        #[arg(long, default_value = "en-US")]
        locale: String,

        /// Local file to search alongside the web (repeatable)
        #[arg(long = "resource", value_name = "PATH")]
        resources: Vec<PathBuf>,

        /// Override workflow.max_decompose_iterations
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Continue a run paused at plan review
    Resume {
        /// Checkpoint id or path to a checkpoint file
        checkpoint: String,

        /// Answer to the plan review, e.g. "[ACCEPTED]" or "[EDIT_PLAN] ..."
        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Only validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Resource entry for a local file passed with `--resource`.
pub fn resource_from_path(path: &Path) -> Resource {
    let title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Resource {
        uri: format!("file://{}", path.display()),
        title,
        description: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "ares-research",
            "run",
            "--auto-accept",
            "--resource",
            "a.md",
            "--resource",
            "b.txt",
            "--max-iterations",
            "2",
            "tidal power",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("research.toml"));
        match cli.command {
            Commands::Run {
                topic,
                auto_accept,
                locale,
                resources,
                max_iterations,
            } => {
                assert_eq!(topic, "tidal power");
                assert!(auto_accept);
                assert_eq!(locale, "en-US");
                assert_eq!(resources.len(), 2);
                assert_eq!(max_iterations, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_resume_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ares-research",
            "resume",
            "abc123",
            "--feedback",
            "[ACCEPTED]",
            "--config",
            "custom.toml",
            "--log-json",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(cli.log_json);
        assert!(matches!(
            cli.command,
            Commands::Resume { ref checkpoint, feedback: Some(ref f) }
                if checkpoint == "abc123" && f == "[ACCEPTED]"
        ));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["ares-research"]).is_err());
    }

    #[test]
    fn test_resource_from_path() {
        let resource = resource_from_path(Path::new("/tmp/notes/report.md"));
        assert_eq!(resource.uri, "file:///tmp/notes/report.md");
        assert_eq!(resource.title, "report.md");
    }
}

//! Loading research.toml from disk and reloading it.

use ares_research::llm::LlmType;
use ares_research::utils::toml_config::{ConfigError, ConfigManager, ReportStyle, ResearchConfig};
use ares_research::AppError;
use std::fs;
use std::path::Path;

const VALID: &str = r#"
[workflow]
max_decompose_iterations = 2
max_son_questions = 4
report_style = "popular_science"
enable_background_investigation = true

[models.basic]
model = "qwen2.5:7b"

[models.reasoning]
model = "deepseek-r1:14b"
token_limit = 32000

[agents]
decomposer = "reasoning"
reporter = "basic"

[output]
report_dir = "reports"
"#;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("research.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), VALID);

    let config = ResearchConfig::load(&path).unwrap();

    assert_eq!(config.workflow.max_decompose_iterations, 2);
    assert_eq!(config.workflow.max_son_questions, 4);
    assert_eq!(config.workflow.report_style, ReportStyle::PopularScience);
    assert!(config.workflow.enable_background_investigation);
    assert_eq!(config.agent_llm_type("decomposer"), LlmType::Reasoning);
    assert_eq!(config.agent_llm_type("researcher"), LlmType::Basic);
    assert_eq!(config.token_limit(LlmType::Reasoning), Some(32000));
    assert_eq!(config.output.report_dir, Path::new("reports"));
    // Unset sections keep their defaults.
    assert_eq!(config.workflow.max_search_results, 3);
    assert!(config.models.vision.is_none());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(matches!(
        ResearchConfig::load(&missing),
        Err(ConfigError::FileNotFound(_))
    ));

    let config = ResearchConfig::load_or_default(&missing).unwrap();
    for agent in ["coordinator", "decomposer", "researcher", "coder", "analyst", "reporter"] {
        assert_eq!(config.agent_llm_type(agent), LlmType::Basic, "{}", agent);
    }
}

#[test]
fn test_invalid_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let zero = write_config(dir.path(), "[workflow]\nmax_son_questions = 0\n");
    assert!(matches!(
        ResearchConfig::load(&zero),
        Err(ConfigError::ValidationError(_))
    ));

    let broken = write_config(dir.path(), "[workflow\nmax_son_questions = 3\n");
    assert!(matches!(
        ResearchConfig::load(&broken),
        Err(ConfigError::ParseError(_))
    ));

    let provider = write_config(
        dir.path(),
        "[models.basic]\nprovider = \"carrier-pigeon\"\nmodel = \"coo\"\n",
    );
    let err = ResearchConfig::load(&provider).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownProvider(_)));
    assert!(matches!(AppError::from(err), AppError::Configuration(_)));
}

#[test]
fn test_load_or_default_surfaces_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[workflow]\nmax_decompose_iterations = 0\n");
    assert!(ResearchConfig::load_or_default(&path).is_err());
}

#[test]
fn test_manager_reload_keeps_previous_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), VALID);

    let manager = ConfigManager::new(&path).unwrap();
    assert_eq!(manager.config().workflow.max_son_questions, 4);

    write_config(dir.path(), "[workflow]\nmax_son_questions = 6\n");
    manager.reload().unwrap();
    assert_eq!(manager.config().workflow.max_son_questions, 6);

    write_config(dir.path(), "[workflow]\nmax_son_questions = 0\n");
    assert!(manager.reload().is_err());
    assert_eq!(manager.config().workflow.max_son_questions, 6);
}

#[test]
fn test_manager_clones_share_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), VALID);

    let manager = ConfigManager::new(&path).unwrap();
    let clone = manager.clone();

    write_config(dir.path(), "[workflow]\nmax_son_questions = 7\n");
    manager.reload().unwrap();
    assert_eq!(clone.config().workflow.max_son_questions, 7);
    assert_eq!(clone.path(), path.as_path());
}

#[test]
fn test_config_serializes_back_to_toml() {
    let config = ResearchConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let parsed: ResearchConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed.workflow.max_son_questions, config.workflow.max_son_questions);
    assert_eq!(parsed.models, config.models);
}

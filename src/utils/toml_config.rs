//! TOML-based configuration for A.R.E.S Research
//!
//! This module provides declarative configuration for the research workflow,
//! the model classes agents run on, and where artifacts are written, via a
//! TOML file (`research.toml`). Environment variables override the file.
//!
//! # Hot Reloading
//!
//! Use `ConfigManager` for thread-safe access to the current configuration;
//! `start_watching` reloads it when the file changes.

use crate::llm::client::{LlmType, Provider};
use crate::llm::token_limits::resolve_token_limit;
use crate::types::AppError;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "research.toml";

/// Environment variable overriding the worker step limit
pub const RECURSION_LIMIT_ENV: &str = "AGENT_RECURSION_LIMIT";

/// Agents whose model class is configurable through `[agents]`
pub const AGENT_NAMES: [&str; 6] = [
    "coordinator",
    "decomposer",
    "researcher",
    "coder",
    "analyst",
    "reporter",
];

/// Root configuration structure loaded from research.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Model sections, one per LLM type
    #[serde(default)]
    pub models: ModelsConfig,

    /// Agent name to LLM type
    #[serde(default = "default_agent_llm_map")]
    pub agents: HashMap<String, LlmType>,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,
}

fn default_agent_llm_map() -> HashMap<String, LlmType> {
    AGENT_NAMES
        .iter()
        .map(|name| (name.to_string(), LlmType::Basic))
        .collect()
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig::default(),
            models: ModelsConfig::default(),
            agents: default_agent_llm_map(),
            output: OutputConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

// ============= Workflow Configuration =============

/// Tone and structure of the final report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStyle {
    #[default]
    Academic,
    PopularScience,
    News,
    SocialMedia,
    StrategicInvestment,
}

impl ReportStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStyle::Academic => "academic",
            ReportStyle::PopularScience => "popular_science",
            ReportStyle::News => "news",
            ReportStyle::SocialMedia => "social_media",
            ReportStyle::StrategicInvestment => "strategic_investment",
        }
    }
}

impl fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "academic" => Ok(ReportStyle::Academic),
            "popular_science" => Ok(ReportStyle::PopularScience),
            "news" => Ok(ReportStyle::News),
            "social_media" => Ok(ReportStyle::SocialMedia),
            "strategic_investment" => Ok(ReportStyle::StrategicInvestment),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown report style '{}'",
                other
            ))),
        }
    }
}

/// Knobs of a research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Decomposition rounds before the run falls through to the reporter
    #[serde(default = "default_max_decompose_iterations")]
    pub max_decompose_iterations: usize,

    /// Cap on the number of sub-questions in a plan
    #[serde(default = "default_max_son_questions")]
    pub max_son_questions: usize,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    #[serde(default = "default_true")]
    pub enforce_web_search: bool,

    #[serde(default = "default_true")]
    pub enable_web_search: bool,

    /// Flag researcher answers produced without a web search
    #[serde(default = "default_true")]
    pub enforce_researcher_search: bool,

    #[serde(default = "default_true")]
    pub enable_recursion_fallback: bool,

    /// Decompose with the reasoning model
    #[serde(default)]
    pub enable_deep_thinking: bool,

    #[serde(default = "default_true")]
    pub enable_background_investigation: bool,

    #[serde(default)]
    pub auto_accept_plan: bool,

    /// Offer the coordinator a handoff with a clarified topic
    #[serde(default)]
    pub enable_clarification: bool,

    #[serde(default)]
    pub report_style: ReportStyle,

    /// Tools that require human approval before each call
    #[serde(default)]
    pub interrupt_before_tools: Vec<String>,

    #[serde(default = "default_true")]
    pub crawl_enabled: bool,

    /// Per-message cap applied before every model call
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// Guard against runaway node loops
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,
}

fn default_max_decompose_iterations() -> usize {
    3
}

fn default_max_son_questions() -> usize {
    5
}

fn default_max_search_results() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_content_length() -> usize {
    crate::memory::DEFAULT_MAX_CONTENT_LENGTH
}

pub fn default_recursion_limit() -> usize {
    25
}

fn default_max_transitions() -> usize {
    200
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_decompose_iterations: default_max_decompose_iterations(),
            max_son_questions: default_max_son_questions(),
            max_search_results: default_max_search_results(),
            enforce_web_search: true,
            enable_web_search: true,
            enforce_researcher_search: true,
            enable_recursion_fallback: true,
            enable_deep_thinking: false,
            enable_background_investigation: true,
            auto_accept_plan: false,
            enable_clarification: false,
            report_style: ReportStyle::default(),
            interrupt_before_tools: Vec::new(),
            crawl_enabled: true,
            max_content_length: default_max_content_length(),
            recursion_limit: default_recursion_limit(),
            max_transitions: default_max_transitions(),
        }
    }
}

// ============= Model Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `ollama` or `openai`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name/identifier to use with the provider
    pub model: String,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable containing the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Context window; inferred from the model name when absent
    #[serde(default)]
    pub token_limit: Option<usize>,

    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_model() -> String {
    "granite4:tiny-h".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_ollama_model(),
            base_url: None,
            api_key_env: None,
            token_limit: None,
            temperature: None,
        }
    }
}

impl ModelConfig {
    /// Effective context window for this model.
    pub fn token_limit(&self) -> usize {
        resolve_token_limit(self.token_limit, &self.model)
    }

    /// Environment variable holding the API key, if the provider needs one.
    pub fn api_key_env(&self) -> Option<String> {
        match self.provider.to_lowercase().as_str() {
            "openai" => Some(
                self.api_key_env
                    .clone()
                    .unwrap_or_else(|| "OPENAI_API_KEY".to_string()),
            ),
            _ => self.api_key_env.clone(),
        }
    }

    /// Resolve the provider, reading credentials from the environment.
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        match self.provider.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama {
                base_url: self.base_url.clone().unwrap_or_else(default_ollama_url),
                model: self.model.clone(),
            }),
            "openai" => {
                let env = self.api_key_env().unwrap_or_default();
                let api_key =
                    std::env::var(&env).map_err(|_| ConfigError::MissingEnvVar(env.clone()))?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: self.base_url.clone().unwrap_or_else(default_openai_base),
                    model: self.model.clone(),
                })
            }
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// One optional model section per LLM type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_basic_model")]
    pub basic: Option<ModelConfig>,
    #[serde(default)]
    pub reasoning: Option<ModelConfig>,
    #[serde(default)]
    pub vision: Option<ModelConfig>,
    #[serde(default)]
    pub code: Option<ModelConfig>,
}

fn default_basic_model() -> Option<ModelConfig> {
    Some(ModelConfig::default())
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            basic: default_basic_model(),
            reasoning: None,
            vision: None,
            code: None,
        }
    }
}

impl ModelsConfig {
    pub fn get(&self, llm_type: LlmType) -> Option<&ModelConfig> {
        self.slot(llm_type).as_ref()
    }

    fn slot(&self, llm_type: LlmType) -> &Option<ModelConfig> {
        match llm_type {
            LlmType::Basic => &self.basic,
            LlmType::Reasoning => &self.reasoning,
            LlmType::Vision => &self.vision,
            LlmType::Code => &self.code,
        }
    }

    fn slot_mut(&mut self, llm_type: LlmType) -> &mut Option<ModelConfig> {
        match llm_type {
            LlmType::Basic => &mut self.basic,
            LlmType::Reasoning => &mut self.reasoning,
            LlmType::Vision => &mut self.vision,
            LlmType::Code => &mut self.code,
        }
    }

    /// Configured sections in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (LlmType, &ModelConfig)> {
        LlmType::ALL
            .into_iter()
            .filter_map(|llm_type| self.get(llm_type).map(|model| (llm_type, model)))
    }
}

// ============= Output & Prompt Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("outputs/checkpoints")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory with `{name}.{locale}.md` overrides of the built-in templates
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Unknown or disabled LLM provider '{0}'")]
    UnknownProvider(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Providers compiled into this build
pub fn compiled_providers() -> Vec<&'static str> {
    let mut providers = Vec::new();
    if cfg!(feature = "ollama") {
        providers.push("ollama");
    }
    if cfg!(feature = "openai") {
        providers.push("openai");
    }
    providers
}

/// Boolean environment flag: `1/true/yes/on/y` (any case) is true,
/// anything else false.
pub fn parse_env_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "y"
    )
}

/// Step limit from a raw `AGENT_RECURSION_LIMIT` value. Non-positive or
/// unparsable values fall back to `default` with a warning.
pub fn resolve_recursion_limit(raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => {
            info!("Recursion limit set to: {}", value);
            value as usize
        }
        Ok(value) => {
            warn!(
                "{}={} is not a positive integer. Using default value {}.",
                RECURSION_LIMIT_ENV, value, default
            );
            default
        }
        Err(_) => {
            warn!(
                "Invalid {} value: '{}'. Using default value {}.",
                RECURSION_LIMIT_ENV,
                crate::utils::log_sanitizer::sanitize_log_input(raw, 100),
                default
            );
            default
        }
    }
}

impl ResearchConfig {
    /// Load configuration from a TOML file, apply environment overrides
    /// and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: ResearchConfig = toml::from_str(&content)?;
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Load the file when it exists, otherwise start from defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::FileNotFound(missing)) => {
                info!("No config file at {:?}; using defaults", missing);
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let wf = &mut self.workflow;

        override_usize(&lookup, "MAX_DECOMPOSE_ITERATIONS", &mut wf.max_decompose_iterations);
        override_usize(&lookup, "MAX_SON_QUESTIONS", &mut wf.max_son_questions);
        override_usize(&lookup, "MAX_SEARCH_RESULTS", &mut wf.max_search_results);
        override_usize(&lookup, "MAX_CONTENT_LENGTH", &mut wf.max_content_length);
        override_usize(&lookup, "MAX_TRANSITIONS", &mut wf.max_transitions);
        override_usize(&lookup, "RECURSION_LIMIT", &mut wf.recursion_limit);

        override_bool(&lookup, "ENFORCE_WEB_SEARCH", &mut wf.enforce_web_search);
        override_bool(&lookup, "ENABLE_WEB_SEARCH", &mut wf.enable_web_search);
        override_bool(&lookup, "ENFORCE_RESEARCHER_SEARCH", &mut wf.enforce_researcher_search);
        override_bool(&lookup, "ENABLE_RECURSION_FALLBACK", &mut wf.enable_recursion_fallback);
        override_bool(&lookup, "ENABLE_DEEP_THINKING", &mut wf.enable_deep_thinking);
        override_bool(
            &lookup,
            "ENABLE_BACKGROUND_INVESTIGATION",
            &mut wf.enable_background_investigation,
        );
        override_bool(&lookup, "AUTO_ACCEPT_PLAN", &mut wf.auto_accept_plan);
        override_bool(&lookup, "ENABLE_CLARIFICATION", &mut wf.enable_clarification);
        override_bool(&lookup, "CRAWL_ENABLED", &mut wf.crawl_enabled);

        if let Some(raw) = lookup("REPORT_STYLE") {
            match raw.parse() {
                Ok(style) => wf.report_style = style,
                Err(e) => warn!("Ignoring REPORT_STYLE override: {}", e),
            }
        }
        if let Some(raw) = lookup("INTERRUPT_BEFORE_TOOLS") {
            wf.interrupt_before_tools = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        let env_limit = lookup(RECURSION_LIMIT_ENV);
        wf.recursion_limit = resolve_recursion_limit(env_limit.as_deref(), wf.recursion_limit);

        for llm_type in LlmType::ALL {
            apply_model_overrides(&lookup, llm_type, self.models.slot_mut(llm_type));
        }
    }

    /// Validate the configuration: fail fast on anything that would break
    /// model construction later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.basic.is_none() {
            return Err(ConfigError::ValidationError(
                "A [models.basic] section is required".to_string(),
            ));
        }

        let compiled = compiled_providers();
        for (llm_type, model) in self.models.iter() {
            let provider = model.provider.to_lowercase();
            if !compiled.contains(&provider.as_str()) {
                return Err(ConfigError::UnknownProvider(format!(
                    "{} (models.{})",
                    model.provider, llm_type
                )));
            }
            if model.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "models.{}.model must not be empty",
                    llm_type
                )));
            }
            if let Some(env) = model.api_key_env() {
                std::env::var(&env).map_err(|_| ConfigError::MissingEnvVar(env.clone()))?;
            }
        }

        for (agent, llm_type) in &self.agents {
            if self.models.get(*llm_type).is_none() {
                warn!(
                    "Agent '{}' uses LLM type '{}' which has no model section; basic will be used",
                    agent, llm_type
                );
            }
        }

        let wf = &self.workflow;
        if wf.max_son_questions == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.max_son_questions must be at least 1".to_string(),
            ));
        }
        if wf.max_decompose_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.max_decompose_iterations must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// LLM type an agent runs on. Unknown agents fall back to basic.
    pub fn agent_llm_type(&self, agent: &str) -> LlmType {
        match self.agents.get(agent) {
            Some(llm_type) => *llm_type,
            None => {
                warn!("No LLM type configured for agent '{}'; using basic", agent);
                LlmType::Basic
            }
        }
    }

    /// Model section for a type, falling back to the basic model.
    pub fn model_for(&self, llm_type: LlmType) -> Option<&ModelConfig> {
        self.models.get(llm_type).or(self.models.basic.as_ref())
    }

    /// Token limit of the model behind an LLM type.
    pub fn token_limit(&self, llm_type: LlmType) -> Option<usize> {
        self.model_for(llm_type).map(ModelConfig::token_limit)
    }
}

fn override_usize<F>(lookup: &F, key: &str, target: &mut usize)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}: '{}' is not a non-negative integer", key, raw),
        }
    }
}

fn override_bool<F>(lookup: &F, key: &str, target: &mut bool)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = parse_env_bool(&raw);
    }
}

/// `{TYPE}_MODEL__{KEY}` overrides. Setting any key for a type without a
/// section creates one from the defaults.
fn apply_model_overrides<F>(lookup: &F, llm_type: LlmType, slot: &mut Option<ModelConfig>)
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = format!("{}_MODEL__", llm_type.as_str().to_uppercase());
    let get = |key: &str| lookup(&format!("{}{}", prefix, key));

    let provider = get("PROVIDER");
    let model = get("MODEL");
    let base_url = get("BASE_URL");
    let api_key_env = get("API_KEY_ENV");
    let token_limit = get("TOKEN_LIMIT");
    let temperature = get("TEMPERATURE");

    let touched = [&provider, &model, &base_url, &api_key_env, &token_limit, &temperature]
        .iter()
        .any(|v| v.is_some());
    if !touched {
        return;
    }

    let config = slot.get_or_insert_with(ModelConfig::default);
    if let Some(provider) = provider {
        config.provider = provider;
    }
    if let Some(model) = model {
        config.model = model;
    }
    if base_url.is_some() {
        config.base_url = base_url;
    }
    if api_key_env.is_some() {
        config.api_key_env = api_key_env;
    }
    if let Some(raw) = token_limit {
        match raw.trim().parse() {
            Ok(limit) => config.token_limit = Some(limit),
            Err(_) => warn!("Ignoring {}TOKEN_LIMIT: '{}'", prefix, raw),
        }
    }
    if let Some(raw) = temperature {
        match raw.trim().parse() {
            Ok(t) => config.temperature = Some(t),
            Err(_) => warn!("Ignoring {}TEMPERATURE: '{}'", prefix, raw),
        }
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<ResearchConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl ConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Convert to absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = ResearchConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: ResearchConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<ResearchConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk. On failure the
    /// previous configuration stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = ResearchConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the config file's parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload = std::time::Instant::now();
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.elapsed() < debounce_duration {
                    continue;
                }

                // Wait a bit for file write to complete
                tokio::time::sleep(Duration::from_millis(100)).await;

                match ResearchConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = std::time::Instant::now();
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
        }
    }
}

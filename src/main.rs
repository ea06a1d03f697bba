use anyhow::Context;
use ares_research::agents::{DefaultAgentFactory, FeedbackProvider, StdinFeedback};
use ares_research::cli::output::Output;
use ares_research::cli::{resource_from_path, Cli, Commands};
use ares_research::prompt::TemplatePrompts;
use ares_research::utils::toml_config::{compiled_providers, ResearchConfig};
use ares_research::workflows::{CheckpointStore, RunOutcome, WorkflowEngine, WorkflowRuntime};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Run {
            topic,
            auto_accept,
            locale,
            resources,
            max_iterations,
        } => {
            let mut config = ResearchConfig::load_or_default(&cli.config)?;
            if auto_accept {
                config.workflow.auto_accept_plan = true;
            }
            if let Some(max) = max_iterations {
                config.workflow.max_decompose_iterations = max.max(1);
            }

            let engine = build_engine(config);
            let resources = resources.iter().map(|p| resource_from_path(p)).collect();
            let state = engine
                .runtime()
                .initial_state(&topic, &locale)
                .with_resources(resources);

            output.info(&format!("Researching: {}", topic));
            engine.run(state).await
        }
        Commands::Resume {
            checkpoint,
            feedback,
        } => {
            let config = ResearchConfig::load_or_default(&cli.config)?;
            let engine = build_engine(config);
            let store = CheckpointStore::new(&engine.runtime().config.output.checkpoint_dir);
            let checkpoint = store.load(&checkpoint).await?;

            let feedback = match feedback {
                Some(feedback) => feedback,
                None => {
                    output.run_paused(&checkpoint);
                    let prompt = checkpoint.interrupt.as_deref().unwrap_or("Feedback");
                    StdinFeedback.request_feedback(prompt).await?
                }
            };
            engine.resume(checkpoint, &feedback).await
        }
        Commands::Config { validate } => {
            let config = ResearchConfig::load_or_default(&cli.config)?;
            if validate {
                output.success(&format!("{} is valid", cli.config.display()));
            } else {
                output.header("Configuration");
                output.kv("File", &cli.config.display().to_string());
                output.kv("Providers", &compiled_providers().join(", "));
                let rendered =
                    toml::to_string_pretty(&config).context("Failed to render configuration")?;
                println!("{}", rendered);
            }
            return Ok(());
        }
    };

    match result {
        Ok(RunOutcome::Completed(state)) => output.run_completed(&state),
        Ok(RunOutcome::Paused(checkpoint)) => output.run_paused(&checkpoint),
        Err(e) => {
            output.error(&e.to_string());
            return Err(e.into());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "ares_research=debug"
    } else {
        "ares_research=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_engine(config: ResearchConfig) -> WorkflowEngine {
    let config = Arc::new(config);

    let prompts: Arc<TemplatePrompts> = Arc::new(match &config.prompts.dir {
        Some(dir) => TemplatePrompts::with_dir(dir),
        None => TemplatePrompts::builtin(),
    });
    let agents =
        Arc::new(DefaultAgentFactory::new(prompts.clone()).with_feedback(Arc::new(StdinFeedback)));
    let checkpoints = CheckpointStore::new(&config.output.checkpoint_dir);

    let runtime = WorkflowRuntime::new(config, prompts, agents);
    WorkflowEngine::new(runtime).with_checkpoints(checkpoints)
}

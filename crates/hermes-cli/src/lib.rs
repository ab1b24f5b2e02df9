//! Hermes command line.
//!
//! - `plan`: run a travel request through the workflow and print the response
//! - `graph`: print the workflow graph, optionally coloured by a saved run
//! - `config`: print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hermes_config::{Config, LoggingConfig};
use hermes_core::{PromptLibrary, ProviderInvoker};
use hermes_providers::OpenAiCompatibleProvider;
use hermes_workflow::workflow::visualize::{
    state_summary, to_ascii, to_mermaid, to_mermaid_with_state,
};
use hermes_workflow::{
    assemble, ParallelConfig, TravelState, WorkflowBuilder, WorkflowExecutor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hermes")]
#[command(about = "Multi-agent travel planner")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.config/hermes/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan a trip from a free-text request
    Plan(PlanArgs),
    /// Print the workflow graph
    Graph(GraphArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    /// The travel request, e.g. "5 days in Paris in June for two"
    pub query: String,

    /// Provider hint echoed back in the response
    #[arg(long)]
    pub provider: Option<String>,

    /// Stop at the first failed stage
    #[arg(long)]
    pub strict: bool,

    /// Write the final workflow state to FILE as JSON
    #[arg(long, value_name = "FILE")]
    pub save_state: Option<PathBuf>,

    /// Print a step-by-step summary of the run to stderr
    #[arg(long)]
    pub summary: bool,
}

#[derive(clap::Args, Debug)]
pub struct GraphArgs {
    #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
    pub format: GraphFormat,

    /// Colour nodes by a state saved with `plan --save-state`
    #[arg(long, value_name = "FILE")]
    pub with_state: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Mermaid,
    Ascii,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging);

    match cli.command {
        Commands::Plan(args) => plan(&config, args).await,
        Commands::Graph(args) => graph(&args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// both `--verbose` and the configured level.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn default_directives(level: &str) -> String {
    ["hermes", "hermes_cli", "hermes_core", "hermes_providers", "hermes_workflow"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

async fn plan(config: &Config, args: PlanArgs) -> Result<()> {
    let mut settings = ParallelConfig::from(&config.workflow);
    settings.strict |= args.strict;
    let executor = build_executor(config, settings)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the run");
            on_interrupt.cancel();
        }
    });

    let outcome = executor
        .run_with_cancel(args.query.clone(), args.provider.clone(), &cancel)
        .await?;
    let state = outcome.state();

    if let Some(path) = &args.save_state {
        save_state(path, state)?;
        info!("Saved workflow state to {}", path.display());
    }
    if args.summary {
        eprintln!("{}", state_summary(state));
    }

    let response = assemble(state);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn build_executor(config: &Config, settings: ParallelConfig) -> Result<WorkflowExecutor> {
    let provider_config = &config.provider;
    let provider = OpenAiCompatibleProvider::new_with_name(
        provider_config.name.clone(),
        config.api_key()?,
        Some(provider_config.model.clone()),
        Some(provider_config.base_url.clone()),
        provider_config.max_tokens,
        Some(provider_config.temperature),
        provider_config.request_timeout_secs,
    )?;

    let prompts = match config.prompts.resolved_library_path() {
        Some(path) => {
            debug!("Loading prompt overrides from {}", path.display());
            PromptLibrary::with_overrides_from(&path)
                .with_context(|| format!("Failed to load prompts from {}", path.display()))?
        }
        None => PromptLibrary::builtin(),
    };

    let invoker = Arc::new(ProviderInvoker::new(provider, prompts));
    Ok(WorkflowExecutor::travel_planner(invoker, settings)?)
}

fn graph(args: &GraphArgs) -> Result<()> {
    let workflow = WorkflowBuilder::travel_planner()?;
    let state = args.with_state.as_deref().map(load_state).transpose()?;

    let output = match (args.format, state) {
        (GraphFormat::Mermaid, None) => to_mermaid(&workflow),
        (GraphFormat::Mermaid, Some(state)) => to_mermaid_with_state(&workflow, &state),
        (GraphFormat::Ascii, None) => to_ascii(&workflow),
        (GraphFormat::Ascii, Some(state)) => {
            format!("{}\n{}", to_ascii(&workflow), state_summary(&state))
        }
    };
    print!("{}", output);
    Ok(())
}

fn save_state(path: &Path, state: &TravelState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write state to {}", path.display()))
}

fn load_state(path: &Path) -> Result<TravelState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid workflow state in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_workflow::StateDelta;
    use tempfile::TempDir;

    #[test]
    fn test_parse_plan_command() {
        let cli = Cli::try_parse_from([
            "hermes",
            "--verbose",
            "plan",
            "Weekend in Rome",
            "--provider",
            "openai",
            "--strict",
            "--save-state",
            "run.json",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.query, "Weekend in Rome");
        assert_eq!(args.provider.as_deref(), Some("openai"));
        assert!(args.strict);
        assert_eq!(args.save_state, Some(PathBuf::from("run.json")));
        assert!(!args.summary);
    }

    #[test]
    fn test_parse_graph_command() {
        let cli = Cli::try_parse_from(["hermes", "graph", "--format", "ascii"]).unwrap();
        let Commands::Graph(args) = cli.command else {
            panic!("expected graph");
        };
        assert_eq!(args.format, GraphFormat::Ascii);
        assert!(args.with_state.is_none());

        let cli = Cli::try_parse_from(["hermes", "--config", "h.toml", "config"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("h.toml"));
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_plan_requires_query() {
        assert!(Cli::try_parse_from(["hermes", "plan"]).is_err());
    }

    #[test]
    fn test_default_directives() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("hermes=debug,"));
        assert!(directives.contains("hermes_workflow=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut state = TravelState::new("Hiking in Patagonia");
        state.apply(StateDelta::confidence(0.88)).unwrap();
        save_state(&path, &state).unwrap();

        let restored = load_state(&path).unwrap();
        assert_eq!(restored.query(), "Hiking in Patagonia");
        assert_eq!(restored.confidence_score(), 0.88);
        assert_eq!(restored.run_id(), state.run_id());
    }

    #[test]
    fn test_load_state_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(load_state(&missing)
            .unwrap_err()
            .to_string()
            .contains("Failed to read state"));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{not json").unwrap();
        assert!(load_state(&garbage)
            .unwrap_err()
            .to_string()
            .contains("Invalid workflow state"));
    }
}

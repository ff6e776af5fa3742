//! CLI command definitions for scriptforge.
//!
//! Four commands: `serve` hosts one agent role behind the task protocol,
//! `run` executes one pipeline run, `status` reports quota and today's
//! runs, and `check` probes the registered agent fleet.

use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing::info;

use crate::agents::AgentRegistry;
use crate::pipeline::{PipelineConfig, PipelineRun, PipelineRunner, RegistryCaller};
use crate::protocol::AgentCard;
use crate::server::{self, AppState, InMemoryTaskRepository, SecurityConfig};
use crate::state::StateStore;
use crate::worker::{CommandWorker, WorkerConfig};

/// Multi-agent script production: task-protocol agent servers and a
/// score-gated orchestrator.
#[derive(Parser)]
#[command(name = "scriptforge")]
#[command(about = "Task-protocol agent servers and a score-gated content pipeline")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start a task protocol server for one agent role.
    Serve(ServeArgs),

    /// Execute one pipeline run for a topic.
    Run(RunArgs),

    /// Print quota state and today's run log.
    Status,

    /// Probe every registered agent's card and report reachability.
    Check,
}

/// Arguments for `scriptforge serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Agent role to host (research, trends, hook, concept, reviewer, improver).
    #[arg(short, long)]
    pub role: String,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: u16,
}

/// Arguments for `scriptforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Topic to produce a script for.
    pub topic: String,
}

/// Role descriptors for the agents this binary can host.
struct RoleProfile {
    name: &'static str,
    description: &'static str,
    context: &'static str,
}

const ROLE_PROFILES: &[RoleProfile] = &[
    RoleProfile {
        name: "research",
        description: "Analyzes the competitive landscape for a topic",
        context: "You are a research analyst. Given a topic, analyze existing \
                  content, extract title and framing patterns, and identify \
                  audience complaints and unserved gaps. Be specific and cite \
                  concrete observations.",
    },
    RoleProfile {
        name: "trends",
        description: "Summarizes current trends relevant to a topic",
        context: "You are a trend analyst. Summarize what is currently gaining \
                  traction around the given topic and why.",
    },
    RoleProfile {
        name: "hook",
        description: "Drafts opening hooks for a script",
        context: "You are a hook writer. Produce three distinct opening hook \
                  candidates that create immediate curiosity, each with a one \
                  line rationale.",
    },
    RoleProfile {
        name: "concept",
        description: "Drafts the full script concept",
        context: "You are a script architect. Produce a complete script \
                  concept: structure, key beats, transitions, and a closing \
                  call to action.",
    },
    RoleProfile {
        name: "reviewer",
        description: "Scores a draft script out of 100",
        context: "You are a strict script reviewer. Evaluate the draft on a \
                  100-point scale and reply with a JSON object of the form \
                  {\"score\": N, \"feedback\": \"...\"} where N is an integer \
                  between 0 and 100.",
    },
    RoleProfile {
        name: "improver",
        description: "Rewrites a draft to address review feedback",
        context: "You are a script editor. Rewrite the draft to address every \
                  point in the review feedback while keeping its structure and \
                  voice. Output only the improved script.",
    },
];

fn role_profile(role: &str) -> Option<&'static RoleProfile> {
    ROLE_PROFILES.iter().find(|p| p.name == role)
}

/// Parse CLI arguments without executing.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the scriptforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await?,
        Commands::Run(args) => run_run_command(args).await?,
        Commands::Status => run_status_command().await?,
        Commands::Check => run_check_command().await?,
    }
    Ok(())
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let profile = role_profile(&args.role).ok_or_else(|| {
        let known: Vec<&str> = ROLE_PROFILES.iter().map(|p| p.name).collect();
        anyhow::anyhow!(
            "unknown role '{}', expected one of: {}",
            args.role,
            known.join(", ")
        )
    })?;

    let card = AgentCard::new(
        profile.name,
        profile.description,
        format!("http://{}:{}", config.bind_host, args.port),
    )
    .with_skill(profile.name, profile.name, profile.description);

    let (program, worker_args) = config
        .worker_cmd
        .split_first()
        .map(|(p, rest)| (p.clone(), rest.to_vec()))
        .ok_or_else(|| anyhow::anyhow!("worker_cmd cannot be empty"))?;
    // with_timeout clamps to the orchestration ceiling
    let worker_config = WorkerConfig {
        program,
        args: worker_args,
        ..WorkerConfig::default()
    }
    .with_timeout(config.worker_timeout);

    let security = SecurityConfig {
        api_key: config.api_key.clone(),
        dev_mode: config.dev_mode,
        allowed_origins: config.allowed_origins.clone(),
        requests_per_minute: config.rate_limit_per_minute,
        requests_per_hour: config.rate_limit_per_hour,
    };

    let state = AppState::new(
        card,
        profile.context,
        Arc::new(InMemoryTaskRepository::new()),
        Arc::new(CommandWorker::new(worker_config)),
        security,
    );

    info!(role = profile.name, port = args.port, "starting agent server");
    server::serve(state, &config.bind_host, args.port).await
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let registry = build_registry(&config)?;
    if registry.is_empty() {
        anyhow::bail!("no agents registered; set FORGE_AGENTS (e.g. research=http://localhost:8101,...)");
    }

    let caller = RegistryCaller::new(Arc::new(registry), config.agent_read_timeout);
    let runner = PipelineRunner::new(config, Arc::new(caller));

    let run = runner.run(&args.topic).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    if run.status == crate::pipeline::RunStatus::Failed {
        anyhow::bail!("pipeline run failed: {}", run.error.unwrap_or_default());
    }
    Ok(())
}

async fn run_status_command() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let store = StateStore::new(&config.state_dir);
    let today = Local::now().date_naive();

    let quota = store.load_quota().await?;
    let used = quota.effective_count(today);
    let runs: Vec<PipelineRun> = store.runs_for(today).await?;

    let output = serde_json::json!({
        "date": today.to_string(),
        "runs_used": used,
        "runs_limit": config.max_daily_runs,
        "runs_remaining": config.max_daily_runs.saturating_sub(used),
        "runs_today": runs,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_check_command() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;
    let registry = build_registry(&config)?;
    if registry.is_empty() {
        anyhow::bail!("no agents registered; set FORGE_AGENTS");
    }

    let entries = registry.discover_all().await;
    for entry in &entries {
        let mark = if entry.reachable { "ok" } else { "DOWN" };
        match &entry.error {
            Some(e) => println!("{:10} {:5} {} ({})", entry.name, mark, entry.url, e),
            None => println!("{:10} {:5} {}", entry.name, mark, entry.url),
        }
    }
    let down = entries.iter().filter(|e| !e.reachable).count();
    if down > 0 {
        anyhow::bail!("{down} of {} agents unreachable", entries.len());
    }
    Ok(())
}

fn build_registry(config: &PipelineConfig) -> anyhow::Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    for (name, url) in &config.agents {
        registry.register(name.as_str(), url.as_str(), config.api_key.clone())?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_role_profiles_cover_pipeline_agents() {
        for role in ["research", "trends", "hook", "concept", "reviewer", "improver"] {
            assert!(role_profile(role).is_some(), "missing role {role}");
        }
        assert!(role_profile("coordinator").is_none());
    }

    #[test]
    fn test_parse_serve_args() {
        let cli = Cli::try_parse_from(["scriptforge", "serve", "--role", "reviewer", "--port", "8104"])
            .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.role, "reviewer");
                assert_eq!(args.port, 8104);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_run_topic() {
        let cli = Cli::try_parse_from(["scriptforge", "run", "AI tools"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.topic, "AI tools"),
            _ => panic!("expected run"),
        }
    }
}

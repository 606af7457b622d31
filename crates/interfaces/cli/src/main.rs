//! Thin CLI harness (§6): drives one turn (or the Auto Scheduler
//! heartbeat) against a workspace directory and maps the outcome onto
//! the exit-code table external callers rely on. No TUI, no Telegram
//! bridge, no onboarding wizard — those channel adapters are out of
//! scope here; this binary exists to exercise the Turn Engine directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use turnkeep_agent::session::{AgentSession, TurnBudget};
use turnkeep_agent::{build_default_registry, load_memory_port, GoalStore};
use turnkeep_config::RuntimeConfig;
use turnkeep_exec::{ExecutorConfig, ToolExecutor};
use turnkeep_llm::LlmClient;
use turnkeep_runtime::auto::AutoScheduler;
use turnkeep_runtime::{ProviderFailure, TerminationReason, TracingSink, TurnEngine};

#[derive(Debug, Parser)]
#[command(name = "turnkeep", version, about = "Autonomous agent turn engine")]
struct Cli {
    /// Path to the runtime config TOML. Missing file falls back to defaults.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    /// Workspace root tools resolve relative paths against.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single turn and print the result.
    Run {
        #[arg(long, default_value = "cli")]
        channel: String,
        #[arg(long, default_value = "default")]
        chat: String,
        /// The inbound user message. Empty text is an inbound validation error.
        message: String,
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        tier_force: bool,
        #[arg(long)]
        plan: bool,
    },
    /// Run the Auto Scheduler heartbeat until interrupted.
    Auto,
}

fn exit_code_for(termination: TerminationReason, provider_failure: Option<ProviderFailure>) -> i32 {
    match provider_failure {
        Some(ProviderFailure::Unavailable) => 69,
        Some(ProviderFailure::RateLimited) => 75,
        Some(ProviderFailure::Timeout) => 124,
        None if termination == TerminationReason::Deadline => 124,
        None => 0,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let config = match RuntimeConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Run { channel, chat, message, tier, tier_force, plan } => {
            if message.trim().is_empty() {
                eprintln!("inbound validation error: message must not be empty");
                std::process::exit(65);
            }

            let memory = load_memory_port(&cli.workspace, &config).await?;
            let goals = Arc::new(GoalStore::load(cli.workspace.join(".agent"))?);
            let available_skills = scan_available_skills(&cli.workspace);
            let registry = build_default_registry(&config, &cli.workspace, memory.clone(), goals, available_skills);
            let executor = ToolExecutor::new(ExecutorConfig::new(cli.workspace.clone()));
            let llm = LlmClient::new();
            let engine = TurnEngine::new(&registry, &executor, &llm, &config);

            let tier_override = tier.as_deref().and_then(turnkeep_thinker::Tier::from_str_loose);
            let budget = TurnBudget::new(
                config.turn.max_llm_calls,
                config.turn.max_tool_executions,
                turnkeep_exec::parse_iso8601_duration(&config.turn.deadline).unwrap_or(std::time::Duration::from_secs(3600)),
            );

            let mut session = AgentSession::new(&channel, &chat);
            let outcome = engine
                .run_turn(&mut session, &cli.workspace, &message, tier_override, tier_force, plan, Some(budget), Some(memory.as_ref()))
                .await;

            println!("{}", outcome.final_text);
            if outcome.voice.requested {
                if let Some(text) = &outcome.voice.text {
                    println!("[voice] {text}");
                }
            }
            for milestone in &outcome.milestones {
                println!("[milestone] {}: {}", milestone.kind, milestone.detail);
            }

            std::process::exit(exit_code_for(outcome.termination, outcome.provider_failure));
        }
        Commands::Auto => {
            let memory = Arc::new(
                turnkeep_memory::MemoryEngine::load(
                    &cli.workspace,
                    Arc::new(turnkeep_memory::HashingEmbedder::default()),
                    turnkeep_memory::MemoryEngineConfig::default(),
                )
                .await?,
            );
            let memory_port = load_memory_port(&cli.workspace, &config).await?;
            let goals = Arc::new(GoalStore::load(cli.workspace.join(".agent"))?);
            let available_skills = scan_available_skills(&cli.workspace);
            let registry = build_default_registry(&config, &cli.workspace, memory_port, goals.clone(), available_skills);
            let executor = ToolExecutor::new(ExecutorConfig::new(cli.workspace.clone()));
            let llm = LlmClient::new();
            let sink = TracingSink;

            let scheduler = AutoScheduler {
                goals,
                memory,
                registry: &registry,
                executor: &executor,
                llm: &llm,
                config: &config,
                workspace_root: cli.workspace.clone(),
                sink: &sink,
            };

            let (_tx, rx) = tokio::sync::watch::channel(false);
            tokio::select! {
                _ = scheduler.run(rx) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    Ok(())
}

/// Lists the skill names available under `<workspace>/.agent/skills/`,
/// one subdirectory per skill (`<name>/SKILL.md`) per §6's storage
/// layout. A missing directory means no skills are installed.
fn scan_available_skills(workspace: &std::path::Path) -> Vec<String> {
    let skills_dir = workspace.join(".agent").join("skills");
    let Ok(entries) = std::fs::read_dir(&skills_dir) else { return Vec::new() };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| turnkeep_agent::session::Skill::is_valid_name(name))
        .collect()
}

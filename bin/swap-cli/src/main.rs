use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swap_core::{EngineConfig, InMemoryStore, RequestId, SwapEngine, SwapSnapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swap-cli")]
#[command(about = "Match and plan faculty week swaps from a roster snapshot", long_about = None)]
struct Args {
    /// JSON snapshot with requests, people and assignments
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Optional engine config (TOML); SWAP__* env vars override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mutual reciprocal matches
    Exact,
    /// Maximum-weight pairing of pending requests
    Optimal,
    /// Greedy stable pairing of pending requests
    Stable,
    /// Cycle and chain discovery, ranked for execution
    Chains {
        #[arg(long)]
        max_length: Option<usize>,

        /// Print the raw discovery report instead of the ranked plan
        #[arg(long)]
        all: bool,
    },
    /// Score one request against every other pending request
    Score { request: RequestId },
    /// Execution plan for one request, including a dry-run verdict
    Plan { request: RequestId },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = EngineConfig::load(args.config.as_deref()).context("loading engine config")?;
    let raw = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading snapshot {}", args.snapshot.display()))?;
    let snapshot: SwapSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing snapshot {}", args.snapshot.display()))?;
    info!(
        "Loaded {} requests, {} people, {} assignments",
        snapshot.requests.len(),
        snapshot.people.len(),
        snapshot.assignments.len()
    );

    let store = Arc::new(InMemoryStore::from_snapshot(snapshot));
    let engine = SwapEngine::new(store, config)?;

    match args.command {
        Command::Exact => print_json(&engine.find_exact_matches().await?)?,
        Command::Optimal => print_json(&engine.find_optimal_matching(None).await?)?,
        Command::Stable => print_json(&engine.find_stable_matching(None).await?)?,
        Command::Chains { max_length, all } => {
            if all {
                print_json(&engine.discover_chains(max_length).await?)?
            } else {
                print_json(&engine.plan_chains(max_length).await?)?
            }
        }
        Command::Score { request } => print_json(&engine.score_candidates(request).await?)?,
        Command::Plan { request } => {
            let plan = engine.create_execution_plan(request).await?;
            let dry_run = engine.execute_swap(request, true).await?;
            print_json(&serde_json::json!({
                "plan": plan,
                "would_execute": dry_run.would_execute,
                "validation": dry_run.validation,
            }))?
        }
    }

    Ok(())
}

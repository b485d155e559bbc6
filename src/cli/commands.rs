//! CLI command definitions for rlduels.
//!
//! Commands cover the whole labeling workflow: simulate pairs into the store,
//! label them interactively through the buffered pipeline, and export or
//! inspect the collected preferences.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::{info, warn};

use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::render::render_pair;
use crate::session::{preference_records, write_records, LabelingSession, SessionError};
use crate::trajectory::{PairId, Preference, TrajectoryPair};

/// Default seed for simulated episodes.
const DEFAULT_SEED: u64 = 0;

/// Collect human preferences over pairs of recorded RL trajectories.
#[derive(Parser)]
#[command(name = "rlduels")]
#[command(about = "Collect human preferences over pairs of recorded RL trajectories")]
#[command(version)]
#[command(
    long_about = "rlduels stores pairs of recorded trajectories, renders them to video and lets an evaluator pick the better one.\n\nExample usage:\n  rlduels simulate -n 20\n  rlduels label\n  rlduels export -o preferences.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file. Environment variables override its values.
    #[arg(short, long, env = "RLDUELS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Store location, overriding the configuration (`memory` for in-process).
    #[arg(long, global = true)]
    pub database: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Simulate random-policy trajectory pairs and add them to the store.
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Label pending pairs interactively.
    Label(LabelArgs),

    /// Write every stored label to a JSON file.
    Export(ExportArgs),

    /// Show label progress.
    Stats(StatsArgs),

    /// Render one stored pair to video files.
    Render(RenderArgs),
}

/// Arguments for `rlduels simulate`.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of pairs to simulate (defaults to `max_entries`).
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Seed of the first episode.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Environment to simulate (defaults to `env_name`).
    #[arg(short = 'e', long)]
    pub env: Option<String>,

    /// Step limit per episode (defaults to `max_episode_steps`).
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Output result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `rlduels label`.
#[derive(Parser, Debug)]
pub struct LabelArgs {
    /// End the session when no rendered pair arrives within this many
    /// seconds. Waits indefinitely when unset.
    #[arg(long)]
    pub wait_secs: Option<u64>,

    /// Export path (defaults to `result_file`).
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `rlduels export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Export path (defaults to `result_file`).
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Also print the records as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `rlduels stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `rlduels render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Identifier of the pair to render.
    #[arg(long)]
    pub pair_id: i64,
}

/// One evaluator answer typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Prefer(Preference),
    Skip,
    Quit,
}

/// Parses a prompt answer: `1`, `2`, `t`(ie), `s`(kip) or `q`(uit).
pub fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_lowercase().as_str() {
        "1" | "first" | "left" => Some(Answer::Prefer(Preference::First)),
        "2" | "second" | "right" => Some(Answer::Prefer(Preference::Second)),
        "t" | "tie" | "=" => Some(Answer::Prefer(Preference::Indifferent)),
        "s" | "skip" => Some(Answer::Skip),
        "q" | "quit" | "exit" => Some(Answer::Quit),
        _ => None,
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the rlduels CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.database.as_deref())?;

    match cli.command {
        Commands::Simulate(args) => run_simulate_command(config, args).await,
        Commands::Label(args) => run_label_command(config, args).await,
        Commands::Export(args) => run_export_command(config, args).await,
        Commands::Stats(args) => run_stats_command(config, args).await,
        Commands::Render(args) => run_render_command(config, args).await,
    }
}

/// Builds the configuration: file (if any), then environment, then flags.
fn load_config(path: Option<&Path>, database: Option<&str>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
            .apply_env()?,
        None => PipelineConfig::from_env()?,
    };

    if let Some(database) = database {
        config.database_url = database.to_string();
    }
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

#[derive(Debug, Serialize)]
struct SimulateOutput {
    status: String,
    env_name: String,
    pairs: usize,
    ids: Vec<PairId>,
}

async fn run_simulate_command(mut config: PipelineConfig, args: SimulateArgs) -> anyhow::Result<()> {
    if let Some(count) = args.count {
        config.max_entries = count;
    }
    if let Some(env) = args.env {
        config.env_name = env;
    }
    if let Some(max_steps) = args.max_steps {
        config.max_episode_steps = max_steps;
    }

    let orchestrator = PipelineOrchestrator::new(config).await?;
    let ids = orchestrator
        .simulate(args.seed)
        .await
        .context("Simulation failed")?;

    let output = SimulateOutput {
        status: "success".to_string(),
        env_name: orchestrator.config().env_name.clone(),
        pairs: ids.len(),
        ids,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Simulated {} pairs in {}", output.pairs, output.env_name);
        if let (Some(first), Some(last)) = (output.ids.first(), output.ids.last()) {
            println!("  Pair ids: {}..={}", first, last);
        }
    }
    Ok(())
}

async fn run_label_command(mut config: PipelineConfig, args: LabelArgs) -> anyhow::Result<()> {
    if let Some(output) = args.output {
        config.result_file = output;
    }
    let wait = args.wait_secs.map(Duration::from_secs);

    let orchestrator = PipelineOrchestrator::new(config).await?;
    let counts = orchestrator.label_counts().await?;
    info!(pending = counts.pending, total = counts.total, "Starting labeling session");

    let mut session = orchestrator.start_session().await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    // The session is terminated on every exit path so videos and the
    // export are handled even when the loop fails.
    let outcome = label_pairs(&mut session, &mut lines, &mut stdout, wait).await;
    if let Err(e) = &outcome {
        warn!(error = %e, "Labeling loop ended with an error");
    }

    let labeled = session.labeled_count();
    let result_file = session.settings().result_file.clone();
    let terminated = session.terminate().await;
    outcome?;
    let records = terminated?;

    println!("✓ Labeling session finished");
    println!("  Labeled this session: {}", labeled);
    println!("  Exported records:     {}", records.len());
    println!("  Result file:          {}", result_file.display());
    Ok(())
}

/// Prompts for pairs until the evaluator quits, input ends, or `wait`
/// (when set) passes without a new pair.
///
/// Store failures while saving an answer are reported and the same pair is
/// asked again. The caller is responsible for terminating the session.
async fn label_pairs<R, W>(
    session: &mut LabelingSession,
    lines: &mut Lines<R>,
    out: &mut W,
    wait: Option<Duration>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let description = match wait {
            Some(wait) => match session.next_pair_within(wait).await {
                Some(pair) => describe_pair(pair),
                None => {
                    say(out, &format!("No more pairs arrived within {}s.\n", wait.as_secs())).await?;
                    return Ok(());
                }
            },
            None => describe_pair(session.current_pair().await),
        };
        say(out, &description).await?;

        loop {
            say(out, "Preferred? [1/2/t(ie)/s(kip)/q(uit)] ").await?;

            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };

            let result = match parse_answer(&line) {
                Some(Answer::Prefer(preference)) => session.submit_preference(preference).await,
                Some(Answer::Skip) => session.skip().await,
                Some(Answer::Quit) => return Ok(()),
                None => {
                    say(out, &format!("Unrecognized answer '{}'\n", line.trim())).await?;
                    continue;
                }
            };

            match result {
                Ok(()) => break,
                Err(e @ (SessionError::TiesNotAllowed | SessionError::SkippingNotAllowed)) => {
                    say(out, &format!("{e}\n")).await?;
                }
                Err(SessionError::Store(e)) => {
                    warn!(error = %e, retryable = e.is_retryable(), "Couldn't save label");
                    say(out, &format!("Couldn't save your answer ({e}), please answer again.\n"))
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn describe_pair(pair: &TrajectoryPair) -> String {
    let mut text = format!("\nPair {} ({})\n", pair.id, pair.env_name());
    for (label, video, reward) in [
        ("1", &pair.video1, pair.trajectory1.total_reward()),
        ("2", &pair.video2, pair.trajectory2.total_reward()),
    ] {
        let path = video
            .as_ref()
            .map(|v| v.path().display().to_string())
            .unwrap_or_else(|| "<not rendered>".to_string());
        text.push_str(&format!("  [{label}] {path}  (reward {reward:.1})\n"));
    }
    text
}

async fn say<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

async fn run_export_command(config: PipelineConfig, args: ExportArgs) -> anyhow::Result<()> {
    let output = args.output.unwrap_or_else(|| config.result_file.clone());
    let orchestrator = PipelineOrchestrator::new(config).await?;

    let gathered = orchestrator.store().gather_preferences().await?;
    let records = preference_records(&gathered);
    write_records(&output, &records)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        let labeled = records.iter().filter(|r| r.preference.is_some()).count();
        println!("✓ Exported {} records ({} labeled)", records.len(), labeled);
        println!("  Output: {}", output.display());
    }
    Ok(())
}

async fn run_stats_command(config: PipelineConfig, args: StatsArgs) -> anyhow::Result<()> {
    let orchestrator = PipelineOrchestrator::new(config).await?;
    let counts = orchestrator.label_counts().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Total pairs: {}", counts.total);
        println!("  Labeled:   {}", counts.labeled);
        println!("  Skipped:   {}", counts.skipped);
        println!("  Pending:   {}", counts.pending);
    }
    Ok(())
}

async fn run_render_command(config: PipelineConfig, args: RenderArgs) -> anyhow::Result<()> {
    let orchestrator = PipelineOrchestrator::new(config).await?;
    let id = PairId(args.pair_id);

    let Some(mut pair) = orchestrator.store().find(id).await? else {
        anyhow::bail!("No pair with id {}", id);
    };

    render_pair(orchestrator.renderer().as_ref(), &mut pair)
        .await
        .with_context(|| format!("Failed to render pair {}", id))?;

    println!("✓ Rendered pair {}", id);
    for video in [&pair.video1, &pair.video2].into_iter().flatten() {
        println!("  {}", video.path().display());
    }
    if pair.is_resolved() {
        warn!(pair_id = %id, "Pair is already labeled or skipped");
    }
    Ok(())
}

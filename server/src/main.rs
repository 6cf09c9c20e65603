//! chessdash CLI - runs a mistake analysis batch from a JSON file of games.
//!
//! Configuration comes from `CHESSDASH_*` environment variables; command-line
//! flags override them. Logs go to stderr, task JSON to stdout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use analysis::GameRecord;
use anyhow::{bail, Context};
use chessdash_server::{MistakeAnalyzer, MistakeConfig, SearchMode, TaskStatusView};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chessdash", about = "Stage-by-stage mistake analysis for chess games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a batch of games and print the aggregated result.
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    /// JSON array of game records (`pgn`, `url`, `player_color`, ...).
    #[arg(long)]
    games: PathBuf,

    /// Maximum number of games to analyse from the batch.
    #[arg(long)]
    max_games: Option<usize>,

    /// Moves sampled from each game stage.
    #[arg(long)]
    moves_per_stage: Option<usize>,

    /// Node budget per position.
    #[arg(long)]
    nodes: Option<u64>,

    #[arg(long, value_enum)]
    search: Option<SearchMode>,

    /// Path to the Stockfish binary.
    #[arg(long)]
    stockfish: Option<PathBuf>,

    /// Consult the Lichess cloud evaluation cache before Stockfish.
    #[arg(long)]
    cloud_eval: bool,

    /// How often to poll task status.
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
}

impl AnalyzeArgs {
    fn apply(&self, config: &mut MistakeConfig) {
        if let Some(max_games) = self.max_games {
            config.max_analysis_games = max_games;
        }
        if let Some(moves) = self.moves_per_stage {
            config.moves_per_stage = moves;
        }
        if let Some(nodes) = self.nodes {
            config.engine_nodes = nodes;
        }
        if let Some(search) = self.search {
            config.search_mode = search;
        }
        if let Some(path) = &self.stockfish {
            config.engine_path = Some(path.clone());
        }
        config.cloud_eval |= self.cloud_eval;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut config = MistakeConfig::from_env().context("invalid CHESSDASH_* environment")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let games = load_games(&args.games)?;
    tracing::info!(games = games.len(), file = %args.games.display(), "Loaded game batch");

    let analyzer = MistakeAnalyzer::with_stockfish(config)?;

    let submission = analyzer.submit(games).await;
    println!("{}", serde_json::to_string_pretty(&submission.created)?);
    let task_id = submission.created.task_id;

    let poll_interval = Duration::from_millis(args.poll_interval_ms.max(1));
    let status = loop {
        match analyzer.status(&task_id).await {
            TaskStatusView::Processing { progress } => {
                tracing::info!(
                    current = progress.current,
                    total = progress.total,
                    percentage = progress.percentage,
                    eta_seconds = progress.estimated_remaining_seconds,
                    "Analysing"
                );
                tokio::time::sleep(poll_interval).await;
            }
            terminal => break terminal,
        }
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    match status {
        TaskStatusView::Error { error } => bail!("analysis failed: {}", error),
        TaskStatusView::NotFound => bail!("task {} expired before it finished", task_id),
        _ => Ok(()),
    }
}

fn load_games(path: &Path) -> anyhow::Result<Vec<GameRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of games", path.display()))
}

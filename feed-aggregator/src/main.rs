use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feed_aggregator::{init_logging, AggregatorConfig, FeedAggregator, RunSummary, SourceRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Exit code for a run stopped with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "feed-aggregator", version, about = "Fetch RSS/Atom feeds into per-day JSON files")]
struct Cli {
    /// JSON config file layered over the built-in defaults
    #[arg(long, env = "FEED_AGGREGATOR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Source registry (JSON array of feeds)
    #[arg(long, env = "FEED_AGGREGATOR_SOURCES", global = true)]
    sources: Option<PathBuf>,

    /// Directory for the daily JSON files
    #[arg(long, env = "FEED_AGGREGATOR_OUTPUT_DIR", global = true)]
    output_dir: Option<PathBuf>,

    #[arg(long, env = "FEED_AGGREGATOR_STATE_FILE", global = true)]
    state_file: Option<PathBuf>,

    #[arg(long, env = "FEED_AGGREGATOR_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long, env = "FEED_AGGREGATOR_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[arg(long, global = true)]
    max_age_days: Option<i64>,

    /// Fetch and normalize but write nothing
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Fetch every source once and update the daily files (default)
    Run,
    /// Print the source registry in fetch order
    Sources,
}

impl Cli {
    fn build_config(&self) -> Result<AggregatorConfig> {
        let mut config = match &self.config {
            Some(path) => AggregatorConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => AggregatorConfig::new(),
        };

        if let Some(path) = &self.sources {
            config.sources_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.store.output_dir = dir.clone();
        }
        if let Some(path) = &self.state_file {
            config.state_path = path.clone();
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(size) = self.batch_size {
            config.batch.batch_size = size;
        }
        if let Some(days) = self.max_age_days {
            config.normalize.max_age_days = days;
        }
        config.dry_run |= self.dry_run;

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.build_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    match cli.command.unwrap_or(Command::Run) {
        Command::Sources => list_sources(&config),
        Command::Run => {
            let result = run(config).await;
            match &result {
                Ok(summary) if summary.interrupted => info!("Aggregation interrupted by user"),
                Ok(_) => info!("Feed aggregation completed successfully"),
                Err(e) => error!("Aggregation failed with error: {e:#}"),
            }
            ExitCode::from(exit_status(&result))
        }
    }
}

/// An interrupt is an orderly stop, not a failure, but still reports 130 so
/// callers can tell it from a completed run.
fn exit_status(result: &Result<RunSummary>) -> u8 {
    match result {
        Ok(summary) if summary.interrupted => EXIT_INTERRUPTED,
        Ok(_) => 0,
        Err(_) => 1,
    }
}

async fn run(config: AggregatorConfig) -> Result<RunSummary> {
    let aggregator = FeedAggregator::new(config).context("failed to set up HTTP client")?;

    let shutdown = async {
        // Without a signal handler the run simply cannot be interrupted.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    Ok(aggregator.run_until(shutdown).await?)
}

fn list_sources(config: &AggregatorConfig) -> ExitCode {
    match SourceRegistry::load(&config.sources_path) {
        Ok(registry) => {
            for source in registry.sources() {
                println!(
                    "{:<28} p{}  {:<12} {}",
                    source.id,
                    source.effective_priority(),
                    source.category,
                    source.url
                );
            }
            println!("{} sources", registry.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

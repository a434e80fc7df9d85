//! AETOS CLI — run enrichment batches and inspect analytics from the
//! terminal.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use aetos_core::{
    config, AetosConfig, AnalyticsPayload, BatchReport, IntelligenceEngine, PipelineCallback,
};

/// AETOS: technology-intelligence over papers and patents
#[derive(Parser, Debug)]
#[command(name = "aetos", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch, enrich, and store documents for a topic
    Run {
        /// Topic to research (e.g. "solid state batteries")
        topic: String,

        /// Total number of candidate documents to fetch across sources
        #[arg(short, long, default_value = "10")]
        documents: usize,

        /// Analyze one document at a time with pacing, instead of the
        /// bounded concurrent pool
        #[arg(long)]
        sequential: bool,
    },
    /// Print analytics over the stored collection as JSON
    Analytics {
        /// Restrict to records matching this topic
        topic: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Destination path (defaults to the user config directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let config = config::load_config(cli.config.as_deref())?;
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Run {
            topic,
            documents,
            sequential,
        } => {
            let engine = IntelligenceEngine::from_config(&config, sequential)?;
            let report = engine
                .run_batch(&topic, documents, &ProgressPrinter)
                .await?;
            print_report(&report);
        }
        Commands::Analytics { topic } => {
            let engine = IntelligenceEngine::from_config(&config, false)?;
            let payload = engine.analytics(topic.as_deref())?;
            print_analytics(&payload)?;
        }
        Commands::Config { action } => handle_config(action, &config)?,
    }

    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "aetos", "aetos")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "aetos.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

struct ProgressPrinter;

impl PipelineCallback for ProgressPrinter {
    fn on_progress(&self, processed: usize, total: usize) {
        eprintln!("  analyzed {processed}/{total}");
    }
}

fn print_report(report: &BatchReport) {
    println!("Topic:    {}", report.topic);
    println!("Fetched:  {}", report.fetched);
    println!("Eligible: {}", report.eligible);
    println!("Enriched: {}", report.enriched);
    println!("Stored:   {} new, {} updated", report.inserted, report.updated);
    println!("Status:   {}", report.status);
}

fn print_analytics(payload: &AnalyticsPayload) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

fn handle_config(action: ConfigAction, config: &AetosConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { path } => {
            let path = match path {
                Some(p) => p,
                None => directories::ProjectDirs::from("dev", "aetos", "aetos")
                    .map(|d| d.config_dir().join("config.toml"))
                    .ok_or_else(|| anyhow::anyhow!("could not determine a config directory"))?,
            };
            config::write_default(&path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let engine_view = toml::to_string_pretty(config)?;
            println!("{engine_view}");
        }
    }
    Ok(())
}

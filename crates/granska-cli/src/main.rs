//! Granska CLI - operations console for the fraud-intelligence core
//!
//! # Usage
//!
//! ```bash
//! # Ingest mentions from a JSON Lines file and resolve them
//! granska --db granska.db ingest mentions.jsonl
//! granska --db granska.db resolve --limit 1000
//!
//! # Nightly derivation and shell-network detection
//! granska --db granska.db derive
//! granska --db granska.db detect --min-companies 3
//!
//! # Work the review queue, verify the audit chain
//! granska --db granska.db review list
//! granska --db granska.db verify
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use granska_core::CoreConfig;
use granska_persist::{SqliteBackend, Store};

mod commands;

use commands::{alerts, derive, detect, info, ingest, metrics, resolve, review, verify};

/// Granska - Swedish corporate fraud intelligence
///
/// Entity resolution, derived risk facts, and shell-network detection over
/// a hash-chain-audited entity-fact store.
#[derive(Parser)]
#[command(
    name = "granska",
    version,
    about = "Granska - corporate fraud intelligence console",
    long_about = "Granska ingests registry mentions, resolves them into an\n\
                  entity graph, derives risk facts nightly, and detects\n\
                  shell-company networks. Every mutation is hash-chained\n\
                  into a tamper-evident audit log."
)]
struct Cli {
    /// SQLite database path or URL (use :memory: for throwaway runs)
    #[arg(long, global = true, default_value = "granska.db")]
    db: String,

    /// TOML configuration file (GRANSKA_* env vars override)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest mention records from a JSON Lines file
    Ingest(ingest::IngestArgs),

    /// Resolve pending mentions
    Resolve(resolve::ResolveArgs),

    /// Run a derivation pass (risk, velocity, shell flags, clusters)
    Derive(derive::DeriveArgs),

    /// Detect shell-company networks
    Detect(detect::DetectArgs),

    /// List or acknowledge alerts
    Alerts(alerts::AlertsArgs),

    /// Work the human review queue
    Review(review::ReviewArgs),

    /// Verify audit chain integrity
    Verify(verify::VerifyArgs),

    /// Print resolver accuracy metrics against ground truth
    Metrics(metrics::MetricsArgs),

    /// Show effective configuration and store statistics
    Info(info::InfoArgs),
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn open_store(db: &str) -> Result<Store> {
    let url = if db == ":memory:" {
        "sqlite::memory:".to_string()
    } else if db.starts_with("sqlite:") {
        db.to_string()
    } else {
        format!("sqlite:{db}?mode=rwc")
    };
    let backend = SqliteBackend::new(&url).await?;
    Ok(Store::new(Arc::new(backend)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Arc::new(CoreConfig::load(cli.config.as_deref())?);
    let store = open_store(&cli.db).await?;

    match cli.command {
        Commands::Ingest(args) => ingest::run(store, config, args).await,
        Commands::Resolve(args) => resolve::run(store, config, args).await,
        Commands::Derive(args) => derive::run(store, config, args).await,
        Commands::Detect(args) => detect::run(store, config, args).await,
        Commands::Alerts(args) => alerts::run(store, args).await,
        Commands::Review(args) => review::run(store, config, args).await,
        Commands::Verify(args) => verify::run(store, args).await,
        Commands::Metrics(args) => metrics::run(store, args).await,
        Commands::Info(args) => info::run(store, config, args).await,
    }
}

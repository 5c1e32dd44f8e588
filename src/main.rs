//! adtap - CLI entry point
//!
//! # Usage
//!
//! ```bash
//! # Run a sync, emitting JSONL to stdout
//! adtap -c config.yaml run
//!
//! # Validate configuration
//! adtap -c config.yaml validate
//!
//! # Check connectivity and credentials
//! adtap -c config.yaml check
//!
//! # Print the stream catalog
//! adtap discover
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use adtap::{ApiClient, RecordWriter, State, SyncRunner, TapConfig};

#[derive(Parser)]
#[command(name = "adtap")]
#[command(version, about = "Incremental extraction connector for social-ads REST APIs")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the bookmark state file
    #[arg(short, long, default_value = "state.json")]
    state: PathBuf,

    /// Write records to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync of all enabled streams (default)
    Run,
    /// Validate the configuration file
    Validate,
    /// Check connectivity and credentials against the API
    Check,
    /// Print the stream catalog with schemas
    Discover,
    /// Print the configuration JSON schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that don't need config
    match &cli.command {
        Some(Commands::Discover) => {
            println!("{}", serde_json::to_string_pretty(&adtap::discover_catalog())?);
            return Ok(());
        }
        Some(Commands::Schema) => {
            let schema = schemars::schema_for!(TapConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        _ => {}
    }

    let config = TapConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command.take().unwrap_or(Commands::Run) {
        Commands::Validate => {
            info!("configuration is valid");
            Ok(())
        }
        Commands::Check => {
            let client = ApiClient::from_config(&config)?;
            let runner = SyncRunner::new(&client, &config, State::new());
            runner.check().await.context("connectivity check failed")?;
            info!("connectivity check passed");
            Ok(())
        }
        Commands::Run => run_sync(&cli, &config).await,
        Commands::Discover | Commands::Schema => unreachable!("handled above"),
    }
}

async fn run_sync(cli: &Cli, config: &TapConfig) -> Result<()> {
    let client = ApiClient::from_config(config)?;
    let state = State::load(&cli.state)
        .with_context(|| format!("failed to load state from {}", cli.state.display()))?;

    let mut writer = match &cli.output {
        Some(path) => RecordWriter::file(path)
            .with_context(|| format!("failed to open output file {}", path.display()))?,
        None => RecordWriter::stdout(),
    };

    let mut runner = SyncRunner::new(&client, config, state);
    let summary = runner.sync_all(&mut writer).await?;

    let state = runner.into_state();
    state
        .save(&cli.state)
        .with_context(|| format!("failed to save state to {}", cli.state.display()))?;

    info!(
        records = summary.records_emitted(),
        streams = summary.streams.len(),
        "sync complete"
    );

    let failed = summary.failed_streams();
    if !failed.is_empty() {
        warn!(streams = ?failed, "some streams failed");
        anyhow::bail!("{} stream(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "adtap=debug,info" } else { "adtap=info,warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr; stdout is reserved for emitted records
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

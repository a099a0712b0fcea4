//! hmap-er - Hotel entity resolution
//!
//! **Usage:**
//! ```bash
//! hmap-er run --locals hotels.csv --listings listings.json [--output verdicts.csv]
//! hmap-er evaluate --local local.json --remote remote.json
//! hmap-er config --show | --init <path>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hmap_common::config::{load_toml_config, write_toml_config};
use hmap_er::config::MatcherConfig;
use hmap_er::runner::MatchRunner;
use hmap_er::sink::CsvResultSink;
use hmap_er::supplier::{apply_code_filter, load_code_filter, load_local_records, ListingFileSupplier, ProcessedLog};
use hmap_er::{LocalHotelRecord, MatchSession, RemoteListingRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for hmap-er
#[derive(Parser, Debug)]
#[command(name = "hmap-er")]
#[command(about = "Match local hotel records against scraped listings")]
#[command(version)]
struct Args {
    /// Configuration file (overrides HMAP_CONFIG and the per-user file)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every local record against its candidate listings
    Run {
        /// CSV of local hotel records
        #[arg(long, value_name = "CSV")]
        locals: PathBuf,

        /// JSON object mapping local codes to candidate listings
        #[arg(long, value_name = "JSON")]
        listings: PathBuf,

        /// Output CSV (default: verdicts_<timestamp>.csv)
        #[arg(short, long, value_name = "CSV")]
        output: Option<PathBuf>,

        /// Only process the codes listed in this file (one per line)
        #[arg(long, value_name = "FILE")]
        codes: Option<PathBuf>,

        /// Skip codes recorded here and append codes as they finish
        #[arg(long, value_name = "FILE")]
        resume_log: Option<PathBuf>,

        /// Defer uncertain pairs instead of consulting the semantic arbiter
        #[arg(long)]
        no_arbiter: bool,
    },

    /// Evaluate a single pair and print the verdict as JSON
    Evaluate {
        #[arg(long, value_name = "JSON")]
        local: PathBuf,

        #[arg(long, value_name = "JSON")]
        remote: PathBuf,

        #[arg(long)]
        no_arbiter: bool,
    },

    /// Show the effective configuration or write the defaults
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        show: bool,

        /// Write the default configuration to this path
        #[arg(long, value_name = "PATH")]
        init: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    hmap_common::logging::init_tracing(&toml_config.logging).context("Failed to initialize logging")?;

    info!("hmap-er {}", env!("CARGO_PKG_VERSION"));

    // Configuration errors stop here, before any pair is evaluated
    let config = MatcherConfig::from_toml(&toml_config).context("Invalid configuration")?;

    match args.command {
        Command::Run {
            locals,
            listings,
            output,
            codes,
            resume_log,
            no_arbiter,
        } => {
            let config = if no_arbiter { config.without_arbiter() } else { config };
            run(&config, &locals, &listings, output, codes.as_deref(), resume_log).await
        }
        Command::Evaluate {
            local,
            remote,
            no_arbiter,
        } => {
            let config = if no_arbiter { config.without_arbiter() } else { config };
            evaluate(&config, &local, &remote).await
        }
        Command::Config { show, init } => {
            if let Some(path) = init {
                write_toml_config(&MatcherConfig::default().to_toml(), &path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Default configuration written to {}", path.display());
            }
            if show {
                print!("{}", toml::to_string_pretty(&config.to_toml())?);
            }
            Ok(())
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "verdicts_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

async fn run(
    config: &MatcherConfig,
    locals_path: &Path,
    listings_path: &Path,
    output: Option<PathBuf>,
    codes_path: Option<&Path>,
    resume_log: Option<PathBuf>,
) -> Result<()> {
    let mut locals = load_local_records(locals_path)
        .with_context(|| format!("Failed to load local records from {}", locals_path.display()))?;
    if let Some(path) = codes_path {
        let codes = load_code_filter(path).with_context(|| format!("Failed to read {}", path.display()))?;
        locals = apply_code_filter(locals, &codes);
    }

    let mut supplier = ListingFileSupplier::from_path(listings_path, config.runner.max_candidates)
        .with_context(|| format!("Failed to load listings from {}", listings_path.display()))?;
    if let Some(path) = resume_log {
        supplier = supplier.with_processed_log(ProcessedLog::open(path)?);
    }

    let arbiter = config.build_arbiter()?;
    let session = Arc::new(MatchSession::new(config, arbiter)?);

    let output = output.unwrap_or_else(default_output_path);
    let mut sink = CsvResultSink::create(&output, config.runner.batch_size)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let cancel_token = CancellationToken::new();
    let runner = MatchRunner::new(session, Arc::new(supplier), config.runner.max_concurrency)
        .with_cancel_token(cancel_token.clone());

    let watcher = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling run");
            cancel_token.cancel();
        }
    });

    let summary = runner.run(&locals, &mut sink).await;
    watcher.abort();
    let summary = summary?;

    info!(
        output = %output.display(),
        rows = sink.written(),
        "Verdicts written"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn evaluate(config: &MatcherConfig, local_path: &Path, remote_path: &Path) -> Result<()> {
    let local: LocalHotelRecord = serde_json::from_str(
        &std::fs::read_to_string(local_path).with_context(|| format!("Failed to read {}", local_path.display()))?,
    )
    .context("Invalid local record JSON")?;
    let remote: RemoteListingRecord = serde_json::from_str(
        &std::fs::read_to_string(remote_path).with_context(|| format!("Failed to read {}", remote_path.display()))?,
    )
    .context("Invalid remote record JSON")?;

    let session = MatchSession::new(config, config.build_arbiter()?)?;
    let verdict = session.evaluate(&local, &remote).await;

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

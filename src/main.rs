//! Frontier-Relay main entry point
//!
//! This is the command-line interface for the Frontier-Relay crawl dispatcher.

use anyhow::{Context, Result};
use clap::Parser;
use frontier_relay::artifact::FsArtifactStore;
use frontier_relay::classifier::PhraseClassifier;
use frontier_relay::config::{collect_seeds, load_config_with_hash, Config, RunConfig};
use frontier_relay::crawler::{Checkpointer, Dispatcher, RunOutcome};
use frontier_relay::fetch::{build_http_client, LocalFetcher, RemoteFetcher};
use frontier_relay::frontier::FrontierStore;
use frontier_relay::output::{
    export_results_csv, generate_markdown_summary, load_statistics, print_statistics,
    CrawlSummary,
};
use frontier_relay::storage::{open_storage, Storage};
use frontier_relay::normalize_url;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Frontier-Relay: a resumable two-tier crawl dispatcher
///
/// Frontier-Relay fetches a frontier of URLs with bounded concurrency,
/// escalates blocked-looking pages to a remote fetch service, and
/// checkpoints its progress so an interrupted run can be resumed.
#[derive(Parser, Debug)]
#[command(name = "frontier-relay")]
#[command(version)]
#[command(about = "A resumable two-tier crawl dispatcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding the checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "export_csv"])]
    dry_run: bool,

    /// Show statistics from the checkpoint database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "export_csv"])]
    stats: bool,

    /// Write the markdown summary from the checkpoint database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_csv"])]
    export_summary: bool,

    /// Write per-URL results as CSV from the checkpoint database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    export_csv: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("frontier_relay=info,warn"),
            1 => EnvFilter::new("frontier_relay=debug,info"),
            2 => EnvFilter::new("frontier_relay=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let config_dir = cli.config.parent().unwrap_or_else(|| Path::new("."));
    let seeds = collect_seeds(&config, config_dir).context("failed to collect seeds")?;

    if cli.dry_run {
        handle_dry_run(&config, &seeds);
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.export_summary {
        handle_export_summary(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.export_csv {
        handle_export_csv(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        if cli.resume {
            tracing::debug!("--resume given explicitly");
        }
        handle_crawl(config, config_hash, seeds, cli.fresh).await
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, seeds: &[String]) {
    let run = RunConfig::from_config(config);

    println!("=== Frontier-Relay Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max levels: {}", run.max_levels);
    println!("  Max concurrency: {}", run.max_concurrency);
    println!("  Retry attempts: {}", run.retry_attempts);
    println!("  Per-fetch timeout: {:?}", run.per_fetch_timeout);
    println!("  Checkpoint interval: {} units", run.checkpoint_interval);
    println!("  Max links per page: {}", run.max_links_per_page);
    match config.crawler.max_seeds {
        Some(cap) => println!("  Max seeds: {}", cap),
        None => println!("  Max seeds: (all)"),
    }

    println!("\nEscalation:");
    println!("  Enabled: {}", config.escalation.enabled);
    println!("  Trigger phrases: {}", config.escalation.trigger_phrases.len());
    match &config.remote {
        Some(remote) => {
            println!("  Remote endpoint: {}", remote.endpoint);
            println!("  Remote timeout: {:?}", run.remote_timeout);
        }
        None => println!("  Remote endpoint: (none)"),
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Artifacts: {}", config.output.artifact_dir);
    println!("  Summary: {}", config.output.summary_path);
    println!("  Results: {}", config.output.results_path().display());

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the checkpoint database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.checkpoint_path);

    let storage = open_storage(Path::new(&config.output.checkpoint_path))
        .context("failed to open checkpoint database")?;

    match load_statistics(&storage)? {
        Some(summary) => print_statistics(&summary),
        None => println!("No checkpoint found."),
    }

    Ok(())
}

/// Handles the --export-summary mode: writes the markdown summary
fn handle_export_summary(config: &Config) -> Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Database: {}", config.output.checkpoint_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = open_storage(Path::new(&config.output.checkpoint_path))
        .context("failed to open checkpoint database")?;

    let Some(summary) = load_statistics(&storage)? else {
        println!("No checkpoint found, nothing to export.");
        return Ok(());
    };

    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))
        .context("failed to write markdown summary")?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the --export-csv mode: writes one row per known URL
fn handle_export_csv(config: &Config) -> Result<()> {
    let results_path = config.output.results_path();

    println!("=== Exporting Crawl Results ===\n");
    println!("Database: {}", config.output.checkpoint_path);
    println!("Output: {}", results_path.display());
    println!();

    let storage = open_storage(Path::new(&config.output.checkpoint_path))
        .context("failed to open checkpoint database")?;

    let Some(snapshot) = storage.load_snapshot()? else {
        println!("No checkpoint found, nothing to export.");
        return Ok(());
    };

    export_results_csv(&snapshot.records, &results_path)
        .context("failed to write results CSV")?;

    println!(
        "✓ {} URLs exported to: {}",
        snapshot.records.len(),
        results_path.display()
    );

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    seeds: Vec<String>,
    fresh: bool,
) -> Result<ExitCode> {
    let run = RunConfig::from_config(&config);
    let checkpoint_path = PathBuf::from(&config.output.checkpoint_path);

    let mut storage =
        open_storage(&checkpoint_path).context("failed to open checkpoint database")?;

    if fresh {
        tracing::info!("Starting fresh crawl (discarding previous state)");
        storage.clear().context("failed to clear checkpoint")?;
    }

    let store = match storage
        .load_snapshot()
        .context("failed to load checkpoint")?
    {
        Some(snapshot) => {
            let known = snapshot.records.len();
            let unfinished = snapshot.unfinished();
            let store = FrontierStore::from_snapshot(snapshot);
            if store.is_resumable() {
                tracing::info!(
                    "Resuming from checkpoint: {} known URLs, {} unfinished",
                    known,
                    unfinished
                );
            } else {
                tracing::info!(
                    "Checkpoint holds a finished crawl of {} URLs; only new seeds will be fetched (use --fresh to start over)",
                    known
                );
            }
            store
        }
        None => FrontierStore::new(),
    };

    let mut added = 0usize;
    for seed in &seeds {
        match normalize_url(seed) {
            Ok(url) => {
                if store.enqueue(url.as_str(), 0, None) {
                    added += 1;
                }
            }
            Err(e) => tracing::warn!("Skipping seed {}: {}", seed, e),
        }
    }
    tracing::info!("Seeds: {} configured, {} new", seeds.len(), added);

    let client = build_http_client(&config.user_agent).context("failed to build HTTP client")?;
    let artifacts = FsArtifactStore::open(&config.output.artifact_dir)
        .await
        .context("artifact directory unusable")?;

    let mut checkpointer = Checkpointer::new(storage);
    let run_id = checkpointer
        .begin_run(&config_hash)
        .await
        .context("failed to record run")?;
    tracing::info!("Run {} started", run_id);

    let mut dispatcher = Dispatcher::new(
        run,
        store,
        Arc::new(LocalFetcher::new(client.clone())),
        Arc::new(artifacts),
    )
    .with_classifier(Arc::new(PhraseClassifier::new(
        &config.escalation.trigger_phrases,
    )))
    .with_checkpointer(checkpointer);

    if let Some(remote) = &config.remote {
        let endpoint = Url::parse(&remote.endpoint)
            .with_context(|| format!("invalid remote endpoint {}", remote.endpoint))?;
        let api_key = remote
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        if remote.api_key_env.is_some() && api_key.is_none() {
            tracing::warn!("Remote API key variable is not set, sending requests without it");
        }
        dispatcher = dispatcher.with_remote(Arc::new(RemoteFetcher::new(client, endpoint, api_key)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight work");
            let _ = shutdown_tx.send(true);
        }
    });

    let outcome = dispatcher.run(shutdown_rx).await.context("crawl failed")?;

    let records = dispatcher.store().records();
    let mut summary = CrawlSummary::from_records(&records);
    match open_storage(&checkpoint_path).and_then(|storage| storage.get_run(run_id)) {
        Ok(record) => summary = summary.with_run(record),
        Err(e) => tracing::warn!("Could not read run metadata: {}", e),
    }

    print_statistics(&summary);
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))
        .context("failed to write markdown summary")?;
    tracing::info!("Summary written to {}", config.output.summary_path);

    let results_path = config.output.results_path();
    export_results_csv(&records, &results_path).context("failed to write results CSV")?;
    tracing::info!("Results written to {}", results_path.display());

    Ok(match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Interrupted => ExitCode::from(130),
    })
}

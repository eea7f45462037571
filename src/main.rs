//! Sitedown main entry point
//!
//! This is the command-line interface for the Sitedown website exporter.

use anyhow::Context;
use clap::Parser;
use sitedown::config::{load_config_with_hash, Config};
use sitedown::crawler::{Coordinator, Outcome, Phase, ProgressEvent};
use sitedown::{start_session, SessionSummary};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Sitedown: export a website into Markdown
///
/// Sitedown crawls a site politely, keeps only the main content of every page,
/// and writes it as a tree of Markdown files. Re-runs only rewrite what changed.
#[derive(Parser, Debug)]
#[command(name = "sitedown")]
#[command(version)]
#[command(about = "Export a website into a tree of Markdown files", long_about = None)]
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

    /// List the URLs the export would start with, without fetching pages
    #[arg(long)]
    dry_run: bool,

    /// Ignore stored validators and refetch every page
    #[arg(long)]
    force: bool,

    /// Do not enforce robots.txt (only for sites you control)
    #[arg(long)]
    ignore_robots: bool,

    /// Override the output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    apply_overrides(&mut config, &cli);

    if cli.dry_run {
        handle_dry_run(&config).await
    } else {
        handle_export(config, cli.quiet).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitedown=info,warn"),
            1 => EnvFilter::new("sitedown=debug,info"),
            2 => EnvFilter::new("sitedown=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.force {
        config.incremental.force_refetch = true;
    }
    if cli.ignore_robots {
        tracing::warn!("robots.txt enforcement disabled by --ignore-robots");
        config.robots.ignore_robots = true;
    }
    if let Some(output) = &cli.output {
        config.output.directory = output.clone();
    }
}

/// Handles the --dry-run mode: shows what the export would start with
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Sitedown Dry Run ===\n");
    println!("Output: {}", config.output.directory.display());
    println!(
        "Limits: depth {}, {} page(s), {} worker(s), {} per host",
        config.crawler.max_depth,
        config.crawler.max_pages,
        config.crawler.concurrency,
        config.crawler.per_host_concurrency
    );

    let urls = Coordinator::dry_run(config).await?;
    println!("\nInitial queue ({}):", urls.len());
    for url in &urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main export operation
async fn handle_export(config: Config, quiet: bool) -> anyhow::Result<()> {
    let mut handle = start_session(config).context("Failed to start export session")?;
    tracing::info!("Session {} started", handle.session_id());

    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing in-flight pages...");
            canceller.cancel();
        }
    });

    let events = handle.events();
    let printer = tokio::spawn(print_events(events, quiet));

    let result = handle.wait().await;
    let _ = printer.await;

    let summary = result.context("Export session failed")?;
    if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<ProgressEvent>, quiet: bool) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if !quiet {
                    print_event(&event);
                }
                if matches!(event.phase, Phase::Complete | Phase::Failed) {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress display skipped {} event(s)", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &ProgressEvent) {
    let url = event.url.as_deref().unwrap_or("");
    match &event.outcome {
        Outcome::Queued(count) => println!("Queued {} URL(s)", count),
        Outcome::Exported => println!("  exported      {}", url),
        Outcome::Unchanged => println!("  unchanged     {}", url),
        Outcome::NotModified => println!("  not modified  {}", url),
        Outcome::Alias => println!("  alias         {}", url),
        Outcome::RobotsDenied => println!("  robots denied {}", url),
        Outcome::Failed(reason) => println!("  failed        {} ({})", url, reason.code()),
        Outcome::SessionFinished(termination) => {
            println!("Session {}", termination.as_str())
        }
    }
}

fn print_summary(summary: &SessionSummary) {
    let c = &summary.counters;
    println!("\n=== Export Summary ===\n");
    println!("Session:       {}", summary.session_id);
    println!("Termination:   {}", summary.termination.as_str());
    println!("Duration:      {:.1}s", summary.duration_secs);
    println!("Exported:      {}", c.exported);
    println!("Unchanged:     {}", summary.cached());
    println!("Aliased:       {}", c.aliased);
    println!("Robots denied: {}", c.robots_denied);
    println!("Failed:        {}", c.failed);
    println!("Assets stored: {}", c.assets_stored);
    println!("Success rate:  {:.1}%", summary.success_rate());

    if summary.has_failures() {
        println!("\nFailures:");
        for failure in &summary.failures {
            println!("  - {} [{}] {}", failure.url, failure.reason, failure.detail);
        }
    }
}

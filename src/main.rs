//! Sumi-Sieve main entry point
//!
//! This is the command-line interface for the Sumi-Sieve crawl-and-extract engine.

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use sumi_sieve::config::{load_config_with_hash, Config};
use sumi_sieve::{Engine, PageType, ScrapeOptions};
use tracing_subscriber::EnvFilter;

/// Sumi-Sieve: an adaptive crawl-and-extract engine
///
/// Sumi-Sieve fetches each URL politely, works out what kind of page it is,
/// and prints the structured content it extracted as one JSON object per line.
#[derive(Parser, Debug)]
#[command(name = "sumi-sieve")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive crawl-and-extract engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to scrape
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only classify each page, without extracting
    #[arg(long, conflicts_with_all = ["page_type", "render"])]
    classify_only: bool,

    /// Skip classification and extract as this page type
    #[arg(long, value_name = "TYPE")]
    page_type: Option<String>,

    /// Bypass the response cache
    #[arg(long)]
    no_cache: bool,

    /// Render pages before extracting (needs an engine built with a renderer)
    #[arg(long)]
    render: bool,

    /// Print engine statistics after the run
    #[arg(long)]
    stats: bool,

    /// Validate config and URLs without fetching anything
    #[arg(long, conflicts_with_all = ["classify_only", "stats"])]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        return handle_dry_run(&config, &cli.urls);
    }

    if cli.urls.is_empty() {
        anyhow::bail!("No URLs given");
    }

    let engine = Engine::builder(config).build().context("Failed to build engine")?;
    if cli.render && !engine.has_renderer() {
        anyhow::bail!("--render was given but this build has no renderer configured");
    }

    if cli.classify_only {
        handle_classify(&engine, &cli.urls).await?;
    } else {
        handle_scrape(&engine, &cli).await?;
    }

    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sieve=info,warn"),
            1 => EnvFilter::new("sumi_sieve=debug,info"),
            2 => EnvFilter::new("sumi_sieve=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Results go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and URLs
fn handle_dry_run(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    sumi_sieve::config::validate(config)?;

    println!("=== Sumi-Sieve Dry Run ===\n");

    println!("Engine:");
    println!("  Workers: {}", config.engine.worker_count);
    println!("  Global limit: {}", config.engine.max_concurrency);
    println!("  Per-domain limit: {}", config.engine.per_domain_concurrency);
    println!("  Queue capacity: {}", config.engine.queue_capacity);
    println!("  Task timeout: {}ms", config.engine.task_timeout_ms);

    println!("\nPacing:");
    println!("  Target rate: {} req/s per domain", config.rate_limit.target_rate);
    println!(
        "  Delay range: {}ms - {}ms",
        config.rate_limit.min_delay_ms, config.rate_limit.max_delay_ms
    );
    println!("  Proxies: {}", config.proxy.proxies.len());

    println!("\nCache:");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  TTL: {}s", config.cache.ttl_secs);
    if let Some(directory) = &config.cache.directory {
        println!("  Directory: {}", directory);
    }

    println!("\nURLs ({}):", urls.len());
    let mut invalid = 0;
    for url in urls {
        match sumi_sieve::url::parse_target(url) {
            Ok((_, domain)) => println!("  - {} ({})", url, domain),
            Err(e) => {
                invalid += 1;
                println!("  - {} (invalid: {})", url, e);
            }
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would scrape {} URLs", urls.len() - invalid);

    Ok(())
}

/// Handles the --classify-only mode
async fn handle_classify(engine: &Engine, urls: &[String]) -> anyhow::Result<()> {
    for url in urls {
        match engine.classify_only(url).await {
            Ok(classification) => {
                let line = serde_json::json!({ "url": url, "classification": classification });
                println!("{}", line);
            }
            Err(e) => {
                tracing::warn!("Could not classify {}: {}", url, e.message);
                let line = serde_json::json!({ "url": url, "error": e });
                println!("{}", line);
            }
        }
    }
    Ok(())
}

/// Handles the main scrape operation, printing results as they complete
async fn handle_scrape(engine: &Engine, cli: &Cli) -> anyhow::Result<()> {
    let mut options = ScrapeOptions::default();
    if let Some(name) = &cli.page_type {
        options = options.with_page_type(PageType::from_name(name));
    }
    if cli.no_cache {
        options = options.without_cache();
    }
    options.render = cli.render;

    engine.start()?;
    tracing::info!("Scraping {} URLs", cli.urls.len());

    let mut failures = 0;
    {
        let mut results = engine.submit_stream(&cli.urls, options);
        while let Some(result) = results.next().await {
            if let Some(error) = &result.error {
                failures += 1;
                tracing::warn!("{} failed: {} ({})", result.url, error.message, error.kind);
            }
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    engine.stop().await;
    tracing::info!(
        "Scraped {} URLs, {} failed",
        cli.urls.len(),
        failures
    );
    Ok(())
}

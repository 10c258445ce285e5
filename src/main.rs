//! firmharvest main entry point
//!
//! This is the command-line interface for the firmware metadata harvester.

use anyhow::Context;
use clap::Parser;
use firmharvest::config::{load_config_with_hash, Config, DiscoveryStrategy};
use firmharvest::harvest::{run_harvest, HarvestOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// firmharvest: a resilient, incremental firmware metadata harvester
///
/// firmharvest walks a vendor's support site, extracts one record per
/// firmware image and keeps them in a deduplicated JSON document. Runs are
/// checkpointed and can be interrupted and resumed at any point.
#[derive(Parser, Debug)]
#[command(name = "firmharvest")]
#[command(version = "1.0.0")]
#[command(about = "A resilient, incremental firmware metadata harvester", long_about = None)]
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

    /// Run discovery again even if a work list already exists
    #[arg(long)]
    rediscover: bool,

    /// Validate config and show what would be harvested without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "rediscover"])]
    dry_run: bool,

    /// Show statistics from the record store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "rediscover"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &config_hash);
    } else if cli.stats {
        handle_stats(&config);
    } else {
        handle_harvest(&config, cli.rediscover).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("firmharvest=info,warn"),
            1 => EnvFilter::new("firmharvest=debug,info"),
            2 => EnvFilter::new("firmharvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config, config_hash: &str) {
    println!("=== firmharvest Dry Run ===\n");

    println!("Harvest:");
    println!("  Vendor: {}", config.harvest.vendor);
    println!("  Records: {}", config.harvest.records_path);
    println!("  Max concurrent items: {}", config.harvest.max_concurrent);
    println!(
        "  Identity: {}{}",
        config.harvest.identity.join(" + "),
        if config.harvest.case_insensitive_keys {
            " (ignoring case)"
        } else {
            ""
        }
    );
    if let Some(template) = &config.harvest.item_url_template {
        println!("  Item URL template: {}", template);
    }

    println!("\nFetch:");
    println!("  Format: {:?}", config.fetch.format);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Max attempts: {}", config.fetch.max_attempts);
    println!("  User agent: {}", config.fetch.user_agent);

    println!("\nCheckpoints:");
    println!(
        "  Every {} new records or {} completed items",
        config.checkpoint.every_records, config.checkpoint.every_items
    );

    println!("\nExtraction ({:?}):", config.extract.kind);
    for (name, spec) in &config.extract.fields {
        println!("  {} <- {}", name, spec);
    }
    for (name, value) in &config.extract.constants {
        println!("  {} = {:?}", name, value);
    }

    match &config.discovery {
        Some(discovery) => {
            println!("\nDiscovery:");
            println!("  Strategy: {:?}", discovery.strategy);
            println!("  URL template: {}", discovery.url_template);
            println!("  Work list: {}", discovery.work_list_path);
            match discovery.strategy {
                DiscoveryStrategy::Pages => println!(
                    "  Pages: from {} up to {}",
                    discovery.start_page, discovery.max_pages
                ),
                DiscoveryStrategy::Seeds => {
                    println!("  Seeds ({}):", discovery.seeds.len());
                    for seed in &discovery.seeds {
                        println!("    * {}", seed);
                    }
                }
            }
        }
        None => println!("\nDiscovery: none"),
    }

    println!("\nStatic Work Items ({}):", config.work.len());
    for item in &config.work {
        println!("  - {}", item.display_name());
    }

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
}

/// Handles the --stats mode: shows statistics from the record store
fn handle_stats(config: &Config) {
    use firmharvest::output::{load_statistics, print_statistics};
    use firmharvest::record::FirmwareRecord;
    use firmharvest::storage::open_store;
    use std::path::Path;

    println!("Records: {}\n", config.harvest.records_path);

    let store = open_store::<FirmwareRecord>(Path::new(&config.harvest.records_path), &config.store);
    let stats = load_statistics(&store);

    print_statistics(&stats);
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, rediscover: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Starting harvest for {} ({} static work items, discovery {})",
        config.harvest.vendor,
        config.work.len(),
        if config.discovery.is_some() { "on" } else { "off" }
    );

    let report = match run_harvest(config, HarvestOptions { rediscover }).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    report.log_summary();
    if report.interrupted {
        tracing::info!("Stopped early; run again to resume");
    } else {
        tracing::info!("Harvest completed successfully");
    }

    Ok(())
}

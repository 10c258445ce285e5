//! Harvest module for fetching and extracting firmware records
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with retry and backoff
//! - Bounded concurrent fan-out over a work list
//! - Checkpointed, deduplicated accumulation of rows
//! - Optional discovery of the work list itself

mod checkpoint;
mod coordinator;
mod discovery;
mod fetcher;
mod scheduler;
mod session;

pub use checkpoint::{CheckpointPolicy, Checkpointer};
pub use coordinator::{HarvestReport, Harvester};
pub use discovery::{sort_work_list, Discovery};
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
pub use scheduler::{run_bounded, ItemOutcome, ItemResult};
pub use session::HarvestSession;

use crate::config::Config;
use crate::dedup::{KeyIndex, KeySpec};
use crate::extract::ConfiguredExtractor;
use crate::record::{FirmwareRecord, WorkItem};
use crate::storage::open_store;
use crate::HarvestError;
use futures::FutureExt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Run-time switches that are not part of the config file
#[derive(Debug, Clone, Copy, Default)]
pub struct HarvestOptions {
    /// Run discovery even when a work list already exists
    pub rediscover: bool,
}

/// Where the harvest's work list came from
#[derive(Debug, Clone)]
pub struct WorkList {
    pub items: Vec<WorkItem>,
    /// Items taken from `[[work]]`
    pub configured: usize,
    /// Items read from or written to the work-list document
    pub discovered: usize,
    /// Report of the discovery pass, when one ran
    pub discovery: Option<HarvestReport>,
}

/// Resolves when the process receives Ctrl-C
///
/// If the signal handler cannot be installed this never resolves.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Runs a complete harvest, stopping early on Ctrl-C
///
/// This is the main entry point. It will:
/// 1. Build the HTTP client
/// 2. Load the work list, running discovery when needed
/// 3. Load the record store and seed the key index from it
/// 4. Fetch and extract every work item with bounded concurrency
/// 5. Checkpoint along the way and save once more at the end
pub async fn run_harvest(
    config: &Config,
    options: HarvestOptions,
) -> Result<HarvestReport, HarvestError> {
    run_harvest_until(config, options, shutdown_signal()).await
}

/// [`run_harvest`] with an explicit shutdown future
pub async fn run_harvest_until(
    config: &Config,
    options: HarvestOptions,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<HarvestReport, HarvestError> {
    let shutdown = shutdown.boxed().shared();

    let client = build_http_client(&config.fetch)?;
    let fetcher = HttpFetcher::from_config(client, &config.fetch);

    let work = resolve_work_list(config, options, &fetcher, shutdown.clone()).await?;
    if let Some(report) = work.discovery.as_ref().filter(|r| r.interrupted) {
        return Ok(report.clone());
    }

    tracing::info!(
        "Work list: {} items ({} configured, {} discovered)",
        work.items.len(),
        work.configured,
        work.discovered
    );

    let extractor = ConfiguredExtractor::from_config(&config.extract)?
        .with_default(FirmwareRecord::VENDOR, &config.harvest.vendor);

    let store = open_store::<FirmwareRecord>(Path::new(&config.harvest.records_path), &config.store);
    let mut session = HarvestSession::open(Box::new(store), config.harvest.key_spec());

    Harvester::new(Arc::new(fetcher), Arc::new(extractor))
        .with_concurrency(config.harvest.max_concurrent)
        .with_checkpoints(config.checkpoint.policy())
        .with_url_template(config.harvest.item_url_template.clone())
        .run_until(&mut session, work.items, shutdown)
        .await
}

/// Combines configured work items with the discovered work list
///
/// Discovery runs when the work-list document is missing or empty, or when
/// `options.rediscover` is set; otherwise the document is reused as is.
/// Discovered items are ordered by label, ignoring case, and the combined
/// list keeps only the first item per URL.
pub async fn resolve_work_list(
    config: &Config,
    options: HarvestOptions,
    fetcher: &HttpFetcher,
    shutdown: impl Future<Output = ()>,
) -> Result<WorkList, HarvestError> {
    let mut items = config.work.clone();
    let configured = items.len();
    let mut discovered = 0;
    let mut discovery_report = None;

    if let Some(discovery) = &config.discovery {
        let store = open_store::<WorkItem>(Path::new(&discovery.work_list_path), &config.store);
        let mut session = HarvestSession::open(Box::new(store), discovery.key_spec());

        if options.rediscover || session.is_empty() {
            let format = discovery.format.unwrap_or(config.fetch.format);
            let listing_fetcher = fetcher.clone().with_format(format);

            let pass = Discovery::from_config(
                discovery,
                Arc::new(listing_fetcher),
                config.checkpoint.policy(),
            )?;
            let report = pass.run_until(&mut session, shutdown).await?;
            report.log_summary();
            discovery_report = Some(report);
        } else {
            tracing::info!(
                "Reusing {} work items from {}",
                session.len(),
                session.location().display()
            );
        }

        let mut listed = session.into_records();
        sort_work_list(&mut listed);
        discovered = listed.len();
        items.extend(listed);
    }

    let mut seen = KeyIndex::new(KeySpec::new([WorkItem::URL]));
    items.retain(|item| seen.accept(item));

    Ok(WorkList {
        items,
        configured,
        discovered,
        discovery: discovery_report,
    })
}

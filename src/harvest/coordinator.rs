//! Harvest coordinator - main run loop
//!
//! This module drives one pass over a work list:
//! - Fanning work items out to the bounded scheduler
//! - Routing each result through the session's key index
//! - Triggering checkpoints on size and progress
//! - Stopping early on shutdown and always attempting a final save

use crate::dedup::Keyed;
use crate::extract::Extract;
use crate::harvest::checkpoint::{CheckpointPolicy, Checkpointer};
use crate::harvest::fetcher::Fetch;
use crate::harvest::scheduler::{run_bounded, ItemOutcome};
use crate::harvest::session::HarvestSession;
use crate::record::WorkItem;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// How often a progress line is logged, in completed items
const PROGRESS_EVERY: usize = 25;

/// Outcome of one pass over a work list
#[derive(Debug, Clone)]
pub struct HarvestReport {
    /// Which pass this was ("harvest", "discovery")
    pub phase: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Document the rows were saved to
    pub store_path: PathBuf,

    pub items_total: usize,
    pub items_completed: usize,
    /// Rows produced by extractors, duplicates included
    pub rows_found: usize,
    /// Rows that were new and got appended
    pub rows_accepted: usize,
    /// Rows in the store after the final save
    pub rows_total: usize,

    /// Items that produced zero rows, for whatever reason
    pub empty_items: Vec<String>,
    /// Items whose task panicked
    pub panicked_items: Vec<String>,

    /// Successful writes, the final save included
    pub checkpoints_written: usize,
    pub checkpoint_failures: usize,

    /// The run stopped on a shutdown signal before finishing the work list
    pub interrupted: bool,
}

impl HarvestReport {
    pub fn new(phase: &str, store_path: PathBuf, items_total: usize) -> Self {
        let now = Utc::now();
        Self {
            phase: phase.to_string(),
            started_at: now,
            finished_at: now,
            store_path,
            items_total,
            items_completed: 0,
            rows_found: 0,
            rows_accepted: 0,
            rows_total: 0,
            empty_items: Vec::new(),
            panicked_items: Vec::new(),
            checkpoints_written: 0,
            checkpoint_failures: 0,
            interrupted: false,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Logs the completion lines of a pass
    pub fn log_summary(&self) {
        let secs = self.duration().num_milliseconds() as f64 / 1000.0;

        tracing::info!(
            "{} {} in {:.1}s: {}/{} items, {} rows found, {} new, {} total in {}",
            self.phase,
            if self.interrupted { "interrupted" } else { "complete" },
            secs,
            self.items_completed,
            self.items_total,
            self.rows_found,
            self.rows_accepted,
            self.rows_total,
            self.store_path.display()
        );

        if !self.empty_items.is_empty() {
            tracing::info!(
                "{} items produced no rows: {}",
                self.empty_items.len(),
                self.empty_items.join(", ")
            );
        }
        if !self.panicked_items.is_empty() {
            tracing::warn!(
                "{} items failed unexpectedly: {}",
                self.panicked_items.len(),
                self.panicked_items.join(", ")
            );
        }
        if self.checkpoint_failures > 0 {
            tracing::warn!("{} checkpoints could not be written", self.checkpoint_failures);
        }
    }
}

/// Runs fetch, extract, dedup and checkpointing over a work list
pub struct Harvester<T> {
    phase: String,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extract<T>>,
    concurrency: usize,
    checkpoints: CheckpointPolicy,
    url_template: Option<String>,
}

impl<T> Harvester<T>
where
    T: Keyed + Clone + Send + 'static,
{
    pub fn new(fetcher: Arc<dyn Fetch>, extractor: Arc<dyn Extract<T>>) -> Self {
        Self {
            phase: "harvest".to_string(),
            fetcher,
            extractor,
            concurrency: 8,
            checkpoints: CheckpointPolicy::default(),
            url_template: None,
        }
    }

    /// Names the pass in logs and reports
    pub fn named(mut self, phase: &str) -> Self {
        self.phase = phase.to_string();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_checkpoints(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoints = policy;
        self
    }

    /// Rewrites every item's URL before it is fetched
    pub fn with_url_template(mut self, template: Option<String>) -> Self {
        self.url_template = template;
        self
    }

    /// Runs the whole work list
    pub async fn run(
        &self,
        session: &mut HarvestSession<T>,
        items: Vec<WorkItem>,
    ) -> Result<HarvestReport, HarvestError> {
        self.run_until(session, items, std::future::pending()).await
    }

    /// Runs the work list until it is exhausted or `shutdown` resolves
    ///
    /// On shutdown no further results are taken; tasks still in flight are
    /// dropped. Either way the session is saved once more, and a failure of
    /// that save is the only error this returns.
    pub async fn run_until(
        &self,
        session: &mut HarvestSession<T>,
        items: Vec<WorkItem>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<HarvestReport, HarvestError> {
        let mut report =
            HarvestReport::new(&self.phase, session.location().to_path_buf(), items.len());
        let mut checkpointer = Checkpointer::new(self.checkpoints);

        let items = match &self.url_template {
            Some(template) => items.into_iter().map(|item| item.expand(template)).collect(),
            None => items,
        };

        tracing::info!(
            "Starting {}: {} items, {} at a time, {} rows already known",
            self.phase,
            report.items_total,
            self.concurrency,
            session.len()
        );

        let mut results = Box::pin(run_bounded(
            items,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.extractor),
            self.concurrency,
        ));
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::warn!("Shutdown requested, saving progress");
                    report.interrupted = true;
                    break;
                }
                next = results.next() => next,
            };
            let Some(result) = next else {
                break;
            };

            report.items_completed += 1;
            let name = result.item.display_name().to_string();
            let mut due = false;

            match result.outcome {
                ItemOutcome::Fetched(rows) => {
                    let found = rows.len();
                    let accepted = session.absorb(rows);
                    report.rows_found += found;
                    report.rows_accepted += accepted;

                    tracing::debug!("{}: {} rows, {} new", name, found, accepted);
                    if found == 0 {
                        report.empty_items.push(name);
                    }
                    due |= checkpointer.record_accepted(accepted);
                }
                ItemOutcome::NoData => {
                    tracing::debug!("{}: no data", name);
                    report.empty_items.push(name);
                }
                ItemOutcome::Panicked => {
                    report.empty_items.push(name.clone());
                    report.panicked_items.push(name);
                }
            }

            due |= checkpointer.item_completed();
            if due {
                checkpointer.checkpoint(session).await;
            }

            if report.items_completed % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "Progress: {}/{} items, {} new rows, {} total",
                    report.items_completed,
                    report.items_total,
                    report.rows_accepted,
                    session.len()
                );
            }
        }

        // Aborts whatever is still in flight
        drop(results);

        checkpointer
            .finish(session)
            .await
            .map_err(|source| HarvestError::FinalSave {
                path: session.location().display().to_string(),
                source,
            })?;

        report.rows_total = session.len();
        report.checkpoints_written = checkpointer.writes();
        report.checkpoint_failures = checkpointer.failures();
        report.finished_at = Utc::now();
        Ok(report)
    }
}

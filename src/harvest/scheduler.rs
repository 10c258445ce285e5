//! Bounded fan-out over a work list
//!
//! Every work item runs fetch then extract in its own spawned task. At most
//! `concurrency` tasks exist at once: a task is spawned only when a slot
//! frees up, and results come back in completion order. Dropping the stream
//! aborts the tasks still running.

use crate::extract::Extract;
use crate::harvest::fetcher::Fetch;
use crate::record::WorkItem;
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};

/// A task handle that aborts the task when dropped
struct AbortOnDrop<R>(JoinHandle<R>);

impl<R> Drop for AbortOnDrop<R> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<R> Future for AbortOnDrop<R> {
    type Output = Result<R, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

/// What one work item produced
#[derive(Debug)]
pub enum ItemOutcome<T> {
    /// Content was fetched and handed to the extractor (possibly zero rows)
    Fetched(Vec<T>),
    /// The fetcher returned no content
    NoData,
    /// The task panicked; its rows are lost
    Panicked,
}

/// A finished work item and its outcome
#[derive(Debug)]
pub struct ItemResult<T> {
    pub item: WorkItem,
    pub outcome: ItemOutcome<T>,
}

impl<T> ItemResult<T> {
    /// Rows produced by the item, empty unless it was fetched
    pub fn into_rows(self) -> Vec<T> {
        match self.outcome {
            ItemOutcome::Fetched(rows) => rows,
            ItemOutcome::NoData | ItemOutcome::Panicked => Vec::new(),
        }
    }
}

/// Runs fetch+extract for every item with bounded concurrency
///
/// The returned stream yields one [`ItemResult`] per item, in the order the
/// items finish.
pub fn run_bounded<T>(
    items: Vec<WorkItem>,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extract<T>>,
    concurrency: usize,
) -> impl Stream<Item = ItemResult<T>>
where
    T: Send + 'static,
{
    stream::iter(items)
        .map(move |item| {
            let fetcher = Arc::clone(&fetcher);
            let extractor = Arc::clone(&extractor);

            async move {
                let task_item = item.clone();
                let task = AbortOnDrop(tokio::spawn(async move {
                    match fetcher.fetch(&task_item).await {
                        Some(content) => ItemOutcome::Fetched(extractor.extract(&content, &task_item)),
                        None => ItemOutcome::NoData,
                    }
                }));

                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!("Task for {} failed: {}", item.display_name(), e);
                        ItemOutcome::Panicked
                    }
                };

                ItemResult { item, outcome }
            }
        })
        .buffer_unordered(concurrency.max(1))
}

//! Periodic flushing of a session to its store
//!
//! Checkpoints are best effort: a failed write is retried once after a short
//! pause and then skipped, since the rows are still in memory and the next
//! checkpoint (or the final save) writes them again. Only the final save is
//! allowed to fail the run.

use crate::harvest::session::HarvestSession;
use crate::storage::StorageResult;
use std::time::Duration;

/// When checkpoints are due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    /// Newly accepted rows between checkpoints (0 disables)
    pub every_records: usize,
    /// Completed work items between checkpoints (0 disables)
    pub every_items: usize,
    /// Pause before the single retry of a failed checkpoint
    pub retry_delay: Duration,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            every_records: 10,
            every_items: 25,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Tracks progress since the last checkpoint and performs the writes
#[derive(Debug)]
pub struct Checkpointer {
    policy: CheckpointPolicy,
    records_since: usize,
    items_since: usize,
    writes: usize,
    failures: usize,
}

impl Checkpointer {
    pub fn new(policy: CheckpointPolicy) -> Self {
        Self {
            policy,
            records_since: 0,
            items_since: 0,
            writes: 0,
            failures: 0,
        }
    }

    /// Notes newly accepted rows; returns true once a size checkpoint is due
    pub fn record_accepted(&mut self, count: usize) -> bool {
        self.records_since += count;
        self.policy.every_records > 0 && self.records_since >= self.policy.every_records
    }

    /// Notes a completed work item; returns true once a progress checkpoint
    /// is due
    pub fn item_completed(&mut self) -> bool {
        self.items_since += 1;
        self.policy.every_items > 0 && self.items_since >= self.policy.every_items
    }

    /// Saves the session, retrying once on failure
    ///
    /// Returns whether the checkpoint was written. Both triggers start
    /// counting again either way.
    pub async fn checkpoint<T>(&mut self, session: &HarvestSession<T>) -> bool
    where
        T: Clone + Send + 'static,
    {
        self.records_since = 0;
        self.items_since = 0;

        let first = match session.save().await {
            Ok(()) => {
                self.written(session);
                return true;
            }
            Err(e) => e,
        };

        tracing::warn!(
            "Checkpoint to {} failed: {}; retrying in {:?}",
            session.location().display(),
            first,
            self.policy.retry_delay
        );
        tokio::time::sleep(self.policy.retry_delay).await;

        match session.save().await {
            Ok(()) => {
                self.written(session);
                true
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(
                    "Checkpoint to {} failed again: {}; continuing with {} rows in memory",
                    session.location().display(),
                    e,
                    session.len()
                );
                false
            }
        }
    }

    /// The unconditional final save; its error is the caller's to report
    pub async fn finish<T>(&mut self, session: &HarvestSession<T>) -> StorageResult<()>
    where
        T: Clone + Send + 'static,
    {
        session.save().await?;
        self.writes += 1;
        tracing::info!(
            "Saved {} rows to {}",
            session.len(),
            session.location().display()
        );
        Ok(())
    }

    fn written<T>(&mut self, session: &HarvestSession<T>) {
        self.writes += 1;
        tracing::info!(
            "Checkpoint: {} rows saved to {}",
            session.len(),
            session.location().display()
        );
    }

    /// Successful writes so far, the final save included
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Checkpoints skipped after their retry also failed
    pub fn failures(&self) -> usize {
        self.failures
    }
}

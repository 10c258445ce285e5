//! In-memory state of one harvest run
//!
//! A session owns the accumulated rows, the identity-key index built over
//! them, and the store they are flushed to. Rows only ever grow: everything
//! loaded at startup stays, and new rows are appended after deduplication.

use crate::dedup::{KeyIndex, KeySpec, Keyed};
use crate::storage::{RecordStore, StorageResult};
use std::path::Path;
use std::sync::Arc;

pub struct HarvestSession<T> {
    store: Arc<dyn RecordStore<T> + Send + Sync>,
    rows: Vec<T>,
    index: KeyIndex,
    loaded: usize,
}

impl<T: Keyed> HarvestSession<T> {
    /// Loads the store and seeds the key index from it
    pub fn open(store: Box<dyn RecordStore<T> + Send + Sync>, spec: KeySpec) -> Self {
        let rows = store.load();
        let index = KeyIndex::seed(&rows, spec);
        let loaded = rows.len();

        tracing::info!(
            "Loaded {} rows ({} distinct keys) from {}",
            loaded,
            index.len(),
            store.location().display()
        );

        Self {
            store: Arc::from(store),
            rows,
            index,
            loaded,
        }
    }

    /// Appends a row unless its identity key is already known
    pub fn offer(&mut self, row: T) -> bool {
        if self.index.accept(&row) {
            self.rows.push(row);
            true
        } else {
            false
        }
    }

    /// Offers every row in order and returns how many were accepted
    pub fn absorb(&mut self, rows: impl IntoIterator<Item = T>) -> usize {
        let mut accepted = 0;
        for row in rows {
            if self.offer(row) {
                accepted += 1;
            }
        }
        accepted
    }
}

impl<T: Clone + Send + 'static> HarvestSession<T> {
    /// Writes a snapshot of every row to the store
    ///
    /// The write runs on the blocking thread pool, so a slow or retried
    /// replace does not hold up in-flight fetches.
    pub async fn save(&self) -> StorageResult<()> {
        let store = Arc::clone(&self.store);
        let rows = self.rows.clone();
        tokio::task::spawn_blocking(move || store.save(&rows)).await?
    }
}

impl<T> HarvestSession<T> {
    pub fn records(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that were already in the store when the session opened
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// Rows accepted during this session
    pub fn accepted(&self) -> usize {
        self.rows.len() - self.loaded
    }

    pub fn location(&self) -> &Path {
        self.store.location()
    }

    pub fn into_records(self) -> Vec<T> {
        self.rows
    }
}

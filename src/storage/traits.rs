//! Storage traits and error types
//!
//! This module defines the trait interface for document stores and the
//! associated error type.

use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Save task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Replacing {path} failed after {attempts} attempts: {source}")]
    ReplaceExhausted {
        path: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted, ordered sequence of rows
///
/// Implementations must make `save` all-or-nothing: after a failed call the
/// previous document is still what `load` returns.
pub trait RecordStore<T> {
    /// Loads every persisted row
    ///
    /// A missing or unreadable document yields an empty sequence rather than
    /// an error.
    fn load(&self) -> Vec<T>;

    /// Replaces the persisted document with `rows`
    fn save(&self, rows: &[T]) -> StorageResult<()>;

    /// Location of the document, for logging
    fn location(&self) -> &Path;
}

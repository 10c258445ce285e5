//! Storage module for persisting harvest output
//!
//! This module handles the on-disk documents the harvester keeps:
//! - The firmware record store (one JSON array of records)
//! - The work-list document produced by discovery
//!
//! Both use the same crash-safe JSON backend.

mod json;
mod traits;

pub use json::{JsonStore, Replacer};
pub use traits::{RecordStore, StorageError, StorageResult};

use crate::config::StoreConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Opens a JSON document store using the configured replace policy
///
/// # Arguments
///
/// * `path` - Path to the JSON document
/// * `config` - Retry settings for the atomic replace step
pub fn open_store<T>(path: &Path, config: &StoreConfig) -> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    JsonStore::with_policy(path, config.retry_policy())
}

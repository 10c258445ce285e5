//! Firmharvest: a resilient incremental firmware-metadata harvester
//!
//! This crate walks vendor download sites, extracts firmware records, and
//! keeps a deduplicated JSON store on disk that survives crashes and restarts.

pub mod config;
pub mod dedup;
pub mod extract;
pub mod harvest;
pub mod output;
pub mod record;
pub mod retry;
pub mod storage;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Final save to {path} failed: {source}")]
    FinalSave {
        path: String,
        #[source]
        source: storage::StorageError,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use dedup::{IdentityKey, KeyIndex, KeySpec};
pub use harvest::{HarvestReport, HarvestSession, Harvester};
pub use record::{FirmwareRecord, WorkItem};
pub use storage::{JsonStore, RecordStore};

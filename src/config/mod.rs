//! Configuration module for firmharvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use firmharvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("zyxel.toml")).unwrap();
//! println!("Harvesting {} with {} workers", config.harvest.vendor, config.harvest.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CheckpointConfig, Config, DiscoveryConfig, DiscoveryStrategy, ExtractConfig, ExtractKind,
    FetchConfig, FilterConfig, HarvestConfig, ResponseFormat, StoreConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

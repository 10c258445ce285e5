//! Output module for reporting on harvest results
//!
//! This module handles:
//! - Summarizing the contents of a record store
//! - Printing those summaries for `--stats`

pub mod stats;

pub use stats::{compute_statistics, load_statistics, print_statistics, RecordStatistics};

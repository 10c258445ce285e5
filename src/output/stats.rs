//! Statistics over a firmware record store
//!
//! This module provides functionality for summarizing and displaying the
//! contents of a record store without touching the network.

use crate::dedup::Keyed;
use crate::record::FirmwareRecord;
use crate::storage::RecordStore;
use std::collections::{BTreeMap, HashSet};

/// Record store summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStatistics {
    /// Total number of records
    pub total_records: usize,

    /// Number of distinct models, ignoring case
    pub distinct_models: usize,

    /// Record count per vendor (records without a vendor under "unknown")
    pub records_by_vendor: BTreeMap<String, usize>,

    /// Records with no version
    pub missing_version: usize,

    /// Records with no release date
    pub missing_release_date: usize,
}

/// Summarizes a sequence of records
pub fn compute_statistics(records: &[FirmwareRecord]) -> RecordStatistics {
    let mut models = HashSet::new();
    let mut stats = RecordStatistics {
        total_records: records.len(),
        ..RecordStatistics::default()
    };

    for record in records {
        if let Some(model) = record.field(FirmwareRecord::MODEL) {
            models.insert(model.trim().to_lowercase());
        }

        let vendor = record
            .vendor
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("unknown");
        *stats.records_by_vendor.entry(vendor.to_string()).or_insert(0) += 1;

        if record.field(FirmwareRecord::VERSION).is_none() {
            stats.missing_version += 1;
        }
        if record.field(FirmwareRecord::RELEASE_DATE).is_none() {
            stats.missing_release_date += 1;
        }
    }

    stats.distinct_models = models.len();
    stats
}

/// Loads a store and summarizes it
pub fn load_statistics(store: &dyn RecordStore<FirmwareRecord>) -> RecordStatistics {
    compute_statistics(&store.load())
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RecordStatistics) {
    println!("=== Firmware Record Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Distinct models: {}", stats.distinct_models);
    println!();

    println!("Records by Vendor:");
    let mut vendors: Vec<_> = stats.records_by_vendor.iter().collect();
    vendors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (vendor, count) in vendors {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", vendor, count, percentage);
    }
    println!();

    println!("Completeness:");
    println!("  Missing version: {}", stats.missing_version);
    println!("  Missing release date: {}", stats.missing_release_date);
}

use crate::dedup::KeySpec;
use crate::harvest::CheckpointPolicy;
use crate::record::WorkItem;
use crate::retry::{Backoff, RetryPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for a vendor harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub extract: ExtractConfig,
    #[serde(default)]
    pub discovery: Option<DiscoveryConfig>,
    /// Static work items, harvested in addition to anything discovered
    #[serde(default)]
    pub work: Vec<WorkItem>,
}

/// What to harvest and where the results go
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Vendor name, used in logs and as the default `Vendor` field
    pub vendor: String,

    /// Path to the JSON record store
    #[serde(rename = "records-path")]
    pub records_path: String,

    /// Maximum number of work items fetched at once
    #[serde(rename = "max-concurrent", default = "default_harvest_concurrency")]
    pub max_concurrent: usize,

    /// Record fields forming the identity key
    #[serde(default = "default_record_identity")]
    pub identity: Vec<String>,

    /// Compare identity keys ignoring case
    #[serde(rename = "case-insensitive-keys", default)]
    pub case_insensitive_keys: bool,

    /// Rewrites each work item's URL before fetching (`{url}`, `{label}`, `{seed}`)
    #[serde(rename = "item-url-template", default)]
    pub item_url_template: Option<String>,
}

impl HarvestConfig {
    pub fn key_spec(&self) -> KeySpec {
        KeySpec::new(self.identity.iter().cloned()).case_insensitive(self.case_insensitive_keys)
    }
}

/// How fetched bodies are handed to the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// HTTP request behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-attempt request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Attempts per request before the item is given up on
    #[serde(rename = "max-attempts", default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// Backoff after attempt `n` is `unit * base^n`
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: f64,

    #[serde(rename = "backoff-unit-ms", default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Upper bound on a single backoff pause (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub format: ResponseFormat,

    /// Lower bound of the random pause before each request (milliseconds)
    #[serde(rename = "politeness-min-ms", default)]
    pub politeness_min_ms: Option<u64>,

    /// Upper bound of the random pause before each request (milliseconds)
    #[serde(rename = "politeness-max-ms", default)]
    pub politeness_max_ms: Option<u64>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Power {
                base: self.backoff_base,
                unit: Duration::from_millis(self.backoff_unit_ms),
                cap: Duration::from_millis(self.backoff_cap_ms),
            },
        )
    }

    /// Range of the random pause before each request, if configured
    pub fn politeness(&self) -> Option<(Duration, Duration)> {
        match (self.politeness_min_ms, self.politeness_max_ms) {
            (None, None) => None,
            (min, max) => {
                let min = min.unwrap_or(0);
                let max = max.unwrap_or(min).max(min);
                Some((Duration::from_millis(min), Duration::from_millis(max)))
            }
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_attempts: default_fetch_attempts(),
            backoff_base: default_backoff_base(),
            backoff_unit_ms: default_backoff_unit_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            user_agent: default_user_agent(),
            format: ResponseFormat::default(),
            politeness_min_ms: None,
            politeness_max_ms: None,
            headers: BTreeMap::new(),
        }
    }
}

/// When progress is flushed to disk during a run
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    /// Save after this many newly accepted rows (0 disables)
    #[serde(rename = "every-records", default = "default_every_records")]
    pub every_records: usize,

    /// Save after this many completed work items (0 disables)
    #[serde(rename = "every-items", default = "default_every_items")]
    pub every_items: usize,

    /// Pause before retrying a failed checkpoint (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_checkpoint_retry_ms")]
    pub retry_delay_ms: u64,
}

impl CheckpointConfig {
    pub fn policy(&self) -> CheckpointPolicy {
        CheckpointPolicy {
            every_records: self.every_records,
            every_items: self.every_items,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            every_records: default_every_records(),
            every_items: default_every_items(),
            retry_delay_ms: default_checkpoint_retry_ms(),
        }
    }
}

/// Retry settings for the store's atomic replace step
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(rename = "max-attempts", default = "default_store_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-backoff-ms", default = "default_store_initial_ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms", default = "default_store_max_ms")]
    pub max_backoff_ms: u64,

    #[serde(rename = "jitter-ms", default = "default_store_jitter_ms")]
    pub jitter_ms: u64,
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Backoff::Doubling {
                initial: Duration::from_millis(self.initial_backoff_ms),
                cap: Duration::from_millis(self.max_backoff_ms),
            },
        )
        .with_jitter(Duration::from_millis(self.jitter_ms))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_store_attempts(),
            initial_backoff_ms: default_store_initial_ms(),
            max_backoff_ms: default_store_max_ms(),
            jitter_ms: default_store_jitter_ms(),
        }
    }
}

/// Which parser the extractor uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractKind {
    Html,
    Json,
}

/// Field mapping from fetched content to rows
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    pub kind: ExtractKind,

    /// CSS selector matching one element per row (HTML)
    #[serde(default)]
    pub row: Option<String>,

    /// JSON pointer to the array of rows (JSON); empty means the document root
    #[serde(default)]
    pub items: Option<String>,

    /// Field name -> selector (`css`, `css@attr`, `@attr`) or JSON pointer
    pub fields: BTreeMap<String, String>,

    /// Fields set to a fixed value on every row
    #[serde(default)]
    pub constants: BTreeMap<String, String>,

    /// Fields a row must have to be kept
    #[serde(default)]
    pub required: Vec<String>,

    /// Fields holding links, resolved against the page URL
    #[serde(rename = "url-fields", default = "default_url_fields")]
    pub url_fields: Vec<String>,

    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

/// Screening of download links
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Accepted host names; subdomains match too
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Accepted file extensions, without the leading dot
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Substrings that reject a row when found in its link or title
    #[serde(default)]
    pub deny: Vec<String>,
}

/// How the work list is enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStrategy {
    /// Walk numbered listing pages
    Pages,
    /// Fan out search queries
    Seeds,
}

/// Discovery pass producing the work list
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub strategy: DiscoveryStrategy,

    /// URL with a `{page}` or `{seed}` placeholder
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// JSON request body with the same placeholders; listing pages are
    /// fetched with POST when set
    #[serde(rename = "body-template", default)]
    pub body_template: Option<String>,

    /// Path to the work-list document
    #[serde(rename = "work-list-path")]
    pub work_list_path: String,

    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Hard ceiling on listing pages fetched
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Stop after this many consecutive pages without items
    #[serde(rename = "empty-page-limit", default = "default_empty_page_limit")]
    pub empty_page_limit: u32,

    /// Stop at the first page that adds nothing new
    #[serde(rename = "stop-on-no-new", default)]
    pub stop_on_no_new: bool,

    #[serde(default)]
    pub seeds: Vec<String>,

    /// Seeds shorter than this are skipped
    #[serde(rename = "min-seed-len", default = "default_min_seed_len")]
    pub min_seed_len: usize,

    #[serde(rename = "max-concurrent", default = "default_discovery_concurrency")]
    pub max_concurrent: usize,

    /// Work-item fields forming the identity key
    #[serde(default = "default_work_identity")]
    pub identity: Vec<String>,

    #[serde(rename = "case-insensitive-keys", default)]
    pub case_insensitive_keys: bool,

    /// Overrides `[fetch].format` for listing pages
    #[serde(default)]
    pub format: Option<ResponseFormat>,

    pub extract: ExtractConfig,
}

impl DiscoveryConfig {
    pub fn key_spec(&self) -> KeySpec {
        KeySpec::new(self.identity.iter().cloned()).case_insensitive(self.case_insensitive_keys)
    }
}

fn default_harvest_concurrency() -> usize {
    8
}

fn default_discovery_concurrency() -> usize {
    10
}

fn default_record_identity() -> Vec<String> {
    vec!["Model".to_string(), "Download".to_string()]
}

fn default_work_identity() -> Vec<String> {
    vec!["url".to_string()]
}

fn default_url_fields() -> Vec<String> {
    vec![
        "url".to_string(),
        "Download".to_string(),
        "ReleaseNotes".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_fetch_attempts() -> u32 {
    4
}

fn default_backoff_base() -> f64 {
    1.6
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36".to_string()
}

fn default_every_records() -> usize {
    10
}

fn default_every_items() -> usize {
    25
}

fn default_checkpoint_retry_ms() -> u64 {
    200
}

fn default_store_attempts() -> u32 {
    12
}

fn default_store_initial_ms() -> u64 {
    50
}

fn default_store_max_ms() -> u64 {
    2000
}

fn default_store_jitter_ms() -> u64 {
    50
}

fn default_start_page() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    50
}

fn default_empty_page_limit() -> u32 {
    5
}

fn default_min_seed_len() -> usize {
    3
}

//! Enumerating the work list before a harvest
//!
//! Two strategies are supported:
//! - **Pages**: walk a numbered listing until it runs dry
//! - **Seeds**: fan out one search query per seed string
//!
//! Discovered items land in their own session, so the work-list document
//! gets the same dedup and crash-safe checkpointing as the record store.

use crate::config::{DiscoveryConfig, DiscoveryStrategy};
use crate::extract::{ConfiguredExtractor, Extract};
use crate::harvest::checkpoint::{CheckpointPolicy, Checkpointer};
use crate::harvest::coordinator::{HarvestReport, Harvester};
use crate::harvest::fetcher::Fetch;
use crate::harvest::session::HarvestSession;
use crate::record::WorkItem;
use crate::{ConfigResult, HarvestError};
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A configured discovery pass
pub struct Discovery {
    config: DiscoveryConfig,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extract<WorkItem>>,
    checkpoints: CheckpointPolicy,
}

impl Discovery {
    pub fn new(
        config: DiscoveryConfig,
        fetcher: Arc<dyn Fetch>,
        extractor: Arc<dyn Extract<WorkItem>>,
        checkpoints: CheckpointPolicy,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            checkpoints,
        }
    }

    /// Builds the pass with the extractor from `[discovery.extract]`
    pub fn from_config(
        config: &DiscoveryConfig,
        fetcher: Arc<dyn Fetch>,
        checkpoints: CheckpointPolicy,
    ) -> ConfigResult<Self> {
        let extractor = ConfiguredExtractor::from_config(&config.extract)?;
        Ok(Self::new(
            config.clone(),
            fetcher,
            Arc::new(extractor),
            checkpoints,
        ))
    }

    /// Runs the configured strategy until done or until `shutdown` resolves
    pub async fn run_until(
        &self,
        session: &mut HarvestSession<WorkItem>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<HarvestReport, HarvestError> {
        match self.config.strategy {
            DiscoveryStrategy::Pages => self.walk_pages(session, shutdown).await,
            DiscoveryStrategy::Seeds => {
                Harvester::new(Arc::clone(&self.fetcher), Arc::clone(&self.extractor))
                    .named("discovery")
                    .with_concurrency(self.config.max_concurrent)
                    .with_checkpoints(self.checkpoints)
                    .run_until(session, self.seed_items(), shutdown)
                    .await
            }
        }
    }

    /// One query per usable seed; short and repeated seeds are skipped
    pub fn seed_items(&self) -> Vec<WorkItem> {
        let mut seen = std::collections::HashSet::new();

        self.config
            .seeds
            .iter()
            .map(|seed| seed.trim())
            .filter(|seed| seed.chars().count() >= self.config.min_seed_len)
            .filter(|seed| seen.insert(seed.to_lowercase()))
            .map(|seed| {
                let item = WorkItem::new(String::new())
                    .with_label(seed)
                    .with_seed(seed)
                    .expand(&self.config.url_template);
                match self.body("{seed}", &json_escape(seed)) {
                    Some(body) => item.with_body(body),
                    None => item,
                }
            })
            .collect()
    }

    /// The request for one listing page
    pub fn page_item(&self, page: u32) -> WorkItem {
        let number = page.to_string();
        let item = WorkItem::new(self.config.url_template.replace("{page}", &number))
            .with_label(format!("page {}", page));

        match self.body("{page}", &number) {
            Some(body) => item.with_body(body),
            None => item,
        }
    }

    fn body(&self, placeholder: &str, value: &str) -> Option<Value> {
        let template = self.config.body_template.as_deref()?;
        match serde_json::from_str(&template.replace(placeholder, value)) {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!("Request body for {} is not JSON: {}", value, e);
                None
            }
        }
    }

    /// Walks listing pages in order until one of the stop conditions holds
    ///
    /// - `empty-page-limit` consecutive pages without items
    /// - a page adds nothing new while `stop-on-no-new` is set
    /// - `max-pages` pages fetched
    async fn walk_pages(
        &self,
        session: &mut HarvestSession<WorkItem>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<HarvestReport, HarvestError> {
        let config = &self.config;
        let mut report = HarvestReport::new(
            "discovery",
            session.location().to_path_buf(),
            config.max_pages as usize,
        );
        let mut checkpointer = Checkpointer::new(self.checkpoints);
        let mut empty_streak = 0;

        tracing::info!(
            "Discovering work items from up to {} pages of {}",
            config.max_pages,
            config.url_template
        );

        tokio::pin!(shutdown);

        for page in config.start_page..config.start_page.saturating_add(config.max_pages) {
            let item = self.page_item(page);

            let content = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::warn!("Shutdown requested, saving discovered items");
                    report.interrupted = true;
                    break;
                }
                content = self.fetcher.fetch(&item) => content,
            };

            report.items_completed += 1;
            let rows = content
                .map(|content| self.extractor.extract(&content, &item))
                .unwrap_or_default();

            if rows.is_empty() {
                report.empty_items.push(item.display_name().to_string());
                empty_streak += 1;
                if empty_streak >= config.empty_page_limit {
                    tracing::info!("{} empty pages in a row, stopping at page {}", empty_streak, page);
                    break;
                }
                continue;
            }
            empty_streak = 0;

            let found = rows.len();
            let added = session.absorb(rows);
            report.rows_found += found;
            report.rows_accepted += added;
            tracing::info!("Page {}: {} items, {} new ({} total)", page, found, added, session.len());

            if added > 0 {
                checkpointer.checkpoint(session).await;
            } else if config.stop_on_no_new {
                tracing::info!("Page {} added nothing new, stopping", page);
                break;
            }
        }

        checkpointer
            .finish(session)
            .await
            .map_err(|source| HarvestError::FinalSave {
                path: session.location().display().to_string(),
                source,
            })?;

        report.rows_total = session.len();
        report.checkpoints_written = checkpointer.writes();
        report.checkpoint_failures = checkpointer.failures();
        report.finished_at = Utc::now();
        Ok(report)
    }
}

/// Escapes a string for use inside a JSON string literal
fn json_escape(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Orders a work list by label (or URL), ignoring case
pub fn sort_work_list(items: &mut [WorkItem]) {
    items.sort_by_cached_key(|item| item.display_name().to_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::KeySpec;
    use crate::extract::Content;
    use crate::storage::{JsonStore, RecordStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves canned JSON per URL and remembers what was asked for
    #[derive(Default)]
    struct CannedFetcher {
        pages: HashMap<String, Value>,
        requested: Mutex<Vec<String>>,
    }

    impl CannedFetcher {
        fn with(mut self, url: &str, body: Value) -> Self {
            self.pages.insert(url.to_string(), body);
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for CannedFetcher {
        async fn fetch(&self, item: &WorkItem) -> Option<Content> {
            self.requested.lock().unwrap().push(item.url.clone());
            self.pages.get(&item.url).cloned().map(Content::Json)
        }
    }

    fn discovery_config(extra: &str) -> DiscoveryConfig {
        let text = format!(
            r#"
strategy = "pages"
url-template = "https://vendor.test/products?page={{page}}"
work-list-path = "unused.json"
{}

[extract]
kind = "json"
items = "/products"

[extract.fields]
url = "/link"
label = "/name"
"#,
            extra
        );
        toml::from_str(&text).unwrap()
    }

    fn products(names: &[&str]) -> Value {
        let rows: Vec<Value> = names
            .iter()
            .map(|n| json!({"name": n, "link": format!("https://vendor.test/p/{}", n)}))
            .collect();
        json!({ "products": rows })
    }

    fn page_url(n: u32) -> String {
        format!("https://vendor.test/products?page={}", n)
    }

    fn session(dir: &TempDir) -> HarvestSession<WorkItem> {
        let store = JsonStore::new(dir.path().join("work.json"));
        HarvestSession::open(Box::new(store), KeySpec::new(["url"]))
    }

    fn quick() -> CheckpointPolicy {
        CheckpointPolicy {
            retry_delay: Duration::from_millis(1),
            ..CheckpointPolicy::default()
        }
    }

    async fn run(config: DiscoveryConfig, fetcher: Arc<CannedFetcher>, dir: &TempDir) -> HarvestReport {
        let discovery = Discovery::from_config(&config, fetcher, quick()).unwrap();
        let mut session = session(dir);
        discovery
            .run_until(&mut session, std::future::pending())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pages_stop_after_empty_streak() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with(&page_url(1), products(&["NAS326", "NAS542"]))
                .with(&page_url(2), products(&["NAS542", "GS1900"]))
                .with(&page_url(3), products(&[]))
                .with(&page_url(5), products(&["NEVER"])),
        );

        let config = discovery_config("empty-page-limit = 2");
        let report = run(config, fetcher.clone(), &dir).await;

        // Page 3 is empty and page 4 has no data at all
        assert_eq!(fetcher.requested().len(), 4);
        assert_eq!(report.rows_accepted, 3);
        assert_eq!(report.rows_total, 3);
        assert!(report.checkpoints_written >= 2);

        let stored = JsonStore::<WorkItem>::new(dir.path().join("work.json")).load();
        let labels: Vec<_> = stored.iter().filter_map(|i| i.label.as_deref()).collect();
        assert_eq!(labels, vec!["NAS326", "NAS542", "GS1900"]);
    }

    #[tokio::test]
    async fn test_pages_stop_on_no_new() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with(&page_url(1), products(&["A", "B"]))
                .with(&page_url(2), products(&["B", "A"]))
                .with(&page_url(3), products(&["C"])),
        );

        let report = run(discovery_config("stop-on-no-new = true"), fetcher.clone(), &dir).await;

        assert_eq!(fetcher.requested().len(), 2);
        assert_eq!(report.rows_total, 2);
    }

    #[tokio::test]
    async fn test_pages_respect_max_pages() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = CannedFetcher::default();
        for n in 1..=10 {
            fetcher = fetcher.with(&page_url(n), products(&[format!("M{}", n).as_str()]));
        }
        let fetcher = Arc::new(fetcher);

        let report = run(
            discovery_config("start-page = 2\nmax-pages = 3"),
            fetcher.clone(),
            &dir,
        )
        .await;

        assert_eq!(
            fetcher.requested(),
            vec![page_url(2), page_url(3), page_url(4)]
        );
        assert_eq!(report.rows_total, 3);
    }

    #[tokio::test]
    async fn test_seeds_fan_out() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with(
                    "https://vendor.test/search?q=nas",
                    products(&["NAS326", "NAS542"]),
                )
                .with(
                    "https://vendor.test/search?q=gs+1900",
                    products(&["GS1900-8", "NAS326"]),
                ),
        );

        let config = discovery_config(
            "seeds = [\"ab\", \"nas\", \"NAS\", \"gs 1900\"]\nmax-concurrent = 2",
        );
        let config = DiscoveryConfig {
            strategy: DiscoveryStrategy::Seeds,
            url_template: "https://vendor.test/search?q={seed}".to_string(),
            ..config
        };

        let report = run(config, fetcher.clone(), &dir).await;

        let mut requested = fetcher.requested();
        requested.sort();
        assert_eq!(
            requested,
            vec![
                "https://vendor.test/search?q=gs+1900".to_string(),
                "https://vendor.test/search?q=nas".to_string(),
            ]
        );
        assert_eq!(report.rows_total, 3);
        assert_eq!(report.phase, "discovery");
    }

    #[test]
    fn test_page_item_with_body_template() {
        let mut config = discovery_config("");
        config.body_template = Some(r#"{"page": {page}, "pageSize": 50}"#.to_string());

        let discovery = Discovery::from_config(&config, Arc::new(CannedFetcher::default()), quick()).unwrap();
        let item = discovery.page_item(7);

        assert_eq!(item.url, page_url(7));
        assert_eq!(item.body, Some(json!({"page": 7, "pageSize": 50})));
        assert_eq!(item.label.as_deref(), Some("page 7"));
    }

    #[test]
    fn test_seed_body_is_escaped() {
        let mut config = discovery_config("seeds = [\"say \\\"hi\\\"\"]");
        config.strategy = DiscoveryStrategy::Seeds;
        config.url_template = "https://vendor.test/search".to_string();
        config.body_template = Some(r#"{"query": "{seed}"}"#.to_string());

        let discovery = Discovery::from_config(&config, Arc::new(CannedFetcher::default()), quick()).unwrap();
        let items = discovery.seed_items();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body, Some(json!({"query": "say \"hi\""})));
    }

    #[test]
    fn test_sort_work_list() {
        let mut items = vec![
            WorkItem::new("https://x/3").with_label("nas542"),
            WorkItem::new("https://x/1").with_label("GS1900"),
            WorkItem::new("https://x/2").with_label("NAS326"),
        ];
        sort_work_list(&mut items);

        let labels: Vec<_> = items.iter().map(WorkItem::display_name).collect();
        assert_eq!(labels, vec!["GS1900", "NAS326", "nas542"]);
    }
}

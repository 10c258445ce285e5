//! Turning fetched content into rows
//!
//! Extraction never fails: malformed or unexpected content yields no rows.
//! The generic [`ConfiguredExtractor`] maps content to named fields according
//! to an `[extract]` config section, then builds either firmware records or
//! work items from those fields.

mod filter;
mod html;
mod json;

pub use filter::DownloadFilter;
pub use html::HtmlExtractor;
pub use json::JsonExtractor;

use crate::config::{ExtractConfig, ExtractKind};
use crate::dedup::Keyed;
use crate::record::{Fields, FromFields, WorkItem};
use crate::ConfigResult;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// Raw content of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Json(Value),
}

/// Produces candidate rows from fetched content
///
/// Implementations are pure: the same content and work item always give the
/// same rows.
pub trait Extract<T>: Send + Sync {
    fn extract(&self, content: &Content, item: &WorkItem) -> Vec<T>;
}

impl<T, F> Extract<T> for F
where
    F: Fn(&Content, &WorkItem) -> Vec<T> + Send + Sync,
{
    fn extract(&self, content: &Content, item: &WorkItem) -> Vec<T> {
        self(content, item)
    }
}

#[derive(Debug, Clone)]
enum RowSource {
    Html(HtmlExtractor),
    Json(JsonExtractor),
}

/// Config-driven extractor for HTML pages and JSON APIs
///
/// Besides selectors and pointers, a field spec of the form `$name` copies a
/// field of the originating work item (for example `Model = "$label"`).
#[derive(Debug, Clone)]
pub struct ConfiguredExtractor {
    source: RowSource,
    item_fields: Vec<(String, String)>,
    constants: BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
    required: Vec<String>,
    url_fields: Vec<String>,
    filter: Option<DownloadFilter>,
}

impl ConfiguredExtractor {
    /// Compiles an `[extract]` section
    pub fn from_config(config: &ExtractConfig) -> ConfigResult<Self> {
        let (item_fields, content_fields): (BTreeMap<_, _>, BTreeMap<_, _>) = config
            .fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .partition(|(_, spec)| is_item_ref(spec));

        let source = match config.kind {
            ExtractKind::Html => {
                let row = config.row.as_deref().unwrap_or("body");
                RowSource::Html(HtmlExtractor::new(row, &content_fields)?)
            }
            ExtractKind::Json => {
                RowSource::Json(JsonExtractor::new(config.items.as_deref(), &content_fields))
            }
        };

        Ok(Self {
            source,
            item_fields: item_fields
                .into_iter()
                .map(|(name, spec)| (name, spec.trim_start_matches('$').to_string()))
                .collect(),
            constants: config.constants.clone(),
            defaults: BTreeMap::new(),
            required: config.required.clone(),
            url_fields: config.url_fields.clone(),
            filter: config.filter.as_ref().map(DownloadFilter::from_config),
        })
    }

    /// Fills a field on rows where no field spec or constant set it
    pub fn with_default(mut self, name: &str, value: &str) -> Self {
        self.defaults.insert(name.to_string(), value.to_string());
        self
    }

    /// Field maps of every row that survives the required-field check and
    /// the download filter
    pub fn fields(&self, content: &Content, item: &WorkItem) -> Vec<Fields> {
        let rows = match (&self.source, content) {
            (RowSource::Html(html), Content::Text(text)) => html.rows(text),
            (RowSource::Html(html), Content::Json(Value::String(text))) => html.rows(text),
            (RowSource::Json(json), Content::Json(doc)) => json.rows(doc),
            (RowSource::Json(json), Content::Text(text)) => match serde_json::from_str(text) {
                Ok(doc) => json.rows(&doc),
                Err(e) => {
                    tracing::debug!("{}: body is not JSON ({})", item.display_name(), e);
                    Vec::new()
                }
            },
            (RowSource::Html(_), Content::Json(_)) => Vec::new(),
        };

        let base = Url::parse(&item.url).ok();

        rows.into_iter()
            .map(|mut row| {
                for (name, item_field) in &self.item_fields {
                    if let Some(value) = item.field(item_field) {
                        row.insert(name.clone(), value.into_owned());
                    }
                }
                for (name, value) in &self.constants {
                    row.insert(name.clone(), value.clone());
                }
                for (name, value) in &self.defaults {
                    let slot = row.entry(name.clone()).or_default();
                    if slot.trim().is_empty() {
                        slot.clone_from(value);
                    }
                }
                for name in &self.url_fields {
                    if let Some(value) = row.remove(name) {
                        if let Some(absolute) = resolve_link(&value, base.as_ref()) {
                            row.insert(name.clone(), absolute);
                        }
                    }
                }
                row
            })
            .filter(|row| {
                self.required
                    .iter()
                    .all(|name| row.get(name).is_some_and(|v| !v.trim().is_empty()))
            })
            .filter(|row| self.filter.as_ref().map_or(true, |f| f.allows(row)))
            .collect()
    }
}

impl<T: FromFields> Extract<T> for ConfiguredExtractor {
    fn extract(&self, content: &Content, item: &WorkItem) -> Vec<T> {
        self.fields(content, item)
            .into_iter()
            .filter_map(T::from_fields)
            .collect()
    }
}

/// Field specs naming a work-item field instead of a selector or pointer
pub(crate) fn is_item_ref(spec: &str) -> bool {
    spec.starts_with('$')
}

/// Resolves a possibly relative link against the page it was found on
///
/// Returns `None` for links that cannot name a download: `javascript:`,
/// `mailto:`, `tel:` and `data:` links, same-page anchors, and anything that
/// does not resolve to http(s). Without a base only absolute links survive.
fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}

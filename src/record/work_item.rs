use crate::dedup::Keyed;
use crate::record::{non_empty, value_as_str, Fields, FromFields};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use url::form_urlencoded;

/// A single unit of work: one page or API call to fetch and extract
///
/// Work items come from the `[[work]]` table of the configuration or from a
/// discovery pass, which persists them in the work-list document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Locator to fetch
    pub url: String,

    /// Human-readable name used in logs and by URL templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Search seed this item was discovered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,

    /// JSON body; when present the item is fetched with POST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Context for the extractor
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    pub const URL: &'static str = "url";
    pub const LABEL: &'static str = "label";
    pub const SEED: &'static str = "seed";

    /// Creates a work item for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
            seed: None,
            body: None,
            extra: Map::new(),
        }
    }

    /// Sets the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the discovery seed
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Sets a JSON body, turning the request into a POST
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Name used in progress and error logs
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.url)
    }

    /// Rewrites the URL from a template
    ///
    /// `{url}` is replaced verbatim; `{label}` and `{seed}` are replaced with
    /// their form-encoded values (empty when unset).
    pub fn expand(mut self, template: &str) -> Self {
        let encode =
            |value: Option<&str>| form_urlencoded::byte_serialize(value.unwrap_or("").as_bytes()).collect::<String>();

        let expanded = template
            .replace("{label}", &encode(self.label.as_deref()))
            .replace("{seed}", &encode(self.seed.as_deref()))
            .replace("{url}", &self.url);

        self.url = expanded;
        self
    }
}

impl Keyed for WorkItem {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            Self::URL => Some(Cow::Borrowed(self.url.as_str())),
            Self::LABEL => self.label.as_deref().map(Cow::Borrowed),
            Self::SEED => self.seed.as_deref().map(Cow::Borrowed),
            other => self.extra.get(other).and_then(value_as_str),
        }
    }
}

impl FromFields for WorkItem {
    fn from_fields(mut fields: Fields) -> Option<Self> {
        let url = non_empty(fields.remove(Self::URL))?;
        let label = non_empty(fields.remove(Self::LABEL));
        let seed = non_empty(fields.remove(Self::SEED));

        let extra = fields
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        Some(Self {
            url,
            label,
            seed,
            body: None,
            extra,
        })
    }
}

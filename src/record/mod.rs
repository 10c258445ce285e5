//! Record types flowing through the harvest pipeline
//!
//! Two kinds of rows are persisted:
//! - [`FirmwareRecord`] - one downloadable firmware image, the harvest output
//! - [`WorkItem`] - one page or query to fetch, the discovery output
//!
//! Both are built by extractors from a flat map of named string fields.

mod firmware;
mod work_item;

pub use firmware::FirmwareRecord;
pub use work_item::WorkItem;

use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Named string fields produced by an extractor for one candidate row
pub type Fields = BTreeMap<String, String>;

/// Types that can be assembled from extracted fields
pub trait FromFields: Sized {
    /// Builds a value from extracted fields
    ///
    /// Returns `None` when a field the type cannot live without is missing.
    fn from_fields(fields: Fields) -> Option<Self>;
}

/// Renders an extension-bag value as a key component
///
/// Strings are borrowed as-is, `null` counts as absent, and everything else
/// uses its compact JSON form.
pub(crate) fn value_as_str(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Drops empty strings so optional fields stay absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

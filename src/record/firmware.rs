use crate::dedup::Keyed;
use crate::record::{non_empty, value_as_str, Fields, FromFields};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// One firmware download discovered on a vendor site
///
/// The fields the pipeline itself reads (model, version, download URL) are
/// typed; anything a vendor adds on top (checksums, hardware revisions,
/// component ids, ...) lands in `extra` and is written back untouched.
///
/// Serialized field names match the JSON documents produced by earlier
/// harvests so existing stores load without migration. Any JSON object
/// deserializes: a known field holding something other than a string (a
/// numeric `Version`, say) stays in `extra` under its own name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FirmwareRecord {
    #[serde(rename = "Vendor", skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    #[serde(rename = "Model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Direct link to the firmware image
    #[serde(rename = "Download", skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,

    #[serde(rename = "Release_Date", skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(rename = "ReleaseNotes", skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,

    #[serde(rename = "Title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Vendor-specific fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FirmwareRecord {
    pub const VENDOR: &'static str = "Vendor";
    pub const MODEL: &'static str = "Model";
    pub const VERSION: &'static str = "Version";
    pub const DOWNLOAD: &'static str = "Download";
    pub const RELEASE_DATE: &'static str = "Release_Date";
    pub const RELEASE_NOTES: &'static str = "ReleaseNotes";
    pub const TITLE: &'static str = "Title";

    /// Creates a record for a model and its download link
    pub fn new(model: impl Into<String>, download: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            download: Some(download.into()),
            ..Self::default()
        }
    }

    /// Sets the vendor name
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Sets the firmware version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a vendor-specific field
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

impl Keyed for FirmwareRecord {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        let known = match name {
            Self::VENDOR => self.vendor.as_deref(),
            Self::MODEL => self.model.as_deref(),
            Self::VERSION => self.version.as_deref(),
            Self::DOWNLOAD => self.download.as_deref(),
            Self::RELEASE_DATE => self.release_date.as_deref(),
            Self::RELEASE_NOTES => self.release_notes.as_deref(),
            Self::TITLE => self.title.as_deref(),
            _ => None,
        };
        match known {
            Some(value) => Some(Cow::Borrowed(value)),
            None => self.extra.get(name).and_then(value_as_str),
        }
    }
}

impl<'de> Deserialize<'de> for FirmwareRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut extra = Map::deserialize(deserializer)?;

        Ok(Self {
            vendor: take_string(&mut extra, Self::VENDOR),
            model: take_string(&mut extra, Self::MODEL),
            version: take_string(&mut extra, Self::VERSION),
            download: take_string(&mut extra, Self::DOWNLOAD),
            release_date: take_string(&mut extra, Self::RELEASE_DATE),
            release_notes: take_string(&mut extra, Self::RELEASE_NOTES),
            title: take_string(&mut extra, Self::TITLE),
            extra,
        })
    }
}

/// Moves a string field out of `map`; `null` is dropped, other values stay
fn take_string(map: &mut Map<String, Value>, name: &str) -> Option<String> {
    match map.remove(name)? {
        Value::String(value) => Some(value),
        Value::Null => None,
        other => {
            map.insert(name.to_string(), other);
            None
        }
    }
}

impl FromFields for FirmwareRecord {
    fn from_fields(mut fields: Fields) -> Option<Self> {
        let mut take = |name: &str| non_empty(fields.remove(name));

        let record = Self {
            vendor: take(Self::VENDOR),
            model: take(Self::MODEL),
            version: take(Self::VERSION),
            download: take(Self::DOWNLOAD),
            release_date: take(Self::RELEASE_DATE),
            release_notes: take(Self::RELEASE_NOTES),
            title: take(Self::TITLE),
            extra: Map::new(),
        };

        // A firmware record without a link is not worth keeping
        record.download.as_ref()?;

        let extra = fields
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        Some(Self { extra, ..record })
    }
}

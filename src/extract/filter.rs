//! Screening of firmware download links

use crate::config::FilterConfig;
use crate::record::{Fields, FirmwareRecord};
use url::Url;

/// Rejects rows whose download link is off-site, has the wrong file type, or
/// mentions a denied word
#[derive(Debug, Clone, Default)]
pub struct DownloadFilter {
    hosts: Vec<String>,
    extensions: Vec<String>,
    deny: Vec<String>,
}

impl DownloadFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        let lower = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().trim_start_matches('.').to_lowercase())
                .filter(|v| !v.is_empty())
                .collect()
        };

        Self {
            hosts: lower(&config.hosts),
            extensions: lower(&config.extensions),
            deny: lower(&config.deny),
        }
    }

    /// Checks a row's `Download` link and `Title`
    ///
    /// Rows without a download link pass; whether they are kept is up to the
    /// record type.
    pub fn allows(&self, fields: &Fields) -> bool {
        let Some(download) = fields.get(FirmwareRecord::DOWNLOAD) else {
            return true;
        };

        if self.is_denied(download) {
            return false;
        }
        if let Some(title) = fields.get(FirmwareRecord::TITLE) {
            if self.is_denied(title) {
                return false;
            }
        }

        if self.hosts.is_empty() && self.extensions.is_empty() {
            return true;
        }

        let Ok(url) = Url::parse(download) else {
            return false;
        };

        self.host_allowed(&url) && self.extension_allowed(&url)
    }

    fn is_denied(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.deny.iter().any(|word| text.contains(word.as_str()))
    }

    /// Exact host or any subdomain of it
    fn host_allowed(&self, url: &Url) -> bool {
        if self.hosts.is_empty() {
            return true;
        }
        let Some(host) = url.host_str().map(str::to_lowercase) else {
            return false;
        };

        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn extension_allowed(&self, url: &Url) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let path = url.path().to_lowercase();

        self.extensions
            .iter()
            .any(|ext| path.strip_suffix(ext.as_str()).is_some_and(|stem| stem.ends_with('.')))
    }
}

//! HTML row extraction
//!
//! A row selector picks one element per candidate row; each field is then
//! read from inside that element:
//! - `"td.version"` - trimmed text of the first match
//! - `"a.download@href"` - attribute of the first match
//! - `"@data-model"` - attribute of the row element itself

use crate::record::Fields;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// How one field is read from a row element
#[derive(Debug, Clone)]
struct FieldSelector {
    css: Option<Selector>,
    attr: Option<String>,
}

impl FieldSelector {
    fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (css, attr) = match spec.split_once('@') {
            Some((css, attr)) => (css.trim(), Some(attr.trim().to_string())),
            None => (spec.trim(), None),
        };

        let css = if css.is_empty() {
            None
        } else {
            Some(parse_selector(css)?)
        };

        Ok(Self { css, attr })
    }

    fn read(&self, row: ElementRef<'_>) -> Option<String> {
        let element = match &self.css {
            Some(selector) => row.select(selector).next()?,
            None => row,
        };

        let value = match &self.attr {
            Some(attr) => element.value().attr(attr)?.trim().to_string(),
            None => collapse_whitespace(&element.text().collect::<String>()),
        };

        Some(value).filter(|v| !v.is_empty())
    }
}

/// Extracts field maps from HTML documents
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    row: Selector,
    fields: Vec<(String, FieldSelector)>,
}

impl HtmlExtractor {
    /// Compiles the row selector and field specs
    pub fn new(row: &str, fields: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let row = parse_selector(row)?;
        let fields = fields
            .iter()
            .map(|(name, spec)| Ok((name.clone(), FieldSelector::parse(spec)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { row, fields })
    }

    /// Returns the raw field map of every row in the document
    ///
    /// Fields that are missing or empty in a row are left out of its map.
    pub fn rows(&self, html: &str) -> Vec<Fields> {
        let document = Html::parse_document(html);

        document
            .select(&self.row)
            .map(|row| {
                self.fields
                    .iter()
                    .filter_map(|(name, selector)| Some((name.clone(), selector.read(row)?)))
                    .collect()
            })
            .collect()
    }
}

fn parse_selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

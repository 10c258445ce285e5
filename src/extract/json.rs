//! JSON row extraction using JSON pointers (RFC 6901)

use crate::record::Fields;
use serde_json::Value;
use std::collections::BTreeMap;

/// Extracts field maps from JSON documents
#[derive(Debug, Clone)]
pub struct JsonExtractor {
    items: String,
    fields: Vec<(String, String)>,
}

impl JsonExtractor {
    /// `items` points at the row array (or a single row object); an empty
    /// pointer means the document root
    pub fn new(items: Option<&str>, fields: &BTreeMap<String, String>) -> Self {
        Self {
            items: items.unwrap_or("").to_string(),
            fields: fields
                .iter()
                .map(|(name, pointer)| (name.clone(), pointer.clone()))
                .collect(),
        }
    }

    pub fn rows(&self, document: &Value) -> Vec<Fields> {
        let rows: Vec<&Value> = match document.pointer(&self.items) {
            Some(Value::Array(rows)) => rows.iter().collect(),
            Some(row @ Value::Object(_)) => vec![row],
            _ => return Vec::new(),
        };

        rows.into_iter()
            .filter(|row| row.is_object())
            .map(|row| {
                self.fields
                    .iter()
                    .filter_map(|(name, pointer)| {
                        let value = stringify(row.pointer(pointer)?)?;
                        Some((name.clone(), value))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Scalars become their plain text; containers keep their compact JSON form
fn stringify(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    Some(text).filter(|t| !t.is_empty())
}

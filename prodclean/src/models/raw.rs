//! Raw scraped records and source batches
//!
//! Scrapers disagree on field naming (`product_name`, `Product Name`, `title`)
//! and sometimes nest data one level deep (`{"details": {"brand": ...}}`).
//! `RawProductRecord` hides both: lookups take a list of aliases, compare
//! keys loosely, and fall back to one level of nesting.

use chrono::{DateTime, Utc};
use prodclean_common::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;

use super::schema::loose_key;
use crate::error::{CleanError, CleanResult};

/// Tokens treated as "no value" wherever they appear
pub const NULL_LIKE: &[&str] = &["", "n/a", "na", "none", "null", "nil", "-", "undefined", "nan"];

/// True for empty and placeholder strings such as `"N/A"`
pub fn is_null_like(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    NULL_LIKE.contains(&t.as_str())
}

/// Scalar JSON to text; `None` for null, objects and null-like strings.
///
/// Arrays of scalars are joined with `", "`.
pub fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Object(_) => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            if parts.is_empty() {
                return None;
            }
            parts.join(", ")
        }
    };
    if is_null_like(&text) {
        None
    } else {
        Some(text)
    }
}

/// One scraped product, tolerant of naming and one level of nesting
#[derive(Debug, Clone, PartialEq)]
pub struct RawProductRecord {
    fields: Map<String, Value>,
}

impl TryFrom<Value> for RawProductRecord {
    type Error = CleanError;

    fn try_from(value: Value) -> CleanResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(CleanError::malformed(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

impl RawProductRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Find a value by any of `aliases`.
    ///
    /// **Algorithm:**
    /// 1. Top-level keys, aliases tried in order
    /// 2. Keys of nested objects, aliases tried in order
    ///
    /// Keys compare loosely (case, spaces, underscores and punctuation ignored).
    /// Null values are skipped.
    pub fn lookup(&self, aliases: &[&str]) -> Option<&Value> {
        let wanted: Vec<String> = aliases.iter().map(|a| loose_key(a)).collect();

        for alias in &wanted {
            if let Some(v) = find_loose(&self.fields, alias) {
                return Some(v);
            }
        }

        for alias in &wanted {
            for (_, nested) in self.nested_objects() {
                if let Some(v) = find_loose(nested, alias) {
                    return Some(v);
                }
            }
        }

        None
    }

    /// Text value for the first alias holding a non-null-like scalar
    pub fn lookup_text(&self, aliases: &[&str]) -> Option<String> {
        let wanted: Vec<String> = aliases.iter().map(|a| loose_key(a)).collect();
        let levels = std::iter::once(&self.fields).chain(self.nested_objects().map(|(_, m)| m));
        for map in levels {
            for alias in &wanted {
                if let Some(text) = find_loose(map, alias).and_then(value_to_text) {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
        }
        None
    }

    /// Object-valued top-level fields
    pub fn nested_objects(&self) -> impl Iterator<Item = (&str, &Map<String, Value>)> {
        self.fields.iter().filter_map(|(k, v)| match v {
            Value::Object(m) => Some((k.as_str(), m)),
            _ => None,
        })
    }

    /// All scalar and array entries, top level first, then one level nested
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        let top = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_object())
            .map(|(k, v)| (k.as_str(), v));
        let nested = self
            .nested_objects()
            .flat_map(|(_, m)| m.iter().filter(|(_, v)| !v.is_object()).map(|(k, v)| (k.as_str(), v)));
        top.chain(nested)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn find_loose<'a>(map: &'a Map<String, Value>, loose: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, v)| !v.is_null() && loose_key(k) == loose)
        .map(|(_, v)| v)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Where a batch came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub url: String,
    /// Batch-level scrape time, used when a record has no `scraped_at` of its own
    pub scraped_at: Option<DateTime<Utc>>,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scraped_at: None,
        }
    }

    pub fn with_scraped_at(mut self, scraped_at: DateTime<Utc>) -> Self {
        self.scraped_at = Some(scraped_at);
        self
    }

    /// Product ID prefix: first three alphanumerics, uppercased (`"Bestway"` → `"BES"`)
    pub fn id_prefix(&self) -> String {
        let prefix: String = self
            .name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_uppercase();
        if prefix.is_empty() {
            "SRC".to_string()
        } else {
            prefix
        }
    }
}

/// Raw records from one source, in scrape order
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub source: SourceInfo,
    pub records: Vec<Value>,
}

impl RawBatch {
    pub fn new(source: SourceInfo, records: Vec<Value>) -> Self {
        Self { source, records }
    }

    /// Parse scraper output.
    ///
    /// Accepts a JSON array, a single object, or `{"products": [...]}`.
    pub fn from_json_str(source: SourceInfo, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let records = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("products") {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(Error::InvalidInput(format!(
                        "'products' must be an array, found {}",
                        json_kind(&other)
                    )))
                }
                None => vec![Value::Object(map)],
            },
            other => {
                return Err(Error::InvalidInput(format!(
                    "expected an array or object of products, found {}",
                    json_kind(&other)
                )))
            }
        };
        Ok(Self { source, records })
    }

    /// Load scraper output from a file
    pub fn load(source: SourceInfo, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("input file {}", path.display())));
        }
        let text = std::fs::read_to_string(path)?;
        let batch = Self::from_json_str(source, &text)?;
        tracing::info!(
            source = %batch.source.name,
            path = %path.display(),
            records = batch.records.len(),
            "loaded raw products"
        );
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Typed field values, the per-record fact set, and the canonical record

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use super::schema::{FieldType, MASTER_SCHEMA};

/// A typed field value.
///
/// URL fields are carried as `Text`; `SchemaEnforcer` validates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Numeric(Option<f64>),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn number(value: f64) -> Self {
        FieldValue::Numeric(Some(value))
    }

    /// Does this value have the shape required by `field_type`
    pub fn matches(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (FieldValue::Text(_), FieldType::Text | FieldType::Url)
                | (FieldValue::Numeric(_), FieldType::Numeric)
                | (FieldValue::Boolean(_), FieldType::Boolean)
                | (FieldValue::List(_), FieldType::List)
        )
    }

    /// Short type label for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Numeric(_) => "numeric",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::List(_) => "list",
        }
    }

    /// True when the value carries information (not empty, null or false)
    pub fn is_filled(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::Numeric(n) => n.is_some(),
            FieldValue::Boolean(b) => *b,
            FieldValue::List(items) => !items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(n) => *n,
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Facts accumulated for one record before schema enforcement.
///
/// Keys are schema field names. Later writes replace earlier ones except
/// through [`FactSet::set_if_absent`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet {
    facts: BTreeMap<String, FieldValue>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: FieldValue) {
        self.facts.insert(field.to_string(), value);
    }

    /// Set only when the field has no filled value yet
    pub fn set_if_absent(&mut self, field: &str, value: FieldValue) {
        if !self.is_filled(field) {
            self.set(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.facts.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.facts.remove(field)
    }

    pub fn is_filled(&self, field: &str) -> bool {
        self.facts.get(field).is_some_and(FieldValue::is_filled)
    }

    pub fn text(&self, field: &str) -> &str {
        self.facts.get(field).and_then(FieldValue::as_text).unwrap_or("")
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.facts.get(field).and_then(FieldValue::as_number)
    }

    pub fn flag(&self, field: &str) -> bool {
        self.facts.get(field).and_then(FieldValue::as_bool).unwrap_or(false)
    }

    pub fn list(&self, field: &str) -> &[String] {
        self.facts.get(field).and_then(FieldValue::as_list).unwrap_or(&[])
    }

    /// Append to a list field, skipping case-insensitive duplicates
    pub fn push_unique(&mut self, field: &str, item: &str) {
        let item = item.trim();
        if item.is_empty() {
            return;
        }
        let entry = self
            .facts
            .entry(field.to_string())
            .or_insert_with(|| FieldValue::List(Vec::new()));
        if let FieldValue::List(items) = entry {
            if !items.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
                items.push(item.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, FieldValue> {
        self.facts
    }
}

/// A product record conforming exactly to `MASTER_SCHEMA`.
///
/// Values are stored in schema order; serialization emits a JSON object
/// with keys in that order. Only `SchemaEnforcer` constructs these.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalProductRecord {
    values: Vec<FieldValue>,
}

impl CanonicalProductRecord {
    /// Caller guarantees `values` is schema-aligned and type-checked
    pub(crate) fn from_aligned(values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(values.len(), MASTER_SCHEMA.len());
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        MASTER_SCHEMA.index_of(field).map(|i| &self.values[i])
    }

    pub fn text(&self, field: &str) -> &str {
        self.get(field).and_then(FieldValue::as_text).unwrap_or("")
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_number)
    }

    pub fn flag(&self, field: &str) -> bool {
        self.get(field).and_then(FieldValue::as_bool).unwrap_or(false)
    }

    pub fn list(&self, field: &str) -> &[String] {
        self.get(field).and_then(FieldValue::as_list).unwrap_or(&[])
    }

    /// Replace a field value, keeping the record schema-conformant.
    ///
    /// Returns false (and leaves the record unchanged) for unknown fields or
    /// values of the wrong type.
    pub fn set(&mut self, field: &str, value: FieldValue) -> bool {
        match MASTER_SCHEMA.get(field) {
            Some(def) if value.matches(def.field_type) => {
                if let Some(i) = MASTER_SCHEMA.index_of(field) {
                    self.values[i] = value;
                }
                true
            }
            _ => false,
        }
    }

    /// `(name, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        MASTER_SCHEMA.names().zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for CanonicalProductRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

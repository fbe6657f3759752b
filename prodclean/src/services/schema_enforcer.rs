//! SchemaEnforcer: project a fact set onto `MASTER_SCHEMA`
//!
//! **Algorithm:**
//! 1. Reject any fact whose key is not a schema field
//! 2. Walk the schema in order, taking the upstream value or the field default
//! 3. Assert type conformance: shape, finite numerics, valid non-empty URLs
//!
//! A failure here is an upstream defect, reported as `SchemaViolation` for
//! the record. Bad input never reaches this point as an error; the
//! normalizer has already degraded it to a default.

use super::normalizer::normalize_url;
use crate::error::{CleanError, CleanResult};
use crate::models::{CanonicalProductRecord, FactSet, FieldType, FieldValue, MASTER_SCHEMA};

/// SchemaEnforcer
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaEnforcer;

impl SchemaEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Build the canonical record from `facts`
    pub fn enforce(&self, facts: FactSet) -> CleanResult<CanonicalProductRecord> {
        let mut facts = facts.into_inner();

        if let Some(unknown) = facts.keys().find(|k| !MASTER_SCHEMA.contains(k)) {
            return Err(CleanError::schema_violation(
                unknown.as_str(),
                "a MasterSchema field",
                "unknown field",
            ));
        }

        let mut values = Vec::with_capacity(MASTER_SCHEMA.len());
        for def in MASTER_SCHEMA.fields() {
            let value = facts.remove(def.name).unwrap_or_else(|| def.default_value());
            check_value(def.name, def.field_type, &value)?;
            values.push(value);
        }

        Ok(CanonicalProductRecord::from_aligned(values))
    }
}

fn check_value(field: &str, field_type: FieldType, value: &FieldValue) -> CleanResult<()> {
    if !value.matches(field_type) {
        return Err(CleanError::schema_violation(field, field_type.as_str(), value.kind()));
    }
    match (field_type, value) {
        (FieldType::Numeric, FieldValue::Numeric(Some(n))) if !n.is_finite() => {
            Err(CleanError::schema_violation(field, "finite number", n.to_string()))
        }
        (FieldType::Url, FieldValue::Text(url)) if !url.is_empty() && normalize_url(url).as_deref() != Some(url.as_str()) => {
            Err(CleanError::schema_violation(field, "absolute http(s) URL", url.as_str()))
        }
        _ => Ok(()),
    }
}

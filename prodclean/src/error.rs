//! Error types for the cleaning engine
//!
//! Per-record failures never cross the batch boundary: the pipeline turns
//! every `CleanError` into a counted outcome in the run summary.

use serde::Serialize;
use thiserror::Error;

/// Result type for per-record cleaning
pub type CleanResult<T> = std::result::Result<T, CleanError>;

/// Per-record failure taxonomy
#[derive(Error, Debug)]
pub enum CleanError {
    /// Raw record has no usable name; skipped and counted
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Final type check failed; the record is excluded and a hard error recorded
    #[error("Schema violation on '{field}': expected {expected}, found {found}")]
    SchemaViolation {
        field: String,
        expected: String,
        found: String,
    },

    /// Run was cancelled before this record was started
    #[error("Cancelled before processing")]
    Cancelled,

    #[error(transparent)]
    Common(#[from] prodclean_common::Error),
}

impl CleanError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub fn schema_violation(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// A raw value that could not be coerced to its schema type.
///
/// Non-fatal: the field falls back to its schema default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedField {
    pub field: String,
    pub raw: String,
    pub reason: String,
}

impl DegradedField {
    pub fn new(field: impl Into<String>, raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

/// Brand vocabulary mutation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VocabularyError {
    #[error("Variation '{variation}' already belongs to brand '{owner}'")]
    VariationOwned { variation: String, owner: String },

    #[error("Brand name is empty after normalization")]
    EmptyBrand,

    #[error("Unknown brand '{0}'")]
    UnknownBrand(String),
}

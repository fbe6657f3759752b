//! Run summary and data-quality statistics
//!
//! **Purpose:** one serializable report per cleaning run, written next to the
//! cleaned products and logged via `display_string()`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::schema::names;
use crate::models::{CanonicalProductRecord, MASTER_SCHEMA, SCHEMA_VERSION};

/// Fields listed in `RunSummary::top_fields`
pub const TOP_FIELDS_LIMIT: usize = 15;

/// **Per-source counts**
///
/// Display: "Bestway: 120 input, 110 cleaned, 5 malformed, 0 schema violations, 5 duplicates"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    /// Records in the raw file
    pub input: usize,
    /// Records in the merged output
    pub cleaned: usize,
    pub malformed: usize,
    pub schema_violations: usize,
    pub duplicates: usize,
    /// Raw values that fell back to a schema default
    pub degraded_fields: usize,
    /// Records never started because the run was cancelled
    pub cancelled: usize,
}

impl SourceStats {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn display_string(&self) -> String {
        let mut text = format!(
            "{}: {} input, {} cleaned, {} malformed, {} schema violations, {} duplicates",
            self.source, self.input, self.cleaned, self.malformed, self.schema_violations, self.duplicates
        );
        if self.cancelled > 0 {
            text.push_str(&format!(", {} cancelled", self.cancelled));
        }
        text
    }

    fn accumulate(&mut self, other: &SourceStats) {
        self.input += other.input;
        self.cleaned += other.cleaned;
        self.malformed += other.malformed;
        self.schema_violations += other.schema_violations;
        self.duplicates += other.duplicates;
        self.degraded_fields += other.degraded_fields;
        self.cancelled += other.cancelled;
    }
}

/// A record excluded because of a schema violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardError {
    pub source: String,
    /// Zero-based position in the source file
    pub position: usize,
    pub message: String,
}

/// How often a field is filled across the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFill {
    pub field: String,
    pub filled: usize,
    pub percent: f64,
}

/// **Run summary**
///
/// Display: "Run <id>: 230 of 250 records cleaned (12 malformed, 8 duplicates), 4 new brands, 87.0% brand detection"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub schema_version: u32,
    pub schema_fields: usize,
    pub cancelled: bool,
    pub sources: Vec<SourceStats>,
    pub totals: SourceStats,
    /// Brands registered during this run, sorted
    pub new_brands: Vec<String>,
    /// Share of output records with a brand, in percent
    pub brand_detection_rate: f64,
    /// Canonical brands in the vocabulary after the run
    pub known_brands: usize,
    pub mean_completeness: f64,
    pub top_fields: Vec<FieldFill>,
    pub hard_errors: Vec<HardError>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at,
            schema_version: SCHEMA_VERSION,
            schema_fields: MASTER_SCHEMA.len(),
            cancelled: false,
            sources: Vec::new(),
            totals: SourceStats::new("total"),
            new_brands: Vec::new(),
            brand_detection_rate: 0.0,
            known_brands: 0,
            mean_completeness: 0.0,
            top_fields: Vec::new(),
            hard_errors: Vec::new(),
        }
    }

    /// Compute totals and output-quality figures
    pub fn finish(&mut self, records: &[CanonicalProductRecord], finished_at: DateTime<Utc>) {
        self.finished_at = finished_at;

        let mut totals = SourceStats::new("total");
        for source in &self.sources {
            totals.accumulate(source);
        }
        self.totals = totals;

        self.new_brands.sort();
        self.new_brands.dedup();

        if records.is_empty() {
            self.brand_detection_rate = 0.0;
            self.mean_completeness = 0.0;
            self.top_fields = Vec::new();
            return;
        }
        let count = records.len() as f64;
        let branded = records.iter().filter(|r| !r.text(names::BRAND).is_empty()).count();
        self.brand_detection_rate = round1(branded as f64 * 100.0 / count);
        let completeness: f64 = records
            .iter()
            .filter_map(|r| r.number(names::DATA_COMPLETENESS))
            .sum();
        self.mean_completeness = round1(completeness / count);
        self.top_fields = field_fill(records, TOP_FIELDS_LIMIT);
    }

    pub fn display_string(&self) -> String {
        let mut text = format!(
            "Run {}: {} of {} records cleaned ({} malformed, {} duplicates, {} schema violations), {} new brands, {:.1}% brand detection, {:.1}% mean completeness",
            self.run_id,
            self.totals.cleaned,
            self.totals.input,
            self.totals.malformed,
            self.totals.duplicates,
            self.totals.schema_violations,
            self.new_brands.len(),
            self.brand_detection_rate,
            self.mean_completeness,
        );
        if self.cancelled {
            text.push_str(&format!(" [cancelled, {} records not started]", self.totals.cancelled));
        }
        text
    }
}

/// Most-filled schema fields, ties in schema order.
///
/// Merge metadata is left out since every record carries it.
pub fn field_fill(records: &[CanonicalProductRecord], limit: usize) -> Vec<FieldFill> {
    let mut counts = vec![0usize; MASTER_SCHEMA.len()];
    for record in records {
        for (i, (_, value)) in record.iter().enumerate() {
            if value.is_filled() {
                counts[i] += 1;
            }
        }
    }

    let mut fills: Vec<FieldFill> = MASTER_SCHEMA
        .names()
        .zip(counts)
        .filter(|(name, filled)| *filled > 0 && !names::MERGE_METADATA.contains(name))
        .map(|(name, filled)| FieldFill {
            field: name.to_string(),
            filled,
            percent: round1(filled as f64 * 100.0 / records.len().max(1) as f64),
        })
        .collect();
    // Stable sort keeps schema order among equal counts
    fills.sort_by(|a, b| b.filled.cmp(&a.filled));
    fills.truncate(limit);
    fills
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

//! BatchMerger: combine per-source results, deduplicate, stamp metadata
//!
//! Runs after the per-record barrier. Records are visited in source order and
//! then input order, so "first seen" means the earliest record of the
//! earliest source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::normalizer::normalize_url;
use crate::models::schema::{loose_key, names};
use crate::models::{CanonicalProductRecord, FieldValue, SourceInfo, MASTER_SCHEMA};
use prodclean_common::time;

/// Fields hashed into the content hash unless configured otherwise
pub const DEFAULT_DEDUPE_FIELDS: &[&str] = &[names::BRAND, names::PRODUCT_NAME, names::PACKAGE_SIZE];

const HASH_FIELD_SEPARATOR: &str = "\u{1f}";

/// Cleaned records of one source, in input order
#[derive(Debug, Clone)]
pub struct SourceRecords {
    pub source: SourceInfo,
    pub records: Vec<CanonicalProductRecord>,
}

/// Per-source merge counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMergeStats {
    pub source: String,
    pub candidates: usize,
    pub kept: usize,
    pub duplicates: usize,
}

/// Merge counts for the whole batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub per_source: Vec<SourceMergeStats>,
    pub candidates: usize,
    pub kept: usize,
    pub duplicates: usize,
}

impl MergeStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} records merged from {} candidates, {} duplicates dropped",
            self.kept, self.candidates, self.duplicates
        )
    }
}

/// Merged output
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: Vec<CanonicalProductRecord>,
    pub stats: MergeStats,
}

/// BatchMerger
#[derive(Debug, Clone)]
pub struct BatchMerger {
    dedupe_fields: Vec<&'static str>,
}

impl Default for BatchMerger {
    fn default() -> Self {
        Self {
            dedupe_fields: DEFAULT_DEDUPE_FIELDS.to_vec(),
        }
    }
}

impl BatchMerger {
    /// Hash the given schema fields.
    ///
    /// Names are matched loosely; unknown names are skipped with a warning.
    /// If none remain, the default fields are used.
    pub fn with_dedupe_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let mut dedupe_fields = Vec::new();
        for name in fields {
            match MASTER_SCHEMA.find_loose(name.as_ref()) {
                Some(def) if !dedupe_fields.contains(&def.name) => dedupe_fields.push(def.name),
                Some(_) => {}
                None => tracing::warn!(field = %name.as_ref(), "dedupe field is not a schema field, ignored"),
            }
        }
        if dedupe_fields.is_empty() {
            tracing::warn!("no usable dedupe fields configured, using defaults");
            return Self::default();
        }
        Self { dedupe_fields }
    }

    pub fn dedupe_fields(&self) -> &[&'static str] {
        &self.dedupe_fields
    }

    /// SHA-256 over the normalized dedupe fields, hex encoded
    ///
    /// Text is reduced to lowercase alphanumerics so spacing, case and
    /// punctuation differences collapse to one key.
    pub fn content_hash(&self, record: &CanonicalProductRecord) -> String {
        let parts: Vec<String> = self
            .dedupe_fields
            .iter()
            .map(|field| match record.get(field) {
                Some(FieldValue::Text(s)) => loose_key(s),
                Some(FieldValue::Numeric(Some(n))) => format!("{}", n),
                Some(FieldValue::Boolean(b)) => b.to_string(),
                Some(FieldValue::List(items)) => {
                    items.iter().map(|i| loose_key(i)).collect::<Vec<_>>().join("|")
                }
                Some(FieldValue::Numeric(None)) | None => String::new(),
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(parts.join(HASH_FIELD_SEPARATOR).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deduplicate and stamp merge-time metadata
    ///
    /// **Algorithm:**
    /// 1. For each source in order, for each record in order, compute the content hash
    /// 2. A hash already seen drops the record (no field reconciliation)
    /// 3. Survivors get source name/URL, Scraped At (record value, else the
    ///    source's scrape time), Cleaned At, Content Hash and Data Completeness
    pub fn merge(&self, batches: Vec<SourceRecords>, cleaned_at: DateTime<Utc>) -> MergeOutcome {
        let cleaned_at = time::to_record_string(&cleaned_at);
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut stats = MergeStats::default();

        for batch in batches {
            let mut source_stats = SourceMergeStats {
                source: batch.source.name.clone(),
                candidates: batch.records.len(),
                ..Default::default()
            };
            let source_url = normalize_url(&batch.source.url).unwrap_or_else(|| {
                if !batch.source.url.is_empty() {
                    tracing::warn!(source = %batch.source.name, url = %batch.source.url, "source URL is not a valid URL, left empty");
                }
                String::new()
            });
            let source_scraped_at = batch.source.scraped_at.as_ref().map(time::to_record_string);

            for mut record in batch.records {
                let hash = self.content_hash(&record);
                if !seen.insert(hash.clone()) {
                    tracing::debug!(
                        source = %batch.source.name,
                        product = %record.text(names::PRODUCT_NAME),
                        hash = %hash,
                        "Duplicate record dropped"
                    );
                    source_stats.duplicates += 1;
                    continue;
                }

                record.set(names::SOURCE_WEBSITE_NAME, FieldValue::text(batch.source.name.as_str()));
                record.set(names::SOURCE_WEBSITE_URL, FieldValue::text(source_url.as_str()));
                if record.text(names::SCRAPED_AT).is_empty() {
                    if let Some(scraped_at) = &source_scraped_at {
                        record.set(names::SCRAPED_AT, FieldValue::text(scraped_at.as_str()));
                    }
                }
                record.set(names::CLEANED_AT, FieldValue::text(cleaned_at.as_str()));
                record.set(names::CONTENT_HASH, FieldValue::Text(hash));
                let completeness = data_completeness(&record);
                record.set(names::DATA_COMPLETENESS, FieldValue::number(completeness));

                source_stats.kept += 1;
                records.push(record);
            }

            stats.candidates += source_stats.candidates;
            stats.kept += source_stats.kept;
            stats.duplicates += source_stats.duplicates;
            stats.per_source.push(source_stats);
        }

        MergeOutcome { records, stats }
    }
}

/// Percentage of non-metadata schema fields holding a non-default value, 1 dp
pub fn data_completeness(record: &CanonicalProductRecord) -> f64 {
    let (filled, total) = record
        .iter()
        .filter(|(name, _)| !names::MERGE_METADATA.contains(name))
        .fold((0usize, 0usize), |(filled, total), (_, value)| {
            (filled + usize::from(value.is_filled()), total + 1)
        });
    if total == 0 {
        return 0.0;
    }
    (filled as f64 * 1000.0 / total as f64).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FactSet;
    use crate::services::schema_enforcer::SchemaEnforcer;
    use chrono::TimeZone;

    fn record(brand: &str, name: &str, size: &str) -> CanonicalProductRecord {
        let mut facts = FactSet::new();
        facts.set(names::BRAND, FieldValue::text(brand));
        facts.set(names::PRODUCT_NAME, FieldValue::text(name));
        facts.set(names::PACKAGE_SIZE, FieldValue::text(size));
        SchemaEnforcer::new().enforce(facts).unwrap()
    }

    fn source(name: &str) -> SourceInfo {
        SourceInfo::new(name, format!("https://www.{}.co.uk", name.to_lowercase()))
    }

    #[test]
    fn test_hash_ignores_case_and_punctuation() {
        let merger = BatchMerger::default();
        let a = merger.content_hash(&record("Coca-Cola", "Coca-Cola Zero", "330ml"));
        let b = merger.content_hash(&record("Coca Cola", "coca cola zero", "330 ml"));
        let c = merger.content_hash(&record("Coca-Cola", "Coca-Cola Zero", "500ml"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_first_seen_wins_across_sources() {
        let mut first = record("Heinz", "Baked Beans", "415g");
        first.set(names::SKU, FieldValue::text("A1"));
        let mut second = record("Heinz", "Baked Beans", "415g");
        second.set(names::SKU, FieldValue::text("B2"));

        let outcome = BatchMerger::default().merge(
            vec![
                SourceRecords { source: source("Bestway"), records: vec![first] },
                SourceRecords { source: source("Booker"), records: vec![second, record("Heinz", "Ketchup", "460g")] },
            ],
            Utc::now(),
        );

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].text(names::SKU), "A1");
        assert_eq!(outcome.records[0].text(names::SOURCE_WEBSITE_NAME), "Bestway");
        assert_eq!(outcome.stats.duplicates, 1);
        assert_eq!(outcome.stats.per_source[1].duplicates, 1);
        assert_eq!(outcome.stats.per_source[1].kept, 1);
    }

    #[test]
    fn test_merge_metadata_attached() {
        let cleaned_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let scraped_at = Utc.with_ymd_and_hms(2026, 2, 28, 8, 30, 0).unwrap();
        let outcome = BatchMerger::default().merge(
            vec![SourceRecords {
                source: source("Bestway").with_scraped_at(scraped_at),
                records: vec![record("Heinz", "Baked Beans", "415g")],
            }],
            cleaned_at,
        );

        let merged = &outcome.records[0];
        assert_eq!(merged.text(names::SOURCE_WEBSITE_URL), "https://www.bestway.co.uk");
        assert_eq!(merged.text(names::SCRAPED_AT), "2026-02-28T08:30:00Z");
        assert_eq!(merged.text(names::CLEANED_AT), "2026-03-01T12:00:00Z");
        assert_eq!(merged.text(names::CONTENT_HASH).len(), 64);
        assert!(merged.number(names::DATA_COMPLETENESS).unwrap() > 0.0);
    }

    #[test]
    fn test_custom_dedupe_fields() {
        let merger = BatchMerger::with_dedupe_fields(&["barcode_ean_upc", "Nonexistent"]);
        assert_eq!(merger.dedupe_fields(), [names::BARCODE]);

        let fallback = BatchMerger::with_dedupe_fields(&["Nonexistent"]);
        assert_eq!(fallback.dedupe_fields(), DEFAULT_DEDUPE_FIELDS);
    }

    #[test]
    fn test_completeness_excludes_merge_metadata() {
        let empty = SchemaEnforcer::new().enforce(FactSet::new()).unwrap();
        assert_eq!(data_completeness(&empty), 0.0);

        let filled = record("Heinz", "Baked Beans", "415g");
        let total = MASTER_SCHEMA.len() - names::MERGE_METADATA.len();
        let expected = (3.0 * 1000.0 / total as f64).round() / 10.0;
        assert_eq!(data_completeness(&filled), expected);
    }
}

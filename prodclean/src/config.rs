//! Cleaner settings built from the `[cleaner]` section
//!
//! A configured table replaces the built-in one; an absent key keeps it.

use prodclean_common::config::CleanerOptions;
use std::collections::BTreeMap;

use crate::services::batch_merger::DEFAULT_DEDUPE_FIELDS;
use crate::services::brand_resolver::DEFAULT_BRAND_STOPLIST;
use crate::services::inference::DEFAULT_ALLERGEN_LEXICON;
use crate::services::normalizer::UnitTable;

/// Resolved cleaner tables
#[derive(Debug, Clone)]
pub struct CleanerSettings {
    pub units: UnitTable,
    pub brand_stoplist: Vec<String>,
    pub allergen_lexicon: BTreeMap<String, Vec<String>>,
    pub dedupe_fields: Vec<String>,
    /// Rayon worker threads (None = rayon default)
    pub workers: Option<usize>,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            units: UnitTable::default(),
            brand_stoplist: DEFAULT_BRAND_STOPLIST.iter().map(|s| s.to_string()).collect(),
            allergen_lexicon: DEFAULT_ALLERGEN_LEXICON
                .iter()
                .map(|(field, words)| (field.to_string(), words.iter().map(|w| w.to_string()).collect()))
                .collect(),
            dedupe_fields: DEFAULT_DEDUPE_FIELDS.iter().map(|s| s.to_string()).collect(),
            workers: None,
        }
    }
}

impl CleanerSettings {
    /// Apply `[cleaner]` overrides on top of the built-in tables
    pub fn from_options(options: &CleanerOptions) -> Self {
        let mut settings = Self::default();

        if let Some(table) = &options.unit_table {
            tracing::info!(entries = table.len(), "using configured unit table");
            settings.units = UnitTable::from_overrides(table);
        }
        if let Some(stoplist) = &options.brand_stoplist {
            tracing::info!(entries = stoplist.len(), "using configured brand stoplist");
            settings.brand_stoplist = stoplist.clone();
        }
        if let Some(lexicon) = &options.allergen_lexicon {
            tracing::info!(entries = lexicon.len(), "using configured allergen lexicon");
            settings.allergen_lexicon = lexicon.clone();
        }
        if let Some(fields) = &options.dedupe_fields {
            tracing::info!(fields = ?fields, "using configured dedupe fields");
            settings.dedupe_fields = fields.clone();
        }

        settings
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers.filter(|&n| n > 0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_builtin_tables() {
        let settings = CleanerSettings::from_options(&CleanerOptions::default());
        assert_eq!(settings.units.canonical("Litres"), Some("l"));
        assert!(settings.brand_stoplist.iter().any(|s| s == "juice"));
        assert!(settings.allergen_lexicon.contains_key("Contains Milk"));
        assert_eq!(settings.dedupe_fields, ["Brand", "Product Name", "Package Size"]);
        assert!(settings.workers.is_none());
    }

    #[test]
    fn test_overrides_replace_wholesale() {
        let mut unit_table = BTreeMap::new();
        unit_table.insert("cups".to_string(), "cup".to_string());
        let options = CleanerOptions {
            unit_table: Some(unit_table),
            brand_stoplist: Some(vec!["shortbread".to_string()]),
            allergen_lexicon: None,
            dedupe_fields: Some(vec!["Barcode (EAN/UPC)".to_string()]),
        };
        let settings = CleanerSettings::from_options(&options).with_workers(Some(0));

        assert_eq!(settings.units.canonical("cups"), Some("cup"));
        assert_eq!(settings.units.canonical("ml"), None);
        assert_eq!(settings.brand_stoplist, ["shortbread"]);
        assert!(settings.allergen_lexicon.contains_key("Contains Peanuts"));
        assert_eq!(settings.dedupe_fields, ["Barcode (EAN/UPC)"]);
        assert!(settings.workers.is_none());
    }
}

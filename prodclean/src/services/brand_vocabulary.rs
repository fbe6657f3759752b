//! BrandVocabulary: canonical brand names and their known variations
//!
//! **Invariants:**
//! - A normalized variation belongs to at most one canonical brand
//! - A canonical name is always one of its own variations
//!
//! The vocabulary is an owned value. Concurrent cleaning shares it through
//! [`SharedVocabulary`], whose [`SharedVocabulary::with`] runs a closure as a
//! single critical section; lookup-or-register must happen inside one call.
//!
//! **Lifecycle:** load at batch start, mutate while cleaning, save after the
//! batch. Brands registered before a cancelled run stops are kept.

use prodclean_common::fs::write_json_atomic;
use prodclean_common::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::VocabularyError;

/// Well-known grocery brands and their common spellings
const SEED_BRANDS: &[(&str, &[&str])] = &[
    ("Coca-Cola", &["Coca Cola", "Coke"]),
    ("Pepsi", &["PepsiCo"]),
    ("Fanta", &[]),
    ("Sprite", &[]),
    ("7UP", &["7-Up", "Seven Up"]),
    ("Dr Pepper", &["Dr. Pepper"]),
    ("Mountain Dew", &["Mtn Dew"]),
    ("Schweppes", &[]),
    ("Tango", &[]),
    ("Irn-Bru", &["Irn Bru"]),
    ("Ribena", &[]),
    ("Vimto", &[]),
    ("Robinsons", &[]),
    ("Oasis", &[]),
    ("Tropicana", &[]),
    ("Capri-Sun", &["Capri Sun"]),
    ("Fruit Shoot", &[]),
    ("Starbucks", &[]),
    ("Costa", &["Costa Coffee"]),
    ("Rubicon", &[]),
    ("Appletiser", &[]),
    ("Red Bull", &["RedBull"]),
    ("Monster", &["Monster Energy"]),
    ("Lucozade", &[]),
    ("Relentless", &[]),
    ("Rockstar", &[]),
    ("Prime", &[]),
    ("Old Jamaica", &[]),
    ("Lipton", &[]),
    ("Nestle", &["Nestlé"]),
    ("Nescafe", &["Nescafé"]),
    ("Alpro", &[]),
    ("Fever-Tree", &["Fever Tree"]),
    ("Cawston Press", &[]),
    ("Barr", &[]),
    ("Evian", &[]),
    ("Volvic", &[]),
    ("Highland Spring", &[]),
    ("Buxton", &[]),
    ("Perrier", &[]),
    ("San Pellegrino", &["S.Pellegrino", "S. Pellegrino"]),
    ("Powerade", &[]),
    ("Gatorade", &[]),
    ("Galaxy", &[]),
    ("Mars", &[]),
    ("Snickers", &[]),
    ("Twix", &[]),
    ("Milky Way", &[]),
    ("Maltesers", &[]),
    ("Lindt", &[]),
    ("Ferrero", &["Ferrero Rocher"]),
    ("Kinder", &[]),
    ("Haribo", &[]),
    ("Maynards", &["Maynards Bassetts"]),
    ("Rowntree's", &["Rowntrees"]),
    ("Skittles", &[]),
    ("Starburst", &[]),
    ("Reese's", &["Reeses"]),
    ("Hershey's", &["Hersheys"]),
    ("Oreo", &[]),
    ("Toblerone", &[]),
    ("Terry's", &["Terrys"]),
    ("Quality Street", &[]),
    ("Copella", &[]),
    ("Ocean Spray", &[]),
    ("Princes", &[]),
    ("Del Monte", &[]),
    ("Heinz", &[]),
    ("Walkers", &[]),
    ("Cadbury", &["Cadburys", "Cadbury's"]),
];

/// Normalized form used as the variation key.
///
/// Lowercase; apostrophes and periods dropped; other punctuation becomes a
/// space; whitespace collapsed. `"Dr. Pepper"` and `"dr pepper"` share a key.
pub fn normalize_variation(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '.'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical brand → variations, with a variation index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandVocabulary {
    brands: BTreeMap<String, BTreeSet<String>>,
    index: HashMap<String, String>,
    max_tokens: usize,
}

impl BrandVocabulary {
    /// Empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Vocabulary pre-filled with well-known brands
    pub fn seeded() -> Self {
        let mut vocabulary = Self::new();
        for (canonical, variations) in SEED_BRANDS {
            vocabulary.insert_snapshot_entry(canonical, variations.iter().copied());
        }
        vocabulary
    }

    /// Build from a `canonical → variations` snapshot.
    ///
    /// Variations already owned by an earlier brand are skipped with a warning.
    pub fn from_snapshot(snapshot: BTreeMap<String, Vec<String>>) -> Self {
        let mut vocabulary = Self::new();
        for (canonical, variations) in &snapshot {
            vocabulary.insert_snapshot_entry(canonical, variations.iter().map(String::as_str));
        }
        vocabulary
    }

    fn insert_snapshot_entry<'a>(&mut self, canonical: &str, variations: impl Iterator<Item = &'a str>) {
        if let Err(e) = self.register(canonical) {
            tracing::warn!(brand = %canonical, error = %e, "skipping brand from snapshot");
            return;
        }
        for variation in variations {
            if let Err(e) = self.add_variation(canonical, variation) {
                tracing::warn!(brand = %canonical, variation = %variation, error = %e, "skipping variation");
            }
        }
    }

    /// Load a snapshot file, or start from the seed list when it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no brand vocabulary found, starting from seed list");
            return Ok(Self::seeded());
        }
        let text = std::fs::read_to_string(path)?;
        let snapshot: BTreeMap<String, Vec<String>> = serde_json::from_str(&text)?;
        let vocabulary = Self::from_snapshot(snapshot);
        tracing::info!(
            path = %path.display(),
            brands = vocabulary.len(),
            variations = vocabulary.index.len(),
            "loaded brand vocabulary"
        );
        Ok(vocabulary)
    }

    /// `canonical → variations` map for persistence
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.brands
            .iter()
            .map(|(canonical, variations)| (canonical.clone(), variations.iter().cloned().collect()))
            .collect()
    }

    /// Write the snapshot atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.snapshot())?;
        tracing::info!(path = %path.display(), brands = self.len(), "saved brand vocabulary");
        Ok(())
    }

    /// Canonical brand for a variation, if known
    pub fn lookup(&self, text: &str) -> Option<&str> {
        let key = normalize_variation(text);
        if key.is_empty() {
            return None;
        }
        self.index.get(&key).map(String::as_str)
    }

    /// Add a canonical brand (its own first variation).
    ///
    /// Returns `Ok(true)` when newly added, `Ok(false)` when already present.
    pub fn register(&mut self, canonical: &str) -> std::result::Result<bool, VocabularyError> {
        let canonical = canonical.split_whitespace().collect::<Vec<_>>().join(" ");
        let key = normalize_variation(&canonical);
        if key.is_empty() {
            return Err(VocabularyError::EmptyBrand);
        }

        if self.brands.contains_key(&canonical) {
            return Ok(false);
        }
        if let Some(owner) = self.index.get(&key) {
            return Err(VocabularyError::VariationOwned {
                variation: canonical,
                owner: owner.clone(),
            });
        }

        self.index_variation(key, &canonical);
        self.brands
            .entry(canonical.clone())
            .or_default()
            .insert(canonical);
        Ok(true)
    }

    /// Attach a variation to an existing brand.
    ///
    /// Returns `Ok(false)` when the variation already maps to this brand.
    pub fn add_variation(&mut self, canonical: &str, variation: &str) -> std::result::Result<bool, VocabularyError> {
        if !self.brands.contains_key(canonical) {
            return Err(VocabularyError::UnknownBrand(canonical.to_string()));
        }
        let key = normalize_variation(variation);
        if key.is_empty() {
            return Err(VocabularyError::EmptyBrand);
        }

        match self.index.get(&key) {
            Some(owner) if owner == canonical => {
                let variation = variation.trim().to_string();
                let added = self
                    .brands
                    .get_mut(canonical)
                    .map(|set| set.insert(variation))
                    .unwrap_or(false);
                Ok(added)
            }
            Some(owner) => Err(VocabularyError::VariationOwned {
                variation: variation.to_string(),
                owner: owner.clone(),
            }),
            None => {
                self.index_variation(key, canonical);
                if let Some(set) = self.brands.get_mut(canonical) {
                    set.insert(variation.trim().to_string());
                }
                Ok(true)
            }
        }
    }

    /// Lookup, registering `candidate` as a new brand on a miss.
    ///
    /// Returns `(canonical, is_new)`. Callers sharing the vocabulary must run
    /// this inside one [`SharedVocabulary::with`] call.
    pub fn resolve_or_register(&mut self, candidate: &str) -> std::result::Result<(String, bool), VocabularyError> {
        if let Some(canonical) = self.lookup(candidate) {
            return Ok((canonical.to_string(), false));
        }
        let canonical = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
        let is_new = self.register(&canonical)?;
        Ok((canonical, is_new))
    }

    fn index_variation(&mut self, key: String, canonical: &str) {
        self.max_tokens = self.max_tokens.max(key.split(' ').count());
        self.index.insert(key, canonical.to_string());
    }

    /// Number of canonical brands
    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    pub fn contains_brand(&self, canonical: &str) -> bool {
        self.brands.contains_key(canonical)
    }

    pub fn variations(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.brands.get(canonical)
    }

    /// Longest variation, in normalized tokens
    pub fn max_variation_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Lock-guarded vocabulary shared by cleaning workers
#[derive(Debug, Clone, Default)]
pub struct SharedVocabulary {
    inner: Arc<Mutex<BrandVocabulary>>,
}

impl SharedVocabulary {
    pub fn new(vocabulary: BrandVocabulary) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vocabulary)),
        }
    }

    /// Run `f` as one critical section.
    ///
    /// A panic in another holder doesn't invalidate the vocabulary: every
    /// mutation leaves both maps consistent, so a poisoned lock is recovered.
    pub fn with<R>(&self, f: impl FnOnce(&mut BrandVocabulary) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> BrandVocabulary {
        self.with(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.with(|v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with(|v| v.is_empty())
    }

    /// Save the current state
    pub fn save(&self, path: &Path) -> Result<()> {
        self.snapshot().save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_variation() {
        assert_eq!(normalize_variation("Coca-Cola"), "coca cola");
        assert_eq!(normalize_variation("  Dr.  Pepper "), "dr pepper");
        assert_eq!(normalize_variation("REESE'S"), "reeses");
        assert_eq!(normalize_variation("Reese’s"), "reeses");
        assert_eq!(normalize_variation("---"), "");
    }

    #[test]
    fn test_seeded_lookup_case_and_punctuation_insensitive() {
        let vocabulary = BrandVocabulary::seeded();
        assert_eq!(vocabulary.lookup("coke"), Some("Coca-Cola"));
        assert_eq!(vocabulary.lookup("COCA COLA"), Some("Coca-Cola"));
        assert_eq!(vocabulary.lookup("dr pepper"), Some("Dr Pepper"));
        assert_eq!(vocabulary.lookup("Irn Bru"), Some("Irn-Bru"));
        assert_eq!(vocabulary.lookup("Unknown Brand"), None);
    }

    #[test]
    fn test_canonical_is_own_variation() {
        let vocabulary = BrandVocabulary::seeded();
        for canonical in vocabulary.snapshot().keys() {
            assert_eq!(vocabulary.lookup(canonical), Some(canonical.as_str()));
            assert!(vocabulary.variations(canonical).unwrap().contains(canonical));
        }
    }

    #[test]
    fn test_variation_owned_by_one_brand() {
        let mut vocabulary = BrandVocabulary::new();
        vocabulary.register("Coca-Cola").unwrap();
        vocabulary.register("Pepsi").unwrap();
        vocabulary.add_variation("Coca-Cola", "Coke").unwrap();

        let err = vocabulary.add_variation("Pepsi", "COKE").unwrap_err();
        assert_eq!(
            err,
            VocabularyError::VariationOwned {
                variation: "COKE".to_string(),
                owner: "Coca-Cola".to_string()
            }
        );
        assert_eq!(vocabulary.lookup("coke"), Some("Coca-Cola"));
    }

    #[test]
    fn test_register_conflicting_canonical_rejected() {
        let mut vocabulary = BrandVocabulary::new();
        vocabulary.register("Coca-Cola").unwrap();
        let err = vocabulary.register("Coca Cola").unwrap_err();
        assert!(matches!(err, VocabularyError::VariationOwned { .. }));
        assert_eq!(vocabulary.len(), 1);
    }

    #[test]
    fn test_resolve_or_register_is_new_once() {
        let mut vocabulary = BrandVocabulary::new();
        assert_eq!(vocabulary.resolve_or_register("Alpro").unwrap(), ("Alpro".to_string(), true));
        assert_eq!(vocabulary.resolve_or_register("ALPRO").unwrap(), ("Alpro".to_string(), false));
        assert_eq!(vocabulary.resolve_or_register("Alpro").unwrap(), ("Alpro".to_string(), false));
    }

    #[test]
    fn test_empty_brand_rejected() {
        let mut vocabulary = BrandVocabulary::new();
        assert_eq!(vocabulary.register("  - "), Err(VocabularyError::EmptyBrand));
        assert_eq!(
            vocabulary.add_variation("Nope", "x"),
            Err(VocabularyError::UnknownBrand("Nope".to_string()))
        );
    }

    #[test]
    fn test_max_variation_tokens_tracks_longest() {
        let mut vocabulary = BrandVocabulary::new();
        vocabulary.register("Heinz").unwrap();
        assert_eq!(vocabulary.max_variation_tokens(), 1);
        vocabulary.register("Cawston Press").unwrap();
        vocabulary.add_variation("Cawston Press", "Cawston Press Ltd").unwrap();
        assert_eq!(vocabulary.max_variation_tokens(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip_keeps_learned_brands() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("brands.json");

        let mut vocabulary = BrandVocabulary::seeded();
        vocabulary.resolve_or_register("Grandma Wilds").unwrap();
        vocabulary.save(&path).unwrap();

        let loaded = BrandVocabulary::load(&path).unwrap();
        assert_eq!(loaded, vocabulary);
        assert_eq!(loaded.lookup("grandma wilds"), Some("Grandma Wilds"));
    }

    #[test]
    fn test_load_missing_file_uses_seed() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = BrandVocabulary::load(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, BrandVocabulary::seeded());
    }

    #[test]
    fn test_from_snapshot_skips_conflicts() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("Alpha".to_string(), vec!["Shared".to_string()]);
        snapshot.insert("Beta".to_string(), vec!["shared".to_string(), "Beta Co".to_string()]);

        let vocabulary = BrandVocabulary::from_snapshot(snapshot);
        assert_eq!(vocabulary.lookup("shared"), Some("Alpha"));
        assert_eq!(vocabulary.lookup("beta co"), Some("Beta"));
    }

    #[test]
    fn test_shared_vocabulary_concurrent_registration_single_winner() {
        let shared = SharedVocabulary::new(BrandVocabulary::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.with(|v| v.resolve_or_register("Brand New Co").unwrap().1))
            })
            .collect();

        let new_count = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(new_count, 1);
        assert_eq!(shared.len(), 1);
    }
}

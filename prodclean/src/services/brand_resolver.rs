//! BrandResolver: find the brand of a cleaned product name
//!
//! **Algorithm:**
//! 1. Scan every token window of the name against the vocabulary, left to
//!    right and longest window first; every known brand found is listed and
//!    the first one is primary (`"Diet Coke"` → Coca-Cola)
//! 2. Only when nothing in the name is known, take the leading tokens up to the
//!    first generic noun from the stoplist (`"milk"`, `"juice"`, ...) and
//!    register them as a new brand
//!
//! Both steps run inside one vocabulary critical section.
//!
//! [`BrandResolver::resolve_batch`] splits the two steps across a whole batch
//! so the outcome does not depend on record order: every candidate is learned
//! against the vocabulary as it stood before the batch, and only then is each
//! record resolved against the grown vocabulary.

use std::collections::{BTreeSet, HashSet};

use super::brand_vocabulary::{normalize_variation, BrandVocabulary, SharedVocabulary};
use crate::models::raw::is_null_like;

/// Generic nouns that end a heuristic brand
pub const DEFAULT_BRAND_STOPLIST: &[&str] = &[
    "milk", "juice", "water", "drink", "soda", "cola", "lemonade", "squash", "smoothie",
    "coffee", "tea", "cappuccino", "latte", "espresso", "mocha", "instant", "chocolate",
    "bar", "biscuit", "cookie", "crisps", "chips", "cereal", "sauce", "ketchup", "mayonnaise",
    "beans", "soup", "bread", "cheese", "butter", "yogurt", "yoghurt", "cream", "ice",
    "sparkling", "still", "energy", "mineral", "spring", "tonic", "mixer", "syrup", "sweets",
    "gum", "mints", "cake", "nuts", "peanuts", "rice", "pasta", "noodles", "oil", "vinegar",
    "salt", "sugar", "flour", "honey", "jam", "spread", "original", "classic", "orange",
    "apple", "lemon", "lime", "strawberry", "cherry", "mango", "vanilla", "diet", "zero",
    "light", "free", "organic", "pack", "multipack", "can", "bottle",
];

/// Maximum tokens taken as a heuristic brand
const MAX_INFERRED_TOKENS: usize = 3;

/// Outcome of brand resolution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BrandResolution {
    /// Primary brand; empty when none could be determined
    pub brand: String,
    /// True only for the call that registered the primary brand
    pub is_new: bool,
    /// Every brand detected, primary first
    pub brands: Vec<String>,
}

impl BrandResolution {
    /// Brands after the primary one
    pub fn additional(&self) -> &[String] {
        self.brands.get(1..).unwrap_or(&[])
    }
}

/// One record's input to [`BrandResolver::resolve_batch`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BrandRequest<'a> {
    /// Brand field supplied by the source, if any
    pub explicit: Option<&'a str>,
    pub cleaned_name: &'a str,
}

/// BrandResolver
#[derive(Debug, Clone)]
pub struct BrandResolver {
    stoplist: HashSet<String>,
}

impl Default for BrandResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BRAND_STOPLIST.iter().map(|s| s.to_string()))
    }
}

impl BrandResolver {
    pub fn new(stoplist: impl IntoIterator<Item = String>) -> Self {
        Self {
            stoplist: stoplist
                .into_iter()
                .map(|s| normalize_variation(&s))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Resolve the brand of a cleaned name
    pub fn resolve(&self, cleaned_name: &str, vocabulary: &SharedVocabulary) -> BrandResolution {
        let tokens: Vec<&str> = cleaned_name.split_whitespace().collect();
        if tokens.is_empty() {
            return BrandResolution::default();
        }

        vocabulary.with(|v| {
            let mut brands = Vec::new();
            collect_known_brands(v, &tokens, &mut brands);
            if let Some(primary) = brands.first() {
                return BrandResolution {
                    brand: primary.clone(),
                    is_new: false,
                    brands,
                };
            }

            let Some(candidate) = self.infer_candidate(&tokens) else {
                tracing::debug!(name = %cleaned_name, "no brand candidate in name");
                return BrandResolution::default();
            };
            match v.resolve_or_register(&candidate) {
                Ok((canonical, is_new)) => {
                    if is_new {
                        tracing::info!(brand = %canonical, name = %cleaned_name, "registered new brand");
                    }
                    BrandResolution {
                        brand: canonical.clone(),
                        is_new,
                        brands: vec![canonical],
                    }
                }
                Err(e) => {
                    tracing::warn!(candidate = %candidate, error = %e, "could not register brand");
                    BrandResolution::default()
                }
            }
        })
    }

    /// Resolve a brand given explicitly by the source.
    ///
    /// Known spellings map to their canonical brand; unknown brands are
    /// registered as given. Secondary brands still come from the name.
    pub fn resolve_explicit(
        &self,
        raw_brand: &str,
        cleaned_name: &str,
        vocabulary: &SharedVocabulary,
    ) -> Option<BrandResolution> {
        let raw_brand = explicit_brand(Some(raw_brand))?;

        vocabulary.with(|v| {
            let (brand, is_new) = match v.resolve_or_register(&raw_brand) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(brand = %raw_brand, error = %e, "could not register explicit brand");
                    return None;
                }
            };
            if is_new {
                tracing::info!(brand = %brand, "registered new brand from source field");
            }

            let tokens: Vec<&str> = cleaned_name.split_whitespace().collect();
            let mut brands = vec![brand.clone()];
            collect_known_brands(v, &tokens, &mut brands);

            Some(BrandResolution { brand, is_new, brands })
        })
    }

    /// Resolve a batch of records independently of their order.
    ///
    /// **Algorithm:**
    /// 1. Register every unknown explicit brand in the batch
    /// 2. For names still holding no known brand, take the heuristic
    ///    candidate; drop candidates that are a leading token run of a longer
    ///    one (`"Grandma"` vs `"Grandma Wilds"`) and register the rest
    /// 3. Resolve every record against the grown vocabulary without
    ///    registering; `is_new` goes to the first record, in batch order,
    ///    whose primary brand was registered in steps 1 or 2
    ///
    /// Candidates are registered in sorted order, so the vocabulary ends up
    /// the same whatever the order of `requests`.
    pub fn resolve_batch(&self, requests: &[BrandRequest<'_>], vocabulary: &SharedVocabulary) -> Vec<BrandResolution> {
        vocabulary.with(|v| {
            let mut learned = HashSet::new();

            let explicit: BTreeSet<String> = requests
                .iter()
                .filter_map(|r| explicit_brand(r.explicit))
                .filter(|brand| v.lookup(brand).is_none())
                .collect();
            register_all(v, &explicit, &mut learned);

            let inferred: BTreeSet<String> = requests
                .iter()
                .filter(|r| explicit_brand(r.explicit).is_none())
                .filter_map(|r| {
                    let tokens: Vec<&str> = r.cleaned_name.split_whitespace().collect();
                    let mut known = Vec::new();
                    collect_known_brands(v, &tokens, &mut known);
                    if known.is_empty() {
                        self.infer_candidate(&tokens)
                    } else {
                        None
                    }
                })
                .collect();
            let keys: Vec<String> = inferred.iter().map(|c| normalize_variation(c)).collect();
            let inferred: BTreeSet<String> = inferred
                .into_iter()
                .filter(|candidate| {
                    let key = normalize_variation(candidate);
                    !keys.iter().any(|other| other.len() > key.len() && other.starts_with(&key) && other[key.len()..].starts_with(' '))
                })
                .collect();
            register_all(v, &inferred, &mut learned);

            let mut reported = HashSet::new();
            requests
                .iter()
                .map(|request| {
                    let tokens: Vec<&str> = request.cleaned_name.split_whitespace().collect();
                    let mut brands = Vec::new();
                    if let Some(canonical) = explicit_brand(request.explicit).and_then(|b| v.lookup(&b).map(str::to_string)) {
                        brands.push(canonical);
                    }
                    collect_known_brands(v, &tokens, &mut brands);

                    match brands.first().cloned() {
                        Some(brand) => {
                            let is_new = learned.contains(&brand) && reported.insert(brand.clone());
                            BrandResolution { brand, is_new, brands }
                        }
                        None => BrandResolution::default(),
                    }
                })
                .collect()
        })
    }

    /// Leading tokens before the first stoplist noun, capped.
    ///
    /// With no noun in the name, the first token alone is the candidate.
    fn infer_candidate(&self, tokens: &[&str]) -> Option<String> {
        let first_noun = tokens.iter().position(|t| self.is_stop_noun(t));
        let end = match first_noun {
            Some(0) => return None,
            Some(i) => i.min(MAX_INFERRED_TOKENS),
            None => 1,
        };

        let candidate: Vec<&str> = tokens[..end].to_vec();
        if !candidate.iter().any(|t| t.chars().any(char::is_alphabetic)) {
            return None;
        }
        Some(candidate.join(" "))
    }

    fn is_stop_noun(&self, token: &str) -> bool {
        let key = normalize_variation(token);
        if key.is_empty() {
            return false;
        }
        self.stoplist.contains(&key)
            || key
                .strip_suffix('s')
                .is_some_and(|singular| self.stoplist.contains(singular))
    }
}

/// Register each candidate, recording the ones that were new
fn register_all(v: &mut BrandVocabulary, candidates: &BTreeSet<String>, learned: &mut HashSet<String>) {
    for candidate in candidates {
        match v.resolve_or_register(candidate) {
            Ok((canonical, true)) => {
                tracing::info!(brand = %canonical, "registered new brand");
                learned.insert(canonical);
            }
            Ok((_, false)) => {}
            Err(e) => tracing::warn!(candidate = %candidate, error = %e, "could not register brand"),
        }
    }
}

/// Whitespace-normalized source brand; `None` when absent or null-like
fn explicit_brand(raw: Option<&str>) -> Option<String> {
    let brand = raw?.split_whitespace().collect::<Vec<_>>().join(" ");
    (!is_null_like(&brand)).then_some(brand)
}

/// Append known brands found in `tokens` that are not yet listed
fn collect_known_brands(v: &BrandVocabulary, tokens: &[&str], brands: &mut Vec<String>) {
    let max = v.max_variation_tokens();
    let mut i = 0;
    while i < tokens.len() {
        let window = max.min(tokens.len() - i);
        let hit = (1..=window).rev().find_map(|n| {
            v.lookup(&tokens[i..i + n].join(" "))
                .map(|canonical| (canonical.to_string(), n))
        });
        match hit {
            Some((canonical, n)) => {
                if !brands.contains(&canonical) {
                    brands.push(canonical);
                }
                i += n;
            }
            None => i += 1,
        }
    }
}

//! NameCleaner: turn a scraped product title into a clean display name
//!
//! **Stages (in order):**
//! 1. Strip a trailing barcode and price markers (PMP, RRP, `2 FOR £1`, `£1.65`, `75p`)
//! 2. Strip descriptor words (single, new, limited edition)
//! 3. Extract the package size; the longest leftmost match wins
//! 4. Collapse whitespace and Title Case
//!
//! Cleaning is idempotent: a cleaned name passes through unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

use super::normalizer::{collapse_whitespace, parse_number_token, UnitTable};

/// Descriptor phrases removed from names
const DESCRIPTORS: &[&str] = &[
    r"limited\s+edition",
    r"special\s+edition",
    r"singles?",
    r"new",
];

/// Words kept lowercase unless they open the name
const SMALL_WORDS: &[&str] = &["a", "an", "and", "at", "by", "de", "for", "in", "of", "on", "or", "the", "to", "with"];

/// Words kept uppercase
const ACRONYMS: &[&str] = &["UK", "US", "USA", "BBQ", "XL", "XXL", "UHT", "HP", "KP", "PG", "GB", "EU"];

/// Unit symbols that are never package sizes
const NON_SIZE_SYMBOLS: &[&str] = &["kcal", "kJ"];

static TRAILING_BARCODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\d{10,}\s*$").unwrap());

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Multibuy: "2 FOR £1", "3 for 99p"
        r"(?i)\b\d+\s*for\s*[£$€]?\s*\d+(?:\.\d{1,2})?p?\b",
        // Labelled price: "PMP £3.99", "RRP 1.50", "P.M. 99p"
        r"(?i)\b(?:pmp|pm|p\.m\.|price\s*marked|rrp)\s*[£$€]?\s*\d+(?:\.\d{1,2})?p?\b",
        // "NOW £1", "WAS 99p", "ONLY £2.50"
        r"(?i)\b(?:now|was|only)\s*(?:[£$€]\s*\d+(?:\.\d{1,2})?|\d+p\b)",
        // Bare currency amount, optionally followed by PM/PMP
        r"(?i)[£$€]\s*\d+(?:\.\d{1,2})?(?:\s*(?:pmp|pm)\b)?",
        // Pence: "75p"
        r"(?i)\b\d+p\b",
        // Marker with no amount
        r"(?i)\b(?:pmp|price\s*marked)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DESCRIPTOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b!?", DESCRIPTORS.join("|"))).unwrap()
});

static EMPTY_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]").unwrap());
static DANGLING_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[-,/|:+]+(?:\s+|$)").unwrap());

/// `<int> x <num>` or `<num>`, before the unit
const SIZE_NUMBER: &str = r"\b\d+\s*[x×]\s*\d+(?:[.,]\d+)?|\b\d+(?:[.,]\d+)?";

static DEFAULT_SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:{})\s*(?:fluid\s*ounces?|fl\s*oz|millilitres?|milliliters?|centilitres?|litres?|liters?|ltrs?|kilograms?|kilos?|grams?|ounces?|pounds?|lbs?|ml|cl|kg|mg|oz|lb|l|g)\b",
        SIZE_NUMBER
    ))
    .unwrap()
});

static PACKAGE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(\d+)\s*[x×]\s*)?(\d+(?:[.,]\d+)?)\s*(.+)$").unwrap());

/// Result of cleaning one name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedName {
    pub name: String,
    /// Matched size text, e.g. `"7 x 14.2g"`
    pub size: Option<String>,
}

/// NameCleaner
#[derive(Debug, Clone)]
pub struct NameCleaner {
    size_pattern: Regex,
}

impl Default for NameCleaner {
    fn default() -> Self {
        Self {
            size_pattern: DEFAULT_SIZE_PATTERN.clone(),
        }
    }
}

impl NameCleaner {
    /// Build the size pattern from the unit spellings in `units`
    pub fn new(units: &UnitTable) -> Self {
        let alternation = units
            .spellings_longest_first()
            .into_iter()
            .filter(|s| {
                units
                    .canonical(s)
                    .is_some_and(|c| !NON_SIZE_SYMBOLS.contains(&c))
            })
            .map(|s| regex::escape(s).replace(' ', r"\s*"))
            .collect::<Vec<_>>()
            .join("|");

        if alternation.is_empty() {
            tracing::warn!("unit table has no size units, falling back to built-in size pattern");
            return Self::default();
        }

        let pattern = format!(r"(?i)(?:{})\s*(?:{})\b", SIZE_NUMBER, alternation);
        let size_pattern = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::error!(error = %e, "invalid size pattern from unit table, using built-in");
                DEFAULT_SIZE_PATTERN.clone()
            }
        };

        Self { size_pattern }
    }

    /// Clean a raw product title.
    ///
    /// Falls back to the whitespace-normalized raw name when cleaning leaves nothing.
    pub fn clean(&self, raw: &str) -> CleanedName {
        let mut text = TRAILING_BARCODE.replace(raw, "").into_owned();

        for pattern in PRICE_PATTERNS.iter() {
            text = pattern.replace_all(&text, " ").into_owned();
        }

        text = DESCRIPTOR_PATTERN.replace_all(&text, " ").into_owned();

        let (text, size) = self.extract_size(&text);

        let name = title_case(&tidy(&text));
        if name.is_empty() {
            return CleanedName {
                name: collapse_whitespace(raw),
                size,
            };
        }

        CleanedName { name, size }
    }

    /// Remove every size-like token; return the longest (leftmost on ties)
    fn extract_size(&self, text: &str) -> (String, Option<String>) {
        let mut best: Option<(usize, &str)> = None;
        for m in self.size_pattern.find_iter(text) {
            let len = m.as_str().len();
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, m.as_str()));
            }
        }
        let size = best.map(|(_, s)| collapse_whitespace(s));
        let stripped = self.size_pattern.replace_all(text, " ").into_owned();
        (stripped, size)
    }
}

/// Drop empty brackets and dangling separators, collapse whitespace
fn tidy(text: &str) -> String {
    let text = EMPTY_BRACKETS.replace_all(text, " ");
    let text = DANGLING_SEPARATORS.replace_all(&text, " ");
    collapse_whitespace(&text)
        .trim_matches(|c: char| c.is_whitespace() || "-,/|:+&".contains(c))
        .to_string()
}

/// Title Case a name.
///
/// Words containing digits and known acronyms are kept; small joining words
/// stay lowercase except at the start; hyphenated parts are cased separately.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let bare: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if word.chars().any(|c| c.is_ascii_digit()) {
                word.to_string()
            } else if ACRONYMS.contains(&bare.to_uppercase().as_str()) {
                word.to_uppercase()
            } else if i > 0 && SMALL_WORDS.contains(&word.to_lowercase().as_str()) {
                word.to_lowercase()
            } else {
                word.split('-').map(capitalize).collect::<Vec<_>>().join("-")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase the first letter, lowercase the rest
fn capitalize(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut seen_letter = false;
    for c in part.chars() {
        if c.is_alphabetic() && !seen_letter {
            out.extend(c.to_uppercase());
            seen_letter = true;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// A parsed package size
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSize {
    pub text: String,
    /// Multipack count (`7` in `"7 x 14.2g"`)
    pub count: Option<u32>,
    pub value: f64,
    /// Canonical unit symbol
    pub unit: String,
}

impl PackageSize {
    /// Parse size text such as `"7 x 14.2g"` or `"1.5 Litres"`
    pub fn parse(text: &str, units: &UnitTable) -> Option<Self> {
        let text = collapse_whitespace(text);
        let caps = PACKAGE_SIZE.captures(&text)?;
        let count = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let value = parse_number_token(caps.get(2)?.as_str())?;
        let unit = units.canonical(caps.get(3)?.as_str().trim())?.to_string();
        Some(Self {
            text,
            count,
            value,
            unit,
        })
    }

    pub fn is_multipack(&self) -> bool {
        self.count.is_some_and(|c| c > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> CleanedName {
        NameCleaner::default().clean(raw)
    }

    #[test]
    fn test_price_marked_multipack() {
        let result = clean("Nescafe Cappuccino Unsweetened PMP £3.99 7 x 14.2g");
        assert_eq!(result.name, "Nescafe Cappuccino Unsweetened");
        assert_eq!(result.size.as_deref(), Some("7 x 14.2g"));
    }

    #[test]
    fn test_multibuy_and_pence() {
        assert_eq!(clean("Walkers Ready Salted 2 FOR £1 32.5g").name, "Walkers Ready Salted");
        assert_eq!(clean("Chewits Strawberry 75p").name, "Chewits Strawberry");
        assert_eq!(clean("Tango Orange NOW £1.25 500ml").name, "Tango Orange");
    }

    #[test]
    fn test_descriptors_removed() {
        let result = clean("NEW! Monster Energy Ultra Limited Edition 500ml");
        assert_eq!(result.name, "Monster Energy Ultra");
        assert_eq!(result.size.as_deref(), Some("500ml"));

        assert_eq!(clean("Mars Bar Single 51g").name, "Mars Bar");
    }

    #[test]
    fn test_longest_size_wins() {
        let result = clean("Coca-Cola Zero Sugar 24 x 330ml 7.92L");
        assert_eq!(result.size.as_deref(), Some("24 x 330ml"));
        assert_eq!(result.name, "Coca-Cola Zero Sugar");
    }

    #[test]
    fn test_leftmost_wins_on_equal_length() {
        let result = clean("Pepsi Max 500ml 330ml");
        assert_eq!(result.size.as_deref(), Some("500ml"));
    }

    #[test]
    fn test_compact_multipack() {
        let result = clean("Red Bull 4x250ml");
        assert_eq!(result.size.as_deref(), Some("4x250ml"));
        assert_eq!(result.name, "Red Bull");
    }

    #[test]
    fn test_trailing_barcode_removed() {
        assert_eq!(clean("Heinz Baked Beans 415g 5000157024671").name, "Heinz Baked Beans");
    }

    #[test]
    fn test_title_case_rules() {
        assert_eq!(title_case("IRN-BRU sugar free"), "Irn-Bru Sugar Free");
        assert_eq!(title_case("salt and vinegar"), "Salt and Vinegar");
        assert_eq!(title_case("and more"), "And More");
        assert_eq!(title_case("heinz bbq sauce"), "Heinz BBQ Sauce");
        assert_eq!(title_case("7UP free"), "7UP Free");
        assert_eq!(title_case("REESE'S cups"), "Reese's Cups");
    }

    #[test]
    fn test_idempotent() {
        let cleaner = NameCleaner::default();
        for raw in [
            "Nescafe Cappuccino Unsweetened PMP £3.99 7 x 14.2g",
            "NEW! Monster Energy Ultra Limited Edition 500ml",
            "coca-cola original 24 x 330ml cans",
            "Walkers - Ready Salted (32.5g)",
            "PMP £1",
        ] {
            let once = cleaner.clean(raw).name;
            let twice = cleaner.clean(&once).name;
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_empty_result_falls_back_to_raw() {
        let result = clean("  PMP   £1  ");
        assert_eq!(result.name, "PMP £1");
    }

    #[test]
    fn test_energy_units_are_not_sizes() {
        let result = clean("Protein Bar 200kcal 60g");
        assert_eq!(result.size.as_deref(), Some("60g"));
        assert_eq!(result.name, "Protein Bar 200kcal");
    }

    #[test]
    fn test_brackets_and_separators_tidied() {
        assert_eq!(clean("Walkers - Ready Salted (32.5g)").name, "Walkers Ready Salted");
    }

    #[test]
    fn test_package_size_parse() {
        let units = UnitTable::default();
        let size = PackageSize::parse("7 x 14.2g", &units).unwrap();
        assert_eq!(size.count, Some(7));
        assert_eq!(size.value, 14.2);
        assert_eq!(size.unit, "g");
        assert!(size.is_multipack());

        let size = PackageSize::parse("1.5 Litres", &units).unwrap();
        assert_eq!(size.count, None);
        assert_eq!(size.unit, "l");
        assert!(!size.is_multipack());

        assert!(PackageSize::parse("large", &units).is_none());
    }
}

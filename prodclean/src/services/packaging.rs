//! Packaging type detection from product names

use once_cell::sync::Lazy;
use regex::Regex;

/// (packaging label, is a can/tin, name pattern), checked in order
const PACKAGING_RULES: &[(&str, bool, &str)] = &[
    ("Glass Bottle", false, r"\bglass\s+bottles?\b"),
    ("Can", true, r"\bcans?\b|\bcanned\b"),
    ("Tin", true, r"\btins?\b|\btinned\b"),
    ("Bottle", false, r"\bbottles?\b"),
    ("Carton", false, r"\bcartons?\b|\btetra\s*paks?\b"),
    ("Pouch", false, r"\bpouch(?:es)?\b"),
    ("Jar", false, r"\bjars?\b"),
    ("Sachet", false, r"\bsachets?\b|\bstick\s+packs?\b"),
    ("Box", false, r"\bbox(?:es)?\b"),
    ("Bag", false, r"\bbags?\b"),
    ("Tub", false, r"\btubs?\b"),
    ("Multipack", false, r"\bmulti\s*-?\s*packs?\b"),
];

static RULES: Lazy<Vec<(&'static str, bool, Regex)>> = Lazy::new(|| {
    PACKAGING_RULES
        .iter()
        .filter_map(|(label, canned, pattern)| {
            Regex::new(&format!("(?i){}", pattern))
                .ok()
                .map(|re| (*label, *canned, re))
        })
        .collect()
});

/// Detected packaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packaging {
    pub label: &'static str,
    pub canned: bool,
}

/// First packaging rule matching `text`
pub fn detect_packaging(text: &str) -> Option<Packaging> {
    RULES
        .iter()
        .find(|(_, _, re)| re.is_match(text))
        .map(|(label, canned, _)| Packaging {
            label,
            canned: *canned,
        })
}

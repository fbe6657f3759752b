//! Record identity: product ID, slug, barcode

use sha2::{Digest, Sha256};

use crate::error::DegradedField;
use crate::models::schema::names;
use crate::models::SourceInfo;

/// Longest slug emitted
pub const MAX_SLUG_LEN: usize = 100;

/// Hex characters of the digest kept in a generated product ID
const PRODUCT_ID_HASH_LEN: usize = 12;

/// Accepted barcode lengths (EAN-8, UPC-A, EAN-13, GTIN-14)
const BARCODE_LENGTHS: &[usize] = &[8, 12, 13, 14];

const SYMBOL_WORDS: &[(char, &str)] = &[('&', " and "), ('+', " plus "), ('@', " at "), ('%', " percent ")];

const STRIPPED_SYMBOLS: &[char] = &['£', '$', '€', '¥', '¢', '™', '®', '©', '\'', '’'];

const ACCENT_FOLDS: &[(&str, char)] = &[
    ("áàâäãå", 'a'),
    ("éèêë", 'e'),
    ("íìîï", 'i'),
    ("óòôöõø", 'o'),
    ("úùûü", 'u'),
    ("ç", 'c'),
    ("ñ", 'n'),
    ("ý", 'y'),
];

/// Deterministic ID for a record without a source product id:
/// `<PREFIX>_<first 12 hex of sha256(source|brand|name|size)>`
pub fn generate_product_id(source: &SourceInfo, brand: &str, name: &str, size: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", source.name, brand, name, size).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}_{}", source.id_prefix(), &digest[..PRODUCT_ID_HASH_LEN])
}

/// URL slug from brand, name and size.
///
/// The brand is not repeated when the name already starts with it.
pub fn product_slug(brand: &str, name: &str, size: &str) -> String {
    let mut parts = Vec::new();
    if !brand.is_empty() && !name.to_lowercase().starts_with(&brand.to_lowercase()) {
        parts.push(brand);
    }
    parts.push(name);
    if !size.is_empty() {
        parts.push(size);
    }
    slugify(&parts.join(" "))
}

/// Lowercase ASCII, hyphen-separated, at most `MAX_SLUG_LEN` characters
pub fn slugify(text: &str) -> String {
    let mut expanded = String::with_capacity(text.len());
    for c in text.chars() {
        if STRIPPED_SYMBOLS.contains(&c) {
            continue;
        }
        if let Some((_, word)) = SYMBOL_WORDS.iter().find(|(symbol, _)| *symbol == c) {
            expanded.push_str(word);
            continue;
        }
        for lower in c.to_lowercase() {
            expanded.push(fold_accent(lower));
        }
    }

    let mut slug = String::with_capacity(expanded.len());
    for c in expanded.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');

    if slug.len() <= MAX_SLUG_LEN {
        return slug.to_string();
    }
    // ASCII only, so byte slicing is safe
    let cut = &slug[..MAX_SLUG_LEN];
    match cut.rfind('-') {
        Some(pos) if pos > MAX_SLUG_LEN / 2 => cut[..pos].to_string(),
        _ => cut.trim_end_matches('-').to_string(),
    }
}

fn fold_accent(c: char) -> char {
    ACCENT_FOLDS
        .iter()
        .find(|(accented, _)| accented.contains(c))
        .map(|(_, plain)| *plain)
        .unwrap_or(c)
}

/// Keep the digits of a barcode; accept EAN-8, UPC-A, EAN-13 and GTIN-14 lengths
pub fn normalize_barcode(raw: &str) -> Result<String, DegradedField> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if BARCODE_LENGTHS.contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(DegradedField::new(
            names::BARCODE,
            raw,
            format!("{} digits, expected 8, 12, 13 or 14", digits.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_is_deterministic() {
        let source = SourceInfo::new("Bestway Wholesale", "https://www.bestwaywholesale.co.uk");
        let a = generate_product_id(&source, "Heinz", "Baked Beans", "415g");
        let b = generate_product_id(&source, "Heinz", "Baked Beans", "415g");
        let c = generate_product_id(&source, "Heinz", "Baked Beans", "200g");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("BES_"));
        assert_eq!(a.len(), "BES_".len() + 12);
    }

    #[test]
    fn test_slug_symbols() {
        assert_eq!(slugify("Marks & Spencer 100% Orange Juice"), "marks-and-spencer-100-percent-orange-juice");
        assert_eq!(slugify("Nescafé Gold™ £3.99"), "nescafe-gold-3-99");
        assert_eq!(slugify("  --Pip + Nut--  "), "pip-plus-nut");
        assert_eq!(slugify("Walkers' Crisps"), "walkers-crisps");
    }

    #[test]
    fn test_product_slug_skips_repeated_brand() {
        assert_eq!(product_slug("Heinz", "Heinz Baked Beans", "415g"), "heinz-baked-beans-415g");
        assert_eq!(product_slug("Heinz", "Baked Beans", ""), "heinz-baked-beans");
        assert_eq!(product_slug("", "Baked Beans", "4 x 415g"), "baked-beans-4-x-415g");
    }

    #[test]
    fn test_slug_truncated_at_hyphen() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.ends_with("word"));
    }

    #[test]
    fn test_barcode_lengths() {
        assert_eq!(normalize_barcode("5 000157 024671").unwrap(), "5000157024671");
        assert_eq!(normalize_barcode("12345678").unwrap(), "12345678");
        assert!(normalize_barcode("12345").is_err());
        assert!(normalize_barcode("abc").is_err());
    }
}

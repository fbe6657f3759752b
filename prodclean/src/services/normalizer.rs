//! UnitAndTypeNormalizer: coerce raw values to their schema type
//!
//! Dispatch is on the target field's `FieldType`:
//! - text: trim and collapse whitespace
//! - numeric: leading number, thousands separators and decimal commas
//!   resolved, unit suffix mapped to a canonical symbol (never converted)
//! - boolean: fixed truthy/falsy sets
//! - list: split on `,` `;` `|`, trim, drop empties
//! - url: scheme + host required
//!
//! Values that cannot be coerced become a [`DegradedField`] and the schema
//! default; [`Normalizer::normalize_or_default`] logs and records them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::error::DegradedField;
use crate::models::raw::{is_null_like, value_to_text};
use crate::models::{FieldDef, FieldType, FieldValue};

/// Built-in unit spellings and their canonical symbols
pub const DEFAULT_UNITS: &[(&str, &str)] = &[
    ("ml", "ml"),
    ("mls", "ml"),
    ("millilitre", "ml"),
    ("millilitres", "ml"),
    ("milliliter", "ml"),
    ("milliliters", "ml"),
    ("cl", "cl"),
    ("centilitre", "cl"),
    ("centilitres", "cl"),
    ("l", "l"),
    ("lt", "l"),
    ("ltr", "l"),
    ("ltrs", "l"),
    ("litre", "l"),
    ("litres", "l"),
    ("liter", "l"),
    ("liters", "l"),
    ("g", "g"),
    ("gr", "g"),
    ("grm", "g"),
    ("gram", "g"),
    ("grams", "g"),
    ("kg", "kg"),
    ("kgs", "kg"),
    ("kilo", "kg"),
    ("kilos", "kg"),
    ("kilogram", "kg"),
    ("kilograms", "kg"),
    ("mg", "mg"),
    ("milligram", "mg"),
    ("milligrams", "mg"),
    ("oz", "oz"),
    ("ounce", "oz"),
    ("ounces", "oz"),
    ("fl oz", "fl oz"),
    ("floz", "fl oz"),
    ("fluid ounce", "fl oz"),
    ("fluid ounces", "fl oz"),
    ("lb", "lb"),
    ("lbs", "lb"),
    ("pound", "lb"),
    ("pounds", "lb"),
    ("kcal", "kcal"),
    ("kj", "kJ"),
];

/// Canonical symbols that measure volume
const VOLUME_SYMBOLS: &[&str] = &["ml", "cl", "l", "fl oz"];

const TRUTHY: &[&str] = &["yes", "true", "1", "y", "on"];
const FALSY: &[&str] = &["no", "false", "0", "n", "off"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d+(?:[,.' ]\d+)*").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(https?|ftp)://[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)+(?::\d+)?(?:[/?#]\S*)?$")
        .unwrap()
});

/// Unit spelling → canonical symbol
#[derive(Debug, Clone)]
pub struct UnitTable {
    aliases: HashMap<String, String>,
}

impl Default for UnitTable {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_UNITS.iter().map(|(a, c)| (a.to_string(), c.to_string())))
    }
}

impl UnitTable {
    /// Build from a configured table, replacing the built-in one
    pub fn from_overrides(table: &BTreeMap<String, String>) -> Self {
        Self::from_pairs(table.iter().map(|(a, c)| (a.clone(), c.clone())))
    }

    fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> Self {
        let aliases = pairs
            .map(|(alias, canonical)| (unit_key(&alias), canonical.trim().to_string()))
            .filter(|(alias, canonical)| !alias.is_empty() && !canonical.is_empty())
            .collect();
        Self { aliases }
    }

    /// Canonical symbol for a unit spelling (`"ML"` → `"ml"`)
    pub fn canonical(&self, unit: &str) -> Option<&str> {
        self.aliases.get(&unit_key(unit)).map(String::as_str)
    }

    /// Spellings ordered longest first (regex alternation order)
    pub fn spellings_longest_first(&self) -> Vec<&str> {
        let mut spellings: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        spellings.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        spellings
    }

    pub fn is_volume(symbol: &str) -> bool {
        VOLUME_SYMBOLS.contains(&symbol)
    }
}

/// Lowercase, whitespace collapsed to single spaces
fn unit_key(unit: &str) -> String {
    unit.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A number with an optional canonical unit symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Option<String>,
}

/// Trim and collapse internal whitespace
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Parse a numeric token with thousands separators or a decimal comma.
///
/// `"1,234.5"` → 1234.5, `"1.234,5"` → 1234.5, `"14,2"` → 14.2,
/// `"1,234"` → 1234 (a single comma followed by exactly three digits is a
/// thousands separator).
pub fn parse_number_token(token: &str) -> Option<f64> {
    let token: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    let token = token.trim_end_matches(['.', ',']);
    if token.is_empty() {
        return None;
    }

    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(c)) => {
            let commas = token.matches(',').count();
            let after = token.len() - c - 1;
            if commas == 1 && after != 3 {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (Some(_), None) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// UnitAndTypeNormalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    units: UnitTable,
}

impl Normalizer {
    pub fn new(units: UnitTable) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    /// Coerce `raw` to the type of `field`.
    ///
    /// Missing, null and null-like inputs yield the schema default without
    /// counting as degradation.
    pub fn normalize(&self, field: &FieldDef, raw: &Value) -> Result<FieldValue, DegradedField> {
        if raw.is_null() {
            return Ok(field.default_value());
        }

        match field.field_type {
            FieldType::Text => Ok(FieldValue::Text(
                value_to_text(raw).map(|t| collapse_whitespace(&t)).unwrap_or_default(),
            )),
            FieldType::Numeric => self.normalize_numeric(field, raw),
            FieldType::Boolean => normalize_boolean(field, raw),
            FieldType::List => Ok(FieldValue::List(normalize_list(raw))),
            FieldType::Url => normalize_url_value(field, raw),
        }
    }

    /// [`Normalizer::normalize`], degrading to the schema default on failure
    pub fn normalize_or_default(
        &self,
        field: &FieldDef,
        raw: &Value,
        degraded: &mut Vec<DegradedField>,
    ) -> FieldValue {
        match self.normalize(field, raw) {
            Ok(value) => value,
            Err(d) => {
                tracing::warn!(field = %d.field, raw = %d.raw, reason = %d.reason, "degraded field value");
                degraded.push(d);
                field.default_value()
            }
        }
    }

    fn normalize_numeric(&self, field: &FieldDef, raw: &Value) -> Result<FieldValue, DegradedField> {
        match raw {
            Value::Number(n) => match n.as_f64().filter(|v| v.is_finite()) {
                Some(v) => Ok(FieldValue::number(v)),
                None => Err(DegradedField::new(field.name, n.to_string(), "number out of range")),
            },
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(DegradedField::new(
                field.name,
                raw.to_string(),
                "expected a number",
            )),
            _ => {
                let text = value_to_text(raw).unwrap_or_default();
                if text.is_empty() {
                    return Ok(FieldValue::Numeric(None));
                }
                // The unit is dropped: numeric schema fields name their unit
                // ("Protein (g)"), and the size value/unit pair is filled from
                // the full size string instead
                match self.parse_quantity(&text) {
                    Some(q) => Ok(FieldValue::number(q.value)),
                    None => Err(DegradedField::new(field.name, text, "no leading number")),
                }
            }
        }
    }

    /// Parse `"250ML"` into `250` + `"ml"`.
    ///
    /// Leading currency symbols are skipped. A trailing word that is not in
    /// the unit table leaves `unit` as `None`.
    pub fn parse_quantity(&self, text: &str) -> Option<Quantity> {
        let text = text.trim().trim_start_matches(['£', '$', '€', '~']).trim_start();
        if text.is_empty() || is_null_like(text) {
            return None;
        }

        let m = LEADING_NUMBER.find(text)?;
        let token = m.as_str();
        let rest = &text[m.end()..];

        let value = parse_number_token(token)?;
        let unit_text = rest
            .trim()
            .trim_end_matches(|c: char| !c.is_alphanumeric())
            .trim();
        let unit = if unit_text.is_empty() {
            None
        } else {
            self.units.canonical(unit_text).map(str::to_string).or_else(|| {
                unit_text
                    .split_whitespace()
                    .next()
                    .and_then(|w| self.units.canonical(w))
                    .map(str::to_string)
            })
        };

        Some(Quantity { value, unit })
    }
}

fn normalize_boolean(field: &FieldDef, raw: &Value) -> Result<FieldValue, DegradedField> {
    match raw {
        Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Ok(FieldValue::Boolean(true)),
            Some(v) if v == 0.0 => Ok(FieldValue::Boolean(false)),
            _ => Err(DegradedField::new(field.name, n.to_string(), "not a boolean")),
        },
        _ => {
            let Some(text) = value_to_text(raw) else {
                return Ok(FieldValue::Boolean(false));
            };
            match parse_bool(&text) {
                Some(b) => Ok(FieldValue::Boolean(b)),
                None => Err(DegradedField::new(field.name, text, "not a boolean")),
            }
        }
    }
}

/// Truthy/falsy sets; `None` for anything else
pub fn parse_bool(text: &str) -> Option<bool> {
    let t = text.trim().to_lowercase();
    if TRUTHY.contains(&t.as_str()) {
        Some(true)
    } else if FALSY.contains(&t.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Split on `,` `;` `|`, trim, drop empties and null-like items
pub fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';', '|'])
        .map(collapse_whitespace)
        .filter(|item| !is_null_like(item))
        .collect()
}

fn normalize_list(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_text)
            .flat_map(|item| split_list(&item))
            .collect(),
        _ => value_to_text(raw).map(|t| split_list(&t)).unwrap_or_default(),
    }
}

/// Validate a URL; protocol-relative `//host/...` gains `https:`
pub fn normalize_url(text: &str) -> Option<String> {
    let text = text.trim();
    let candidate = if text.starts_with("//") {
        format!("https:{}", text)
    } else {
        text.to_string()
    };
    URL.is_match(&candidate).then_some(candidate)
}

fn normalize_url_value(field: &FieldDef, raw: &Value) -> Result<FieldValue, DegradedField> {
    let Some(text) = value_to_text(raw) else {
        return Ok(FieldValue::Text(String::new()));
    };
    match normalize_url(&text) {
        Some(url) => Ok(FieldValue::Text(url)),
        None => Err(DegradedField::new(field.name, text, "not an absolute http(s) URL")),
    }
}

//! InferenceEngine: derive schema facts from free text
//!
//! Every rule is a table row `(field, pattern)` evaluated against text; adding
//! a nutrient, allergen or certification means adding a row, not a branch.
//!
//! **Rule families (in evaluation order):**
//! 1. Nutrients: first match per nutrient wins; structured nutrition text is
//!    scanned before the description
//! 2. Ingredients: the `Ingredients: ...` sentence, split into a list
//! 3. Allergens: keyword lexicon over ingredients and allergy text, with
//!    "may contain" and "free from" phrases removed first
//! 4. Health and certification keywords over name and description
//! 5. Implications (vegan ⇒ vegetarian) and nutrition thresholds
//!
//! **Precedence:** fields the source supplied explicitly are never
//! overwritten by inference, including explicit `false`.
//!
//! **Known limitation:** no allergen keyword means `Contains X = false`. That
//! reads as "not detected", not "verified absent"; products without
//! ingredient text report every allergen as false.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashSet};

use super::normalizer::{collapse_whitespace, parse_number_token, split_list};
use crate::models::schema::{names, MASTER_SCHEMA};
use crate::models::{FactSet, FieldType, FieldValue};

const NUM: &str = r"(?P<value>\d+(?:[.,]\d+)?)";
const SEP: &str = r"[:\s]*(?:<\s*)?";

/// Nutrient field → patterns (with `NUM`/`SEP` placeholders), tried in order.
///
/// A match whose `skip` group participated is ignored, which keeps
/// "saturated fat 1.1g" from answering for total fat.
const NUTRIENT_RULES: &[(&str, &[&str])] = &[
    (names::CALORIES, &[r"\b(?:energy|calories)\bSEPNUM\s*kcal\b", r"NUM\s*kcal\b", r"\bcalories\bSEPNUM\b"]),
    (names::ENERGY_KJ, &[r"NUM\s*kj\b"]),
    (names::TOTAL_FAT, &[r"(?P<skip>saturated\s+|trans\s+|mono-?unsaturated\s+|poly-?unsaturated\s+)?\bfat\bSEPNUM\s*g\b"]),
    (names::SATURATED_FAT, &[r"\bsaturate[sd]?\b(?:\s+fat)?SEPNUM\s*g\b", r"\bsat\.?\s+fat\bSEPNUM\s*g\b"]),
    ("Trans Fat (g)", &[r"\btrans\s+fat\bSEPNUM\s*g\b"]),
    ("Monounsaturated Fat (g)", &[r"\bmono-?unsaturate[sd]?\b(?:\s+fat)?SEPNUM\s*g\b"]),
    ("Polyunsaturated Fat (g)", &[r"\bpoly-?unsaturate[sd]?\b(?:\s+fat)?SEPNUM\s*g\b"]),
    ("Cholesterol (mg)", &[r"\bcholesterol\bSEPNUM\s*mg\b"]),
    (names::CARBOHYDRATES, &[r"\bcarbohydrates?\bSEPNUM\s*g\b", r"\bcarbs?\bSEPNUM\s*g\b"]),
    (names::SUGARS, &[r"(?P<skip>added\s+)?\bsugars?\bSEPNUM\s*g\b"]),
    ("Added Sugars (g)", &[r"\badded\s+sugars?\bSEPNUM\s*g\b"]),
    (names::FIBER, &[r"\b(?:dietary\s+)?fib(?:re|er)\bSEPNUM\s*g\b"]),
    (names::PROTEIN, &[r"\bproteins?\bSEPNUM\s*g\b"]),
    (names::SALT, &[r"\bsalt\bSEPNUM\s*g\b"]),
    (names::SODIUM, &[r"\bsodium\bSEPNUM\s*mg\b"]),
    ("Caffeine (mg)", &[r"\bcaffeine\bSEPNUM\s*mg\b", r"NUM\s*mg\s+(?:of\s+)?caffeine\b"]),
    ("Vitamin A (µg)", &[r"\bvitamin\s+a\bSEPNUM\s*(?:µg|ug|mcg)"]),
    ("Vitamin C (mg)", &[r"\bvitamin\s+c\bSEPNUM\s*mg\b"]),
    ("Vitamin D (µg)", &[r"\bvitamin\s+d3?\bSEPNUM\s*(?:µg|ug|mcg)"]),
    ("Vitamin E (mg)", &[r"\bvitamin\s+e\bSEPNUM\s*mg\b"]),
    ("Vitamin B6 (mg)", &[r"\bvitamin\s+b6\bSEPNUM\s*mg\b"]),
    ("Vitamin B12 (µg)", &[r"\bvitamin\s+b12\bSEPNUM\s*(?:µg|ug|mcg)"]),
    ("Folate (µg)", &[r"\b(?:folate|folic\s+acid)\bSEPNUM\s*(?:µg|ug|mcg)"]),
    ("Calcium (mg)", &[r"\bcalcium\bSEPNUM\s*mg\b"]),
    ("Iron (mg)", &[r"\biron\bSEPNUM\s*mg\b"]),
    ("Magnesium (mg)", &[r"\bmagnesium\bSEPNUM\s*mg\b"]),
    ("Potassium (mg)", &[r"\bpotassium\bSEPNUM\s*mg\b"]),
    ("Zinc (mg)", &[r"\bzinc\bSEPNUM\s*mg\b"]),
];

/// Per-100 g field → per-serving field
const PER_SERVING_FIELDS: &[(&str, &str)] = &[
    (names::CALORIES, "Calories per Serving (kcal)"),
    (names::TOTAL_FAT, "Total Fat per Serving (g)"),
    (names::SATURATED_FAT, "Saturated Fat per Serving (g)"),
    (names::CARBOHYDRATES, "Total Carbohydrates per Serving (g)"),
    (names::SUGARS, "Total Sugars per Serving (g)"),
    (names::FIBER, "Dietary Fiber per Serving (g)"),
    (names::PROTEIN, "Protein per Serving (g)"),
    (names::SALT, "Salt per Serving (g)"),
    (names::SODIUM, "Sodium per Serving (mg)"),
];

/// Allergen field → trigger keywords
pub const DEFAULT_ALLERGEN_LEXICON: &[(&str, &[&str])] = &[
    ("Contains Peanuts", &["peanut", "groundnut", "arachis"]),
    ("Contains Tree Nuts", &["nut", "tree nut", "almond", "hazelnut", "walnut", "cashew", "pecan", "pistachio", "macadamia", "brazil nut"]),
    ("Contains Milk", &["milk", "cream", "butter", "buttermilk", "cheese", "whey", "casein", "lactose", "yogurt", "yoghurt"]),
    ("Contains Eggs", &["egg", "albumen"]),
    ("Contains Wheat", &["wheat", "spelt", "durum", "semolina", "kamut"]),
    ("Contains Gluten", &["gluten", "wheat", "barley", "rye", "oat", "spelt"]),
    ("Contains Soybeans", &["soy", "soya", "soybean", "tofu", "edamame"]),
    ("Contains Fish", &["fish", "anchovy", "anchovies", "cod", "salmon", "tuna", "haddock", "mackerel", "sardine", "pollock"]),
    ("Contains Shellfish", &["shellfish", "crustacean", "shrimp", "prawn", "crab", "lobster", "crayfish", "langoustine"]),
    ("Contains Sesame", &["sesame", "tahini"]),
    ("Contains Mustard", &["mustard"]),
    ("Contains Celery", &["celery", "celeriac"]),
    ("Contains Lupin", &["lupin", "lupine"]),
    ("Contains Sulphites", &["sulphite", "sulfite", "sulphur dioxide", "sulfur dioxide", "metabisulphite"]),
    ("Contains Molluscs", &["mollusc", "mussel", "oyster", "squid", "clam", "scallop", "octopus"]),
];

/// Phrases that look like an allergen keyword but aren't one
const ALLERGEN_EXCLUSIONS: &[(&str, &[&str])] = &[
    ("Contains Milk", &["cocoa butter", "shea butter", "peanut butter", "nut butter", "coconut milk", "coconut cream", "almond milk", "oat milk", "soya milk", "soy milk", "rice milk", "cream of tartar", "milk thistle"]),
    ("Contains Tree Nuts", &["coconut", "nutmeg", "butternut", "nutrition", "nutritional", "doughnut", "donut"]),
];

/// Boolean field and/or certification label → pattern
const HEALTH_RULES: &[(Option<&str>, Option<&str>, &str)] = &[
    (Some("Organic"), Some("Organic"), r"\borganic\b|\bsoil\s+association\b"),
    (Some("Vegan"), None, r"\bvegan\b|\bplant[\s-]based\b|\bsuitable\s+for\s+vegans\b"),
    (Some("Vegetarian"), None, r"\bvegetarian\b|\bsuitable\s+for\s+vegetarians\b"),
    (Some("Gluten-Free"), None, r"\bgluten[\s-]free\b|\bfree\s+from\s+gluten\b|\bno\s+gluten\b"),
    (Some("Dairy-Free"), None, r"\bdairy[\s-]free\b|\bfree\s+from\s+dairy\b|\bno\s+dairy\b"),
    (Some("Lactose-Free"), None, r"\blactose[\s-]free\b|\bfree\s+from\s+lactose\b"),
    (Some(names::NUT_FREE), None, r"\bnut[\s-]free\b|\bfree\s+from\s+nuts?\b|\bno\s+nuts\b"),
    (Some("Egg-Free"), None, r"\begg[\s-]free\b|\bfree\s+from\s+eggs?\b"),
    (Some("Soy-Free"), None, r"\bsoya?[\s-]free\b|\bfree\s+from\s+soya?\b"),
    (Some("Shellfish-Free"), None, r"\bshellfish[\s-]free\b|\bfree\s+from\s+shellfish\b"),
    (Some("Non-GMO"), Some("Non-GMO"), r"\bnon[\s-]?gmo\b|\bgmo[\s-]free\b|\bnot\s+genetically\s+modified\b|\bno\s+gm\s+ingredients\b"),
    (Some("Keto-Friendly"), None, r"\bketo(?:genic)?\b"),
    (Some("Paleo-Friendly"), None, r"\bpaleo\b"),
    (Some("Kosher"), Some("Kosher"), r"\bkosher\b"),
    (Some("Halal"), Some("Halal"), r"\bhalal\b"),
    (Some("Fair Trade"), Some("Fairtrade"), r"\bfair\s*trade\b"),
    (Some("Sugar-Free"), None, r"\bsugar[\s-]free\b|\bzero\s+sugar\b|\bno\s+sugar\b"),
    (Some("No Added Sugar"), None, r"\bno\s+added\s+sugars?\b"),
    (Some(names::LOW_FAT), None, r"\blow[\s-]fat\b"),
    (Some(names::LOW_SUGAR), None, r"\blow[\s-]sugar\b"),
    (Some(names::LOW_SODIUM), None, r"\blow[\s-](?:sodium|salt)\b"),
    (Some(names::LOW_CARB), None, r"\blow[\s-]carb(?:ohydrate)?s?\b"),
    (Some(names::HIGH_PROTEIN), None, r"\bhigh[\s-]protein\b|\bprotein[\s-]packed\b"),
    (Some(names::HIGH_FIBER), None, r"\bhigh[\s-]fib(?:re|er)\b|\bsource\s+of\s+fib(?:re|er)\b"),
    (Some("No Preservatives"), None, r"\bno\s+preservatives?\b|\bpreservative[\s-]free\b|\bfree\s+from\s+preservatives\b"),
    (Some("No Artificial Colours"), None, r"\bno\s+artificial\s+colou?rs?\b|\bno\s+artificial\s+flavou?r(?:ing)?s?\s+(?:or|and|&)\s+colou?rs?\b"),
    (Some("No Artificial Flavours"), None, r"\bno\s+artificial\s+(?:colou?rs?\s+(?:or|and|&)\s+)?flavou?r(?:ing)?s?\b"),
    (Some("Natural Ingredients"), None, r"\b(?:all|100%)\s+natural\b|\bnatural\s+ingredients\b"),
    (Some("Caffeine-Free"), None, r"\bcaffeine[\s-]free\b|\bdecaf(?:feinated)?\b"),
    (Some("Alcohol-Free"), None, r"\balcohol[\s-]free\b|\bnon[\s-]alcoholic\b"),
    (Some("Wholegrain"), None, r"\bwhole\s*grains?\b"),
    (None, Some("Rainforest Alliance"), r"\brainforest\s+alliance\b"),
    (None, Some("Vegan Society"), r"\bvegan\s+society\b"),
    (None, Some("Red Tractor"), r"\bred\s+tractor\b"),
    (None, Some("Coeliac UK"), r"\bcoeliac\s+uk\b"),
    (None, Some("RSPCA Assured"), r"\brspca\s+assured\b"),
];

/// (if this flag is true, then this flag is true)
const IMPLICATIONS: &[(&str, &str)] = &[
    ("Vegan", "Vegetarian"),
    ("Vegan", "Dairy-Free"),
    ("Vegan", "Egg-Free"),
];

#[derive(Debug, Clone, Copy)]
enum Threshold {
    Above(f64),
    Below(f64),
}

/// Flag set from a known nutrient value
const NUTRITION_FLAGS: &[(&str, &str, Threshold)] = &[
    (names::HIGH_PROTEIN, names::PROTEIN, Threshold::Above(10.0)),
    (names::HIGH_FIBER, names::FIBER, Threshold::Above(5.0)),
    (names::LOW_SUGAR, names::SUGARS, Threshold::Below(5.0)),
    (names::LOW_SODIUM, names::SODIUM, Threshold::Below(140.0)),
    (names::LOW_CARB, names::CARBOHYDRATES, Threshold::Below(10.0)),
    (names::LOW_FAT, names::TOTAL_FAT, Threshold::Below(3.0)),
];

/// Country spellings normalized on output
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "United Kingdom"),
    ("u.k", "United Kingdom"),
    ("united kingdom", "United Kingdom"),
    ("great britain", "United Kingdom"),
    ("britain", "United Kingdom"),
    ("gb", "United Kingdom"),
    ("usa", "United States"),
    ("us", "United States"),
    ("u.s.a", "United States"),
    ("united states", "United States"),
    ("united states of america", "United States"),
    ("holland", "Netherlands"),
    ("the netherlands", "Netherlands"),
];

static INGREDIENTS_SENTENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bingredients?\s*[:\-]\s*(?P<value>.+?)(?:\.\s|\.$|\n\s*\n|\b(?:allergy|allergens|nutrition|storage|may\s+contain|energy)\b|$)").unwrap()
});
static PERCENT_PARENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(\s*\d+(?:[.,]\d+)?\s*%\s*\)|\s+\d+(?:[.,]\d+)?\s*%").unwrap());
static MAY_CONTAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bmay\s+(?:also\s+)?contain(?:\s+traces\s+of)?\s*:?\s*(?P<value>[^.;\n]+)").unwrap()
});
/// `keep` marks "free range" style phrases, where the preceding word is a real ingredient
static FREE_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bfree\s+from\s+[a-z]+(?:\s*(?:,|or|and|&)\s*[a-z]+)*|\b[a-z]+-free\b|\b[a-z]+\s+free\b(?P<keep>\s+(?:range|run|flowing|standing|trade))?|\bno\s+[a-z]+\b",
    )
    .unwrap()
});
static LIST_JOINERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+(?:and|or|&)\s+").unwrap());
static ALLERGY_WARNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:allergy\s+(?:advice|information|warning)|allergens?)\s*[:\-]\s*(?P<value>[^.\n]+)").unwrap()
});
static SERVING_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bserving\s+size\s*[:\-]?\s*(?P<value>[^.;,\n]+)").unwrap());
static SERVINGS_PER_PACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bservings\s+per\s+(?:container|pack)\s*[:\-]?\s*(?P<value>\d+)|\b(?:makes|contains)\s+(?P<alt>\d+)\s+servings\b").unwrap()
});
static COUNTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:product\s+of|made\s+in|produced\s+in|country\s+of\s+origin\s*[:\-]?)\s+(?:the\s+)?(?P<value>[a-z][a-z .]{1,30}?)\s*(?:[,;()\n]|\.(?:\s|$)|$)").unwrap()
});
static STORAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?P<value>(?:store|keep)\s+(?:in|at|below|refrigerated|chilled|frozen|cool|upright)\b[^.;\n]*)").unwrap()
});
static USAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:directions|how\s+to\s+use|usage|preparation|serving\s+suggestion)\s*[:\-]\s*(?P<value>[^\n]+?)(?:\.\s|\.$|$)").unwrap()
});

static NUTRIENTS: Lazy<Vec<(&'static str, Vec<Regex>)>> = Lazy::new(|| {
    NUTRIENT_RULES
        .iter()
        .map(|(field, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| compile(&p.replace("SEP", SEP).replace("NUM", NUM)))
                .collect();
            (*field, compiled)
        })
        .collect()
});

static HEALTH: Lazy<Vec<(Option<&'static str>, Option<&'static str>, Regex)>> = Lazy::new(|| {
    HEALTH_RULES
        .iter()
        .filter_map(|(field, cert, p)| compile(p).map(|re| (*field, *cert, re)))
        .collect()
});

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern = %pattern, error = %e, "invalid inference pattern");
            None
        }
    }
}

/// One allergen keyword rule
#[derive(Debug, Clone)]
struct AllergenRule {
    field: String,
    label: String,
    keywords: Regex,
    exclusions: Option<Regex>,
}

impl AllergenRule {
    fn build(field: &str, keywords: &[String]) -> Option<Self> {
        let label = field.strip_prefix("Contains ").unwrap_or(field).to_string();
        let words: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(&k).replace(' ', r"\s+"))
            .collect();
        if words.is_empty() {
            return None;
        }
        let keywords = compile(&format!(r"\b(?:{})(?:s|es)?\b", words.join("|")))?;

        let exclusions = ALLERGEN_EXCLUSIONS
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, phrases)| {
                let alternation: Vec<String> = phrases.iter().map(|p| regex::escape(p).replace(' ', r"\s+")).collect();
                compile(&format!(r"\b(?:{})\b", alternation.join("|")))
            });

        Some(Self {
            field: field.to_string(),
            label,
            keywords,
            exclusions,
        })
    }

    fn matches(&self, text: &str) -> bool {
        match &self.exclusions {
            Some(ex) => self.keywords.is_match(&ex.replace_all(text, " ")),
            None => self.keywords.is_match(text),
        }
    }
}

/// Texts the engine reads for one record
#[derive(Debug, Clone, Default)]
pub struct InferenceInput<'a> {
    /// Cleaned product name
    pub name: &'a str,
    /// Description, bullets and other free text, joined
    pub description: &'a str,
    /// Ingredients text supplied by the source, if any
    pub ingredients: Option<&'a str>,
    /// Allergy statement supplied by the source, if any
    pub allergy_warning: Option<&'a str>,
    /// Flattened nested nutrition objects (`"Energy 1880kJ; Fat 3.2g"`)
    pub nutrition: &'a str,
    /// Flattened per-serving nutrition
    pub nutrition_per_serving: &'a str,
}

/// InferenceEngine
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    allergens: Vec<AllergenRule>,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        let lexicon = DEFAULT_ALLERGEN_LEXICON
            .iter()
            .map(|(field, words)| (field.to_string(), words.iter().map(|w| w.to_string()).collect()))
            .collect();
        Self::with_allergen_lexicon(&lexicon)
    }
}

impl InferenceEngine {
    /// Build with an allergen lexicon (`"Contains X"` field → keywords).
    ///
    /// Entries naming a field that is not a boolean schema field are skipped.
    pub fn with_allergen_lexicon(lexicon: &BTreeMap<String, Vec<String>>) -> Self {
        let mut allergens = Vec::new();
        // Keep schema order so Allergens lists are stable
        for def in MASTER_SCHEMA.fields() {
            let Some(keywords) = lexicon.get(def.name) else {
                continue;
            };
            if let Some(rule) = AllergenRule::build(def.name, keywords) {
                allergens.push(rule);
            }
        }
        for field in lexicon.keys() {
            let known = MASTER_SCHEMA
                .get(field)
                .is_some_and(|d| d.field_type == FieldType::Boolean);
            if !known {
                tracing::warn!(field = %field, "allergen lexicon entry is not a boolean schema field, ignored");
            }
        }
        Self { allergens }
    }

    /// Add inferred facts to `facts`; fields in `explicit` are left untouched
    pub fn infer(&self, input: &InferenceInput<'_>, facts: &mut FactSet, explicit: &HashSet<&'static str>) {
        self.infer_nutrients(input, facts, explicit);

        let extracted_ingredients = extract_ingredients_text(input.description);
        let ingredients_text = input.ingredients.map(str::to_string).or(extracted_ingredients);
        if let Some(text) = &ingredients_text {
            if !explicit.contains(names::INGREDIENTS_LIST) {
                facts.set_if_absent(names::INGREDIENTS_LIST, FieldValue::List(ingredients_list(text)));
            }
        }

        let allergy_text = input
            .allergy_warning
            .map(str::to_string)
            .or_else(|| capture_text(&ALLERGY_WARNING, input.description));
        if let Some(text) = &allergy_text {
            set_text_if_absent(facts, explicit, names::ALLERGY_WARNING, text);
        }

        self.infer_allergens(ingredients_text.as_deref(), allergy_text.as_deref(), input.description, facts, explicit);
        infer_health(input, facts, explicit);
        infer_details(input.description, facts, explicit);
        apply_implications(facts, explicit);
        apply_nutrition_flags(facts, explicit);
    }

    fn infer_nutrients(&self, input: &InferenceInput<'_>, facts: &mut FactSet, explicit: &HashSet<&'static str>) {
        for (field, patterns) in NUTRIENTS.iter() {
            if explicit.contains(field) || facts.is_filled(field) {
                continue;
            }
            let value = [input.nutrition, input.description]
                .iter()
                .find_map(|text| first_number(patterns, text));
            if let Some(v) = value {
                facts.set(field, FieldValue::number(v));
            }
        }

        if input.nutrition_per_serving.is_empty() {
            return;
        }
        for (per_100, per_serving) in PER_SERVING_FIELDS {
            if explicit.contains(per_serving) || facts.is_filled(per_serving) {
                continue;
            }
            let Some((_, patterns)) = NUTRIENTS.iter().find(|(f, _)| f == per_100) else {
                continue;
            };
            if let Some(v) = first_number(patterns, input.nutrition_per_serving) {
                facts.set(per_serving, FieldValue::number(v));
            }
        }
    }

    fn infer_allergens(
        &self,
        ingredients: Option<&str>,
        allergy_warning: Option<&str>,
        description: &str,
        facts: &mut FactSet,
        explicit: &HashSet<&'static str>,
    ) {
        // Traces go to May Contain and never set Contains X
        let trace_source = format!("{} {}", allergy_warning.unwrap_or(""), description);
        let mut traces = Vec::new();
        for caps in MAY_CONTAIN.captures_iter(&trace_source) {
            if let Some(m) = caps.name("value") {
                for item in split_list(&LIST_JOINERS.replace_all(m.as_str(), ",")) {
                    let label = self
                        .allergens
                        .iter()
                        .find(|rule| rule.matches(&item))
                        .map(|rule| rule.label.clone())
                        .unwrap_or(item);
                    if !traces.contains(&label) {
                        traces.push(label);
                    }
                }
            }
        }
        if !explicit.contains(names::MAY_CONTAIN) {
            for label in &traces {
                facts.push_unique(names::MAY_CONTAIN, label);
            }
        }

        let scan = format!("{} {}", ingredients.unwrap_or(""), allergy_warning.unwrap_or(""));
        let scan = MAY_CONTAIN.replace_all(&scan, " ");
        let scan = FREE_FROM.replace_all(&scan, |caps: &Captures| match caps.name("keep") {
            Some(_) => caps[0].to_string(),
            None => " ".to_string(),
        });
        if scan.trim().is_empty() {
            return;
        }

        for rule in &self.allergens {
            if !rule.matches(&scan) {
                continue;
            }
            if let Some(field) = MASTER_SCHEMA.get(&rule.field) {
                if !explicit.contains(field.name) {
                    facts.set(field.name, FieldValue::Boolean(true));
                }
            }
            if !explicit.contains(names::ALLERGENS) {
                facts.push_unique(names::ALLERGENS, &rule.label);
            }
        }
    }
}

fn first_number(patterns: &[Regex], text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .filter(|caps| caps.name("skip").is_none())
            .find_map(|caps| caps.name("value").and_then(|m| parse_number_token(m.as_str())))
    })
}

fn capture_text(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.name("value").or_else(|| caps.name("alt")))
        .map(|m| collapse_whitespace(m.as_str().trim_end_matches(['.', ',', ';', ' '])))
        .filter(|s| !s.is_empty())
}

fn set_text_if_absent(facts: &mut FactSet, explicit: &HashSet<&'static str>, field: &str, text: &str) {
    if !explicit.contains(field) {
        facts.set_if_absent(field, FieldValue::text(text));
    }
}

/// The `Ingredients: ...` sentence, if present
pub fn extract_ingredients_text(description: &str) -> Option<String> {
    capture_text(&INGREDIENTS_SENTENCE, description)
}

/// Split ingredients text into items, dropping percentage annotations
pub fn ingredients_list(text: &str) -> Vec<String> {
    let text = PERCENT_PARENS.replace_all(text, "");
    split_list(&text)
        .into_iter()
        .map(|item| item.trim_end_matches(['.', '*']).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn infer_health(input: &InferenceInput<'_>, facts: &mut FactSet, explicit: &HashSet<&'static str>) {
    // Ingredient wording ("organic cane sugar") doesn't certify the product
    let description = INGREDIENTS_SENTENCE.replace_all(input.description, " ");
    let text = format!("{} {}", input.name, description);

    for (field, certification, re) in HEALTH.iter() {
        if !re.is_match(&text) {
            continue;
        }
        if let Some(field) = field {
            if !explicit.contains(field) {
                facts.set(field, FieldValue::Boolean(true));
            }
        }
        if let Some(label) = certification {
            if !explicit.contains(names::CERTIFICATIONS) {
                facts.push_unique(names::CERTIFICATIONS, label);
            }
        }
    }
}

fn infer_details(description: &str, facts: &mut FactSet, explicit: &HashSet<&'static str>) {
    if let Some(size) = capture_text(&SERVING_SIZE, description) {
        set_text_if_absent(facts, explicit, names::SERVING_SIZE, &size);
    }
    if !explicit.contains(names::SERVINGS_PER_CONTAINER) && !facts.is_filled(names::SERVINGS_PER_CONTAINER) {
        if let Some(n) = capture_text(&SERVINGS_PER_PACK, description).and_then(|t| parse_number_token(&t)) {
            facts.set(names::SERVINGS_PER_CONTAINER, FieldValue::number(n));
        }
    }
    if let Some(country) = capture_text(&COUNTRY, description) {
        set_text_if_absent(facts, explicit, names::COUNTRY_OF_ORIGIN, &normalize_country(&country));
    }
    if let Some(storage) = capture_text(&STORAGE, description) {
        set_text_if_absent(facts, explicit, names::STORAGE_INSTRUCTIONS, &sentence_case(&storage));
    }
    if let Some(usage) = capture_text(&USAGE, description) {
        set_text_if_absent(facts, explicit, names::USAGE_INSTRUCTIONS, &sentence_case(&usage));
    }
}

fn apply_implications(facts: &mut FactSet, explicit: &HashSet<&'static str>) {
    for (condition, implied) in IMPLICATIONS {
        if facts.flag(condition) && !explicit.contains(implied) {
            facts.set(implied, FieldValue::Boolean(true));
        }
    }
}

fn apply_nutrition_flags(facts: &mut FactSet, explicit: &HashSet<&'static str>) {
    for (flag, nutrient, threshold) in NUTRITION_FLAGS {
        if explicit.contains(flag) || facts.flag(flag) {
            continue;
        }
        let Some(value) = facts.number(nutrient) else {
            continue;
        };
        let hit = match threshold {
            Threshold::Above(limit) => value > *limit,
            Threshold::Below(limit) => value < *limit,
        };
        if hit {
            facts.set(flag, FieldValue::Boolean(true));
        }
    }
}

/// Map common country spellings to one form; otherwise Title Case
pub fn normalize_country(text: &str) -> String {
    let lower = text.trim().trim_end_matches('.').to_lowercase();
    if let Some((_, canonical)) = COUNTRY_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return canonical.to_string();
    }
    lower
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer_description(description: &str) -> FactSet {
        let mut facts = FactSet::new();
        let input = InferenceInput {
            description,
            ..Default::default()
        };
        InferenceEngine::default().infer(&input, &mut facts, &HashSet::new());
        facts
    }

    #[test]
    fn test_coffee_example() {
        let facts = infer_description("Ingredients: Coffee, sugar, milk. Energy 45kcal");
        assert_eq!(facts.number(names::CALORIES), Some(45.0));
        assert!(facts.flag("Contains Milk"));
        assert_eq!(facts.list(names::INGREDIENTS_LIST), ["Coffee", "sugar", "milk"]);
        assert_eq!(facts.list(names::ALLERGENS), ["Milk"]);
    }

    #[test]
    fn test_absent_allergen_is_not_set() {
        // "Not detected" leaves the schema default (false) in place
        let facts = infer_description("Ingredients: Water, sugar, citric acid.");
        assert!(!facts.flag("Contains Milk"));
        assert!(!facts.flag("Contains Peanuts"));
        assert!(facts.list(names::ALLERGENS).is_empty());
    }

    #[test]
    fn test_first_nutrient_match_wins() {
        let facts = infer_description("Protein 3.1g per 100ml. Protein 9g per bottle.");
        assert_eq!(facts.number(names::PROTEIN), Some(3.1));
    }

    #[test]
    fn test_saturated_fat_does_not_answer_for_total_fat() {
        let facts = infer_description("Saturated fat 1.1g, total fat 3.4g, of which saturates 1.1g");
        assert_eq!(facts.number(names::TOTAL_FAT), Some(3.4));
        assert_eq!(facts.number(names::SATURATED_FAT), Some(1.1));
    }

    #[test]
    fn test_energy_kj_and_kcal() {
        let facts = infer_description("Energy 1880kJ / 450kcal, Sugars 10,5g, Salt 0.02g");
        assert_eq!(facts.number(names::ENERGY_KJ), Some(1880.0));
        assert_eq!(facts.number(names::CALORIES), Some(450.0));
        assert_eq!(facts.number(names::SUGARS), Some(10.5));
        assert_eq!(facts.number(names::SALT), Some(0.02));
    }

    #[test]
    fn test_structured_nutrition_scanned_first() {
        let mut facts = FactSet::new();
        let input = InferenceInput {
            description: "Protein 1g",
            nutrition: "Protein 7.5g; Carbohydrate 60g",
            nutrition_per_serving: "Protein 2.2g",
            ..Default::default()
        };
        InferenceEngine::default().infer(&input, &mut facts, &HashSet::new());
        assert_eq!(facts.number(names::PROTEIN), Some(7.5));
        assert_eq!(facts.number(names::CARBOHYDRATES), Some(60.0));
        assert_eq!(facts.number("Protein per Serving (g)"), Some(2.2));
    }

    #[test]
    fn test_may_contain_is_not_contains() {
        let facts = infer_description("Ingredients: Oats, sugar. May contain nuts and sesame.");
        assert!(!facts.flag("Contains Tree Nuts"));
        assert!(!facts.flag("Contains Sesame"));
        assert!(facts.flag("Contains Gluten"));
        assert_eq!(facts.list(names::MAY_CONTAIN), ["Tree Nuts", "Sesame"]);
    }

    #[test]
    fn test_exclusion_phrases() {
        let facts = infer_description("Ingredients: Sugar, cocoa butter, coconut, nutmeg.");
        assert!(!facts.flag("Contains Milk"));
        assert!(!facts.flag("Contains Tree Nuts"));
    }

    #[test]
    fn test_free_from_phrases_do_not_trigger_allergens() {
        let mut facts = FactSet::new();
        let input = InferenceInput {
            description: "Gluten free oat bar",
            ingredients: Some("gluten-free oats, dates, free from milk"),
            ..Default::default()
        };
        InferenceEngine::default().infer(&input, &mut facts, &HashSet::new());
        assert!(!facts.flag("Contains Milk"));
        assert!(facts.flag("Contains Gluten"), "oats still flag gluten");
        assert!(facts.flag("Gluten-Free"));
    }

    #[test]
    fn test_free_range_does_not_hide_preceding_allergen() {
        for ingredients in ["milk, free range eggs", "skimmed milk free range egg yolk"] {
            let mut facts = FactSet::new();
            let input = InferenceInput {
                ingredients: Some(ingredients),
                ..Default::default()
            };
            InferenceEngine::default().infer(&input, &mut facts, &HashSet::new());
            assert!(facts.flag("Contains Milk"), "milk lost in {:?}", ingredients);
            assert!(facts.flag("Contains Eggs"), "eggs lost in {:?}", ingredients);
        }
    }

    #[test]
    fn test_health_keywords_and_certifications() {
        let mut facts = FactSet::new();
        let input = InferenceInput {
            name: "Organic Oat Drink",
            description: "Suitable for vegans. Fairtrade certified. No artificial colours or flavours.",
            ..Default::default()
        };
        InferenceEngine::default().infer(&input, &mut facts, &HashSet::new());
        assert!(facts.flag("Organic"));
        assert!(facts.flag("Vegan"));
        assert!(facts.flag("Vegetarian"), "vegan implies vegetarian");
        assert!(facts.flag("Fair Trade"));
        assert!(facts.flag("No Artificial Colours"));
        assert!(facts.flag("No Artificial Flavours"));
        assert_eq!(facts.list(names::CERTIFICATIONS), ["Organic", "Fairtrade"]);
    }

    #[test]
    fn test_ingredient_wording_does_not_certify() {
        let facts = infer_description("Ingredients: organic cane sugar, water.");
        assert!(!facts.flag("Organic"));
    }

    #[test]
    fn test_explicit_fields_win() {
        let mut facts = FactSet::new();
        facts.set("Vegan", FieldValue::Boolean(false));
        let explicit: HashSet<&'static str> = ["Vegan"].into_iter().collect();
        let input = InferenceInput {
            description: "A delicious vegan treat",
            ..Default::default()
        };
        InferenceEngine::default().infer(&input, &mut facts, &explicit);
        assert!(!facts.flag("Vegan"));
        assert!(!facts.flag("Vegetarian"));
    }

    #[test]
    fn test_nutrition_flags() {
        let facts = infer_description("Protein 12g, Fibre 6g, Sugars 2g, Sodium 100mg, Carbohydrate 20g, Fat 5g");
        assert!(facts.flag(names::HIGH_PROTEIN));
        assert!(facts.flag(names::HIGH_FIBER));
        assert!(facts.flag(names::LOW_SUGAR));
        assert!(facts.flag(names::LOW_SODIUM));
        assert!(!facts.flag(names::LOW_CARB));
        assert!(!facts.flag(names::LOW_FAT));
    }

    #[test]
    fn test_unknown_nutrients_set_no_flags() {
        let facts = infer_description("A refreshing drink");
        assert!(!facts.flag(names::LOW_SUGAR));
        assert!(!facts.flag(names::LOW_SODIUM));
    }

    #[test]
    fn test_details_extraction() {
        let facts = infer_description(
            "Product of Italy, packed in the UK. Store in a cool, dry place. Serving size: 30g. Directions: Mix with 200ml of water.",
        );
        assert_eq!(facts.text(names::COUNTRY_OF_ORIGIN), "Italy");
        assert_eq!(facts.text(names::STORAGE_INSTRUCTIONS), "Store in a cool, dry place");
        assert_eq!(facts.text(names::SERVING_SIZE), "30g");
        assert_eq!(facts.text(names::USAGE_INSTRUCTIONS), "Mix with 200ml of water");
    }

    #[test]
    fn test_country_aliases() {
        assert_eq!(normalize_country("UK"), "United Kingdom");
        assert_eq!(normalize_country("great britain"), "United Kingdom");
        assert_eq!(normalize_country("new zealand"), "New Zealand");
    }

    #[test]
    fn test_ingredients_list_drops_percentages() {
        assert_eq!(
            ingredients_list("Tomatoes (148%), Sugar, Spirit Vinegar, Salt 2%."),
            vec!["Tomatoes", "Sugar", "Spirit Vinegar", "Salt"]
        );
    }

    #[test]
    fn test_custom_allergen_lexicon() {
        let mut lexicon = BTreeMap::new();
        lexicon.insert("Contains Milk".to_string(), vec!["lactoserum".to_string()]);
        lexicon.insert("Price".to_string(), vec!["x".to_string()]);
        let engine = InferenceEngine::with_allergen_lexicon(&lexicon);

        let mut facts = FactSet::new();
        let input = InferenceInput {
            ingredients: Some("sugar, lactoserum"),
            ..Default::default()
        };
        engine.infer(&input, &mut facts, &HashSet::new());
        assert!(facts.flag("Contains Milk"));

        let mut facts = FactSet::new();
        let input = InferenceInput {
            ingredients: Some("milk"),
            ..Default::default()
        };
        engine.infer(&input, &mut facts, &HashSet::new());
        assert!(!facts.flag("Contains Milk"), "override replaces the default keywords");
    }
}

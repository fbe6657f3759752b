// Category normalization and inference
//
// Maps scraped category strings ("Grocery > Soft Drinks > Cans") onto a
// small set of standard categories, and infers a category from the product
// name when the scraper supplied none.

use std::collections::HashMap;

/// Roots that carry no information in a category path
const GENERIC_ROOTS: &[&str] = &["grocery", "groceries", "home", "shop", "all products", "products", "food", "food cupboard", "all"];

/// Standard category → scraped spellings
const CATEGORY_ALIASES: &[(&str, &[&str])] = &[
    ("Beverages", &["beverage", "beverages", "drinks", "drink", "soft drinks", "soft drink", "fizzy drinks", "juices", "water", "energy drinks", "sports drinks"]),
    ("Dairy", &["dairy", "dairy products", "milk", "cheese", "yogurt", "yoghurt", "chilled"]),
    ("Snacks", &["snacks", "snack", "snack food", "crisps", "crisps & snacks", "nuts"]),
    ("Bakery", &["bakery", "baked goods", "bread", "biscuits", "cakes"]),
    ("Canned Goods", &["canned", "canned goods", "canned food", "tinned", "tinned food", "tins"]),
    ("Frozen Foods", &["frozen", "frozen food", "frozen foods"]),
    ("Meat & Seafood", &["meat", "seafood", "fish", "poultry"]),
    ("Produce", &["produce", "fruits", "vegetables", "fresh", "fruit & veg"]),
    ("Condiments", &["condiments", "sauces", "dressings", "table sauces"]),
    ("Cereals", &["cereal", "cereals", "breakfast", "breakfast cereals"]),
    ("Pantry", &["pantry", "dry goods", "cupboard"]),
    ("Confectionery", &["sweets", "candy", "chocolate", "confectionery", "chocolate & sweets"]),
    ("Coffee & Tea", &["coffee", "tea", "hot beverages", "hot drinks", "tea & coffee"]),
];

/// Name keyword → standard category, checked in order
const NAME_KEYWORDS: &[(&str, &[&str])] = &[
    ("Coffee & Tea", &["coffee", "cappuccino", "latte", "espresso", "tea"]),
    ("Beverages", &["juice", "soda", "water", "drink", "cola", "lemonade", "squash", "energy"]),
    ("Dairy", &["milk", "cheese", "yogurt", "yoghurt", "butter", "cream"]),
    ("Confectionery", &["chocolate", "sweets", "candy", "gum", "toffee"]),
    ("Snacks", &["crisps", "chips", "crackers", "popcorn", "nuts", "snack"]),
    ("Bakery", &["bread", "cookies", "biscuits", "cake", "pastry", "muffin"]),
    ("Canned Goods", &["canned", "tinned", "beans"]),
    ("Frozen Foods", &["frozen"]),
    ("Condiments", &["sauce", "ketchup", "mustard", "mayo", "mayonnaise", "dressing", "vinegar"]),
    ("Cereals", &["cereal", "granola", "muesli", "porridge", "oats"]),
];

/// A parsed category path
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoryPath {
    /// Every level, as scraped (trimmed)
    pub levels: Vec<String>,
    /// Standard category for the first meaningful level
    pub category: String,
    /// The level after the category, if any
    pub subcategory: String,
}

/// Category string → standard category mapper
#[derive(Debug, Clone)]
pub struct CategoryMapper {
    mappings: HashMap<String, &'static str>,
}

impl Default for CategoryMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryMapper {
    pub fn new() -> Self {
        let mappings = CATEGORY_ALIASES
            .iter()
            .flat_map(|(standard, aliases)| aliases.iter().map(move |a| (a.to_string(), *standard)))
            .collect();
        Self { mappings }
    }

    /// Map one category label to its standard name.
    ///
    /// Unknown labels are returned Title Cased.
    pub fn map_category(&self, category: &str) -> String {
        let lower = category.trim().to_lowercase();
        if lower.is_empty() {
            return String::new();
        }

        if let Some(standard) = self.mappings.get(&lower) {
            return standard.to_string();
        }

        // Fuzzy match for typos and plural drift
        for (known, standard) in &self.mappings {
            if strsim::normalized_levenshtein(&lower, known) > 0.85 {
                tracing::debug!("Fuzzy matched category '{}' to '{}'", category, known);
                return standard.to_string();
            }
        }

        tracing::debug!("Unmapped category '{}', keeping as-is", category);
        title_case_words(category.trim())
    }

    /// Split `"A > B > C"` (also `/` or `|`) and map the first meaningful level
    pub fn parse_path(&self, raw: &str) -> CategoryPath {
        let levels: Vec<String> = raw
            .split(['>', '/', '|'])
            .map(|level| level.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|level| !level.is_empty())
            .collect();

        let mut meaningful = levels
            .iter()
            .skip_while(|level| GENERIC_ROOTS.contains(&level.to_lowercase().as_str()));

        let category = meaningful.next().map(|c| self.map_category(c)).unwrap_or_default();
        let subcategory = meaningful.next().cloned().unwrap_or_default();

        CategoryPath {
            levels,
            category,
            subcategory,
        }
    }

    /// Infer a standard category from product name keywords
    pub fn infer_from_name(&self, name: &str) -> Option<&'static str> {
        let words: Vec<String> = name
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        NAME_KEYWORDS
            .iter()
            .find(|(_, keywords)| {
                words.iter().any(|w| {
                    keywords
                        .iter()
                        .any(|k| w == k || w.strip_suffix('s') == Some(k))
                })
            })
            .map(|(category, _)| *category)
    }
}

fn title_case_words(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_mapping() {
        let mapper = CategoryMapper::new();
        assert_eq!(mapper.map_category("Soft Drinks"), "Beverages");
        assert_eq!(mapper.map_category("  tinned "), "Canned Goods");
    }

    #[test]
    fn test_fuzzy_mapping() {
        let mapper = CategoryMapper::new();
        assert_eq!(mapper.map_category("confectionary"), "Confectionery");
    }

    #[test]
    fn test_unknown_category_title_cased() {
        let mapper = CategoryMapper::new();
        assert_eq!(mapper.map_category("PET SUPPLIES"), "Pet Supplies");
    }

    #[test]
    fn test_parse_path_skips_generic_root() {
        let mapper = CategoryMapper::new();
        let path = mapper.parse_path("Grocery > Soft Drinks > 1 and 1.5 Ltr Bottles");
        assert_eq!(path.levels.len(), 3);
        assert_eq!(path.category, "Beverages");
        assert_eq!(path.subcategory, "1 and 1.5 Ltr Bottles");
    }

    #[test]
    fn test_parse_path_single_level() {
        let mapper = CategoryMapper::new();
        let path = mapper.parse_path("Confectionery");
        assert_eq!(path.category, "Confectionery");
        assert_eq!(path.subcategory, "");
    }

    #[test]
    fn test_infer_from_name() {
        let mapper = CategoryMapper::new();
        assert_eq!(mapper.infer_from_name("Nescafe Cappuccino Unsweetened"), Some("Coffee & Tea"));
        assert_eq!(mapper.infer_from_name("Heinz Baked Beans"), Some("Canned Goods"));
        assert_eq!(mapper.infer_from_name("Walkers Ready Salted Crisps"), Some("Snacks"));
        assert_eq!(mapper.infer_from_name("Mystery Item"), None);
    }

    #[test]
    fn test_infer_uses_whole_words() {
        let mapper = CategoryMapper::new();
        // "teacake" must not hit the "tea" keyword
        assert_eq!(mapper.infer_from_name("Tunnocks Teacakes"), None);
    }
}

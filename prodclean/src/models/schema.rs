//! MasterSchema: the versioned, ordered table of canonical product fields
//!
//! The table is the single source of truth for field names, types, order and
//! defaults. `SchemaEnforcer` projects every record onto it, so the field set
//! of a cleaned record can be checked mechanically against `MASTER_SCHEMA`.
//!
//! **Versioning:** fields may only be appended in later versions. Existing
//! names, types and positions never change within a major version.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use super::record::FieldValue;

/// Current schema version tag
pub const SCHEMA_VERSION: u32 = 1;

/// Schema value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Numeric,
    Boolean,
    List,
    Url,
}

impl FieldType {
    /// Schema default for this type
    pub fn default_value(self) -> FieldValue {
        match self {
            FieldType::Text | FieldType::Url => FieldValue::Text(String::new()),
            FieldType::Numeric => FieldValue::Numeric(None),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::List => FieldValue::List(Vec::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Numeric => "numeric",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Url => "url",
        }
    }
}

/// Field grouping (documentation and statistics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Identification,
    Description,
    Physical,
    NutritionPer100g,
    NutritionPerServing,
    VitaminsMinerals,
    HealthDiet,
    Allergens,
    Media,
    SourceMetadata,
}

/// One schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub category: FieldCategory,
}

impl FieldDef {
    pub const fn new(name: &'static str, field_type: FieldType, category: FieldCategory) -> Self {
        Self {
            name,
            field_type,
            category,
        }
    }

    pub fn default_value(&self) -> FieldValue {
        self.field_type.default_value()
    }
}

/// Versioned schema definition
#[derive(Debug)]
pub struct MasterSchema {
    pub version: u32,
    fields: &'static [FieldDef],
    index: Lazy<HashMap<&'static str, usize>>,
}

impl MasterSchema {
    /// Fields in canonical order
    pub fn fields(&self) -> &'static [FieldDef] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field in canonical order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&'static FieldDef> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Field names in canonical order
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    /// Look up a field by a loosely spelled key (`"product_name"`, `"Gluten Free"`)
    pub fn find_loose(&self, key: &str) -> Option<&'static FieldDef> {
        LOOSE_INDEX.get(&loose_key(key)).map(|&i| &self.fields[i])
    }
}

/// Key form used for tolerant matching: lowercase alphanumerics only
pub fn loose_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The schema in use
pub static MASTER_SCHEMA: MasterSchema = MasterSchema {
    version: SCHEMA_VERSION,
    fields: FIELDS_V1,
    index: Lazy::new(|| FIELDS_V1.iter().enumerate().map(|(i, f)| (f.name, i)).collect()),
};

static LOOSE_INDEX: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    FIELDS_V1
        .iter()
        .enumerate()
        .map(|(i, f)| (loose_key(f.name), i))
        .collect()
});

/// Field names referenced from code.
///
/// Every constant here must exist in `MASTER_SCHEMA` (checked in tests).
pub mod names {
    pub const PRODUCT_ID: &str = "Product ID";
    pub const PRODUCT_NAME: &str = "Product Name";
    pub const ORIGINAL_NAME: &str = "Original Name";
    pub const BRAND: &str = "Brand";
    pub const ADDITIONAL_BRANDS: &str = "Additional Brands";
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const BARCODE: &str = "Barcode (EAN/UPC)";
    pub const SKU: &str = "SKU";
    pub const SLUG: &str = "Slug";
    pub const CATEGORY: &str = "Category";
    pub const SUBCATEGORY: &str = "Subcategory";
    pub const CATEGORY_PATH: &str = "Category Path";
    pub const TAGS: &str = "Tags";
    pub const SHORT_DESCRIPTION: &str = "Short Description";
    pub const LONG_DESCRIPTION: &str = "Long Description";
    pub const INGREDIENTS_LIST: &str = "Ingredients List";
    pub const ALLERGENS: &str = "Allergens";
    pub const MAY_CONTAIN: &str = "May Contain";
    pub const ALLERGY_WARNING: &str = "Allergy Warning";
    pub const STORAGE_INSTRUCTIONS: &str = "Storage Instructions";
    pub const USAGE_INSTRUCTIONS: &str = "Usage Instructions";
    pub const COUNTRY_OF_ORIGIN: &str = "Country of Origin";
    pub const CERTIFICATIONS: &str = "Product Certifications";
    pub const PACKAGE_SIZE: &str = "Package Size";
    pub const PACKAGE_SIZE_VALUE: &str = "Package Size Value";
    pub const PACKAGE_SIZE_UNIT: &str = "Package Size Unit";
    pub const PACK_COUNT: &str = "Pack Count";
    pub const IS_MULTIPACK: &str = "Is Multipack";
    pub const PACKAGING_TYPE: &str = "Packaging Type";
    pub const VOLUME_FOR_LIQUIDS: &str = "Volume for Liquids (ml/L)";
    pub const NET_WEIGHT: &str = "Net Weight (g)";
    pub const CANNED_FOOD: &str = "Canned Food";
    pub const NON_CANNED_FOOD: &str = "Non Canned Food";
    pub const CALORIES: &str = "Calories (kcal)";
    pub const ENERGY_KJ: &str = "Energy (kJ)";
    pub const TOTAL_FAT: &str = "Total Fat (g)";
    pub const SATURATED_FAT: &str = "Saturated Fat (g)";
    pub const CARBOHYDRATES: &str = "Total Carbohydrates (g)";
    pub const SUGARS: &str = "Total Sugars (g)";
    pub const FIBER: &str = "Dietary Fiber (g)";
    pub const PROTEIN: &str = "Protein (g)";
    pub const SALT: &str = "Salt (g)";
    pub const SODIUM: &str = "Sodium (mg)";
    pub const SERVING_SIZE: &str = "Serving Size";
    pub const SERVINGS_PER_CONTAINER: &str = "Servings Per Container";
    pub const NUT_FREE: &str = "Nut-Free";
    pub const LOW_FAT: &str = "Low Fat";
    pub const LOW_SUGAR: &str = "Low Sugar";
    pub const LOW_SODIUM: &str = "Low Sodium";
    pub const LOW_CARB: &str = "Low Carb";
    pub const HIGH_PROTEIN: &str = "High Protein";
    pub const HIGH_FIBER: &str = "High Fiber";
    pub const FEATURED_IMAGE_URL: &str = "Featured Image URL";
    pub const IMAGE_URL_2: &str = "Image URL 2";
    pub const IMAGE_URL_3: &str = "Image URL 3";
    pub const IMAGE_URL_4: &str = "Image URL 4";
    pub const IMAGE_URL_5: &str = "Image URL 5";
    pub const THUMBNAIL_URL: &str = "Thumbnail URL";
    pub const PRODUCT_PAGE_URL: &str = "Product Page URL";
    pub const SOURCE_WEBSITE_NAME: &str = "Source Website Name";
    pub const SOURCE_WEBSITE_URL: &str = "Source Website URL";
    pub const SOURCE_PRODUCT_ID: &str = "Source Product ID";
    pub const SCRAPED_AT: &str = "Scraped At";
    pub const CLEANED_AT: &str = "Cleaned At";
    pub const CONTENT_HASH: &str = "Content Hash";
    pub const DATA_COMPLETENESS: &str = "Data Completeness (%)";

    /// Fields filled by `BatchMerger`, excluded from completeness scoring
    pub const MERGE_METADATA: &[&str] = &[
        SOURCE_WEBSITE_NAME,
        SOURCE_WEBSITE_URL,
        SCRAPED_AT,
        CLEANED_AT,
        CONTENT_HASH,
        DATA_COMPLETENESS,
    ];

    /// Image slots after the featured image, in fill order
    pub const EXTRA_IMAGE_SLOTS: &[&str] = &[IMAGE_URL_2, IMAGE_URL_3, IMAGE_URL_4, IMAGE_URL_5];
}

/// Schema v1 field table
const FIELDS_V1: &[FieldDef] = &[
    // Identification
    FieldDef::new("Product ID", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Product Name", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Original Name", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Brand", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Additional Brands", FieldType::List, FieldCategory::Identification),
    FieldDef::new("Manufacturer", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Barcode (EAN/UPC)", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("SKU", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Slug", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Category", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Subcategory", FieldType::Text, FieldCategory::Identification),
    FieldDef::new("Category Path", FieldType::List, FieldCategory::Identification),
    FieldDef::new("Tags", FieldType::List, FieldCategory::Identification),
    // Description
    FieldDef::new("Short Description", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Long Description", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Ingredients List", FieldType::List, FieldCategory::Description),
    FieldDef::new("Allergens", FieldType::List, FieldCategory::Description),
    FieldDef::new("May Contain", FieldType::List, FieldCategory::Description),
    FieldDef::new("Allergy Warning", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Storage Instructions", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Usage Instructions", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Country of Origin", FieldType::Text, FieldCategory::Description),
    FieldDef::new("Product Certifications", FieldType::List, FieldCategory::Description),
    // Physical
    FieldDef::new("Package Size", FieldType::Text, FieldCategory::Physical),
    FieldDef::new("Package Size Value", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Package Size Unit", FieldType::Text, FieldCategory::Physical),
    FieldDef::new("Pack Count", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Is Multipack", FieldType::Boolean, FieldCategory::Physical),
    FieldDef::new("Packaging Type", FieldType::Text, FieldCategory::Physical),
    FieldDef::new("Volume for Liquids (ml/L)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Net Weight (g)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Gross Weight (g)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Length (cm)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Width (cm)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Height (cm)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Shelf Life (days)", FieldType::Numeric, FieldCategory::Physical),
    FieldDef::new("Canned Food", FieldType::Boolean, FieldCategory::Physical),
    FieldDef::new("Non Canned Food", FieldType::Boolean, FieldCategory::Physical),
    // Nutrition per 100 g
    FieldDef::new("Calories (kcal)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Energy (kJ)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Total Fat (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Saturated Fat (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Trans Fat (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Monounsaturated Fat (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Polyunsaturated Fat (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Cholesterol (mg)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Total Carbohydrates (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Total Sugars (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Added Sugars (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Dietary Fiber (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Protein (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Salt (g)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    FieldDef::new("Sodium (mg)", FieldType::Numeric, FieldCategory::NutritionPer100g),
    // Nutrition per serving
    FieldDef::new("Serving Size", FieldType::Text, FieldCategory::NutritionPerServing),
    FieldDef::new("Servings Per Container", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Calories per Serving (kcal)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Total Fat per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Saturated Fat per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Total Carbohydrates per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Total Sugars per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Dietary Fiber per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Protein per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Salt per Serving (g)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    FieldDef::new("Sodium per Serving (mg)", FieldType::Numeric, FieldCategory::NutritionPerServing),
    // Vitamins and minerals
    FieldDef::new("Vitamin A (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin C (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin D (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin E (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin K (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Thiamin (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Riboflavin (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Niacin (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin B6 (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Folate (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Vitamin B12 (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Biotin (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Pantothenic Acid (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Calcium (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Iron (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Magnesium (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Phosphorus (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Potassium (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Zinc (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Copper (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Manganese (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Selenium (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Iodine (µg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    FieldDef::new("Caffeine (mg)", FieldType::Numeric, FieldCategory::VitaminsMinerals),
    // Health and diet properties
    FieldDef::new("Vegan", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Vegetarian", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Gluten-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Dairy-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Lactose-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Nut-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Egg-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Soy-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Shellfish-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Organic", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Non-GMO", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Keto-Friendly", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Paleo-Friendly", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Kosher", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Halal", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Fair Trade", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Sugar-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("No Added Sugar", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Low Fat", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Low Sugar", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Low Sodium", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Low Carb", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("High Protein", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("High Fiber", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("No Preservatives", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("No Artificial Colours", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("No Artificial Flavours", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Natural Ingredients", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Caffeine-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Alcohol-Free", FieldType::Boolean, FieldCategory::HealthDiet),
    FieldDef::new("Wholegrain", FieldType::Boolean, FieldCategory::HealthDiet),
    // Allergens
    FieldDef::new("Contains Peanuts", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Tree Nuts", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Milk", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Eggs", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Wheat", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Gluten", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Soybeans", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Fish", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Shellfish", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Sesame", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Mustard", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Celery", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Lupin", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Sulphites", FieldType::Boolean, FieldCategory::Allergens),
    FieldDef::new("Contains Molluscs", FieldType::Boolean, FieldCategory::Allergens),
    // Media
    FieldDef::new("Featured Image URL", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Image URL 2", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Image URL 3", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Image URL 4", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Image URL 5", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Thumbnail URL", FieldType::Url, FieldCategory::Media),
    FieldDef::new("Product Page URL", FieldType::Url, FieldCategory::Media),
    // Source metadata (attached at merge time)
    FieldDef::new("Source Website Name", FieldType::Text, FieldCategory::SourceMetadata),
    FieldDef::new("Source Website URL", FieldType::Url, FieldCategory::SourceMetadata),
    FieldDef::new("Source Product ID", FieldType::Text, FieldCategory::SourceMetadata),
    FieldDef::new("Scraped At", FieldType::Text, FieldCategory::SourceMetadata),
    FieldDef::new("Cleaned At", FieldType::Text, FieldCategory::SourceMetadata),
    FieldDef::new("Content Hash", FieldType::Text, FieldCategory::SourceMetadata),
    FieldDef::new("Data Completeness (%)", FieldType::Numeric, FieldCategory::SourceMetadata),
];

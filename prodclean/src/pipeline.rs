//! IntegratedProductCleaner: raw record → canonical record, batch → merged output
//!
//! **Per record (pure apart from the vocabulary lock):**
//! 1. NameCleaner on the name-like field (none → MalformedRecord)
//! 2. BrandResolver: explicit brand field, else name heuristics
//! 3. Normalizer over raw fields that name a schema field, plus alias tables
//!    for identity, size, category, packaging and media
//! 4. InferenceEngine over description, ingredients and nutrition text
//! 5. SchemaEnforcer
//!
//! **Per batch:** records run in parallel on rayon inside `spawn_blocking`,
//! except step 2, which resolves the whole batch at once so learned brands
//! do not depend on record order. BatchMerger runs after every record has
//! finished.

use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use prodclean_common::config::SourceConfig;
use prodclean_common::time;

use crate::config::CleanerSettings;
use crate::error::{CleanError, CleanResult, DegradedField};
use crate::models::raw::value_to_text;
use crate::models::schema::{loose_key, names};
use crate::models::{
    CanonicalProductRecord, FactSet, FieldDef, FieldValue, RawBatch, RawProductRecord, SourceInfo, MASTER_SCHEMA,
};
use crate::services::batch_merger::{BatchMerger, SourceRecords};
use crate::services::brand_resolver::{BrandRequest, BrandResolution, BrandResolver};
use crate::services::brand_vocabulary::SharedVocabulary;
use crate::services::category_mapper::CategoryMapper;
use crate::services::identity::{generate_product_id, normalize_barcode, product_slug};
use crate::services::inference::{InferenceEngine, InferenceInput};
use crate::services::name_cleaner::{CleanedName, NameCleaner, PackageSize};
use crate::services::normalizer::{collapse_whitespace, normalize_url, split_list, Normalizer, UnitTable};
use crate::services::packaging::detect_packaging;
use crate::services::schema_enforcer::SchemaEnforcer;
use crate::services::statistics::{HardError, RunSummary, SourceStats};

const NAME_ALIASES: &[&str] = &["product name", "name", "title", "product title", "item name", "product"];
const BRAND_ALIASES: &[&str] = &["brand", "brand name"];
const SOURCE_ID_ALIASES: &[&str] = &["source product id", "product id", "id", "item id", "product code id"];
const BARCODE_ALIASES: &[&str] = &["barcode", "barcode ean upc", "ean", "retail ean", "upc", "gtin"];
const SKU_ALIASES: &[&str] = &["sku", "product code", "item code"];
const SIZE_ALIASES: &[&str] = &["package size", "size", "pack size", "weight", "volume", "net weight"];
const PACK_COUNT_ALIASES: &[&str] = &["pack count", "case size", "pack qty", "units per case"];
const PACKAGING_ALIASES: &[&str] = &["packaging", "packaging type", "container"];
const CATEGORY_ALIASES: &[&str] = &["category", "categories", "category path", "breadcrumb", "breadcrumbs", "department"];
const SUBCATEGORY_ALIASES: &[&str] = &["subcategory", "sub category"];
const LONG_DESCRIPTION_ALIASES: &[&str] = &["long description", "description", "product description", "details", "about"];
const SHORT_DESCRIPTION_ALIASES: &[&str] = &["short description", "summary", "subtitle"];
const INGREDIENT_ALIASES: &[&str] = &["ingredients", "ingredients list", "ingredient list", "ingredients text"];
const ALLERGY_ALIASES: &[&str] = &["allergy warning", "allergy information", "allergy advice", "allergens", "allergen information"];
const NUTRITION_TEXT_ALIASES: &[&str] = &["nutrition", "nutritional information", "nutrition information"];
const INFERENCE_TEXT_ALIASES: &[&str] = &["other info", "description bullets", "features", "bullets", "tags"];
const CERTIFICATION_ALIASES: &[&str] = &["certifications", "certification", "product certifications"];
const SCRAPED_AT_ALIASES: &[&str] = &["scraped at", "scraped", "scrape date", "timestamp"];
const FEATURED_IMAGE_ALIASES: &[&str] = &["featured image url", "featured image", "image", "image url", "main image", "img"];
const IMAGES_ALIASES: &[&str] = &["images", "image urls", "gallery", "additional images"];
const THUMBNAIL_ALIASES: &[&str] = &["thumbnail url", "thumbnail", "thumb"];
const PAGE_URL_ALIASES: &[&str] = &["product page url", "url", "product url", "link", "product link"];

/// Nested object keys whose contents are nutrition text
const NUTRITION_OBJECT_MARKERS: &[&str] = &["nutrition", "ingredientsdescription"];

/// Fields the pipeline derives itself; raw values under these names are not passed through
const DERIVED_FIELDS: &[&str] = &[
    names::PRODUCT_ID,
    names::PRODUCT_NAME,
    names::ORIGINAL_NAME,
    names::BRAND,
    names::ADDITIONAL_BRANDS,
    names::BARCODE,
    names::SLUG,
    names::CATEGORY,
    names::SUBCATEGORY,
    names::CATEGORY_PATH,
    names::ALLERGENS,
    names::ALLERGY_WARNING,
    names::CERTIFICATIONS,
    names::FEATURED_IMAGE_URL,
    names::THUMBNAIL_URL,
    names::PRODUCT_PAGE_URL,
    names::PACKAGE_SIZE,
    names::PACKAGE_SIZE_VALUE,
    names::PACKAGE_SIZE_UNIT,
    names::SOURCE_WEBSITE_NAME,
    names::SOURCE_WEBSITE_URL,
    names::SOURCE_PRODUCT_ID,
    names::SCRAPED_AT,
    names::CLEANED_AT,
    names::CONTENT_HASH,
    names::DATA_COMPLETENESS,
];

/// Log progress every this many records
const PROGRESS_INTERVAL: usize = 500;

/// One record through the per-record stages
#[derive(Debug, Clone)]
pub struct CleanedRecord {
    pub record: CanonicalProductRecord,
    pub brand: BrandResolution,
    pub degraded: Vec<DegradedField>,
}

/// Output of the name stage, carried across the batch brand stage
#[derive(Debug, Clone)]
struct NamedRecord {
    raw_name: String,
    cleaned: CleanedName,
}

/// Work item after the brand stage
type BrandedItem = (usize, usize, CleanResult<(RawProductRecord, NamedRecord, BrandResolution)>);

/// Merged records plus the run summary
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub records: Vec<CanonicalProductRecord>,
    pub summary: RunSummary,
}

/// IntegratedProductCleaner
#[derive(Debug, Clone)]
pub struct ProductCleaner {
    name_cleaner: NameCleaner,
    brand_resolver: BrandResolver,
    normalizer: Normalizer,
    inference: InferenceEngine,
    enforcer: SchemaEnforcer,
    categories: CategoryMapper,
    merger: BatchMerger,
    workers: Option<usize>,
}

impl Default for ProductCleaner {
    fn default() -> Self {
        Self::new(&CleanerSettings::default())
    }
}

impl ProductCleaner {
    pub fn new(settings: &CleanerSettings) -> Self {
        Self {
            name_cleaner: NameCleaner::new(&settings.units),
            brand_resolver: BrandResolver::new(settings.brand_stoplist.iter().cloned()),
            normalizer: Normalizer::new(settings.units.clone()),
            inference: InferenceEngine::with_allergen_lexicon(&settings.allergen_lexicon),
            enforcer: SchemaEnforcer::new(),
            categories: CategoryMapper::new(),
            merger: BatchMerger::with_dedupe_fields(&settings.dedupe_fields),
            workers: settings.workers,
        }
    }

    fn units(&self) -> &UnitTable {
        self.normalizer.units()
    }

    /// Run one raw record through every per-record stage
    pub fn clean_record(
        &self,
        raw: &RawProductRecord,
        source: &SourceInfo,
        vocabulary: &SharedVocabulary,
    ) -> CleanResult<CleanedRecord> {
        let named = self.clean_name(raw)?;
        let brand = self.resolve_brand(raw, &named, vocabulary);
        self.complete_record(raw, &named, brand, source)
    }

    /// NameCleaner stage; a record without a usable name is malformed
    fn clean_name(&self, raw: &RawProductRecord) -> CleanResult<NamedRecord> {
        let raw_name = raw
            .lookup_text(NAME_ALIASES)
            .map(|n| collapse_whitespace(&n))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CleanError::malformed("no name-like field"))?;
        let cleaned = self.name_cleaner.clean(&raw_name);
        Ok(NamedRecord { raw_name, cleaned })
    }

    /// BrandResolver stage: explicit brand field, else name heuristics
    fn resolve_brand(&self, raw: &RawProductRecord, named: &NamedRecord, vocabulary: &SharedVocabulary) -> BrandResolution {
        raw.lookup_text(BRAND_ALIASES)
            .and_then(|b| self.brand_resolver.resolve_explicit(&b, &named.cleaned.name, vocabulary))
            .unwrap_or_else(|| self.brand_resolver.resolve(&named.cleaned.name, vocabulary))
    }

    /// Normalizer, InferenceEngine and SchemaEnforcer stages
    fn complete_record(
        &self,
        raw: &RawProductRecord,
        named: &NamedRecord,
        brand: BrandResolution,
        source: &SourceInfo,
    ) -> CleanResult<CleanedRecord> {
        let NamedRecord { raw_name, cleaned } = named;

        let mut facts = FactSet::new();
        let mut explicit: HashSet<&'static str> = HashSet::new();
        let mut degraded = Vec::new();

        facts.set(names::PRODUCT_NAME, FieldValue::text(cleaned.name.as_str()));
        facts.set(names::ORIGINAL_NAME, FieldValue::text(raw_name.as_str()));
        facts.set(names::BRAND, FieldValue::text(brand.brand.as_str()));
        facts.set(names::ADDITIONAL_BRANDS, FieldValue::List(brand.additional().to_vec()));

        // Normalizer
        self.pass_through(raw, &mut facts, &mut explicit, &mut degraded);
        self.apply_identity(raw, &mut facts, &mut degraded);
        let size = cleaned.size.clone().or_else(|| raw.lookup_text(SIZE_ALIASES));
        self.apply_size(raw, size.as_deref(), &mut facts, &explicit);
        self.apply_packaging(raw, raw_name, size.as_deref(), &mut facts, &explicit);
        self.apply_category(raw, &cleaned.name, &mut facts);
        self.apply_media(raw, &mut facts, &mut degraded);
        self.apply_scraped_at(raw, &mut facts, &mut degraded);

        // InferenceEngine
        let texts = InferenceTexts::collect(raw);
        let input = InferenceInput {
            name: &cleaned.name,
            description: &texts.description,
            ingredients: texts.ingredients.as_deref(),
            allergy_warning: texts.allergy_warning.as_deref(),
            nutrition: &texts.nutrition,
            nutrition_per_serving: &texts.nutrition_per_serving,
        };
        self.inference.infer(&input, &mut facts, &explicit);
        if let Some(certifications) = raw.lookup(CERTIFICATION_ALIASES) {
            for label in list_items(certifications) {
                facts.push_unique(names::CERTIFICATIONS, &label);
            }
        }

        // Identity needs the final brand, name and size
        let size_text = facts.text(names::PACKAGE_SIZE).to_string();
        let source_id = raw.lookup_text(SOURCE_ID_ALIASES);
        let product_id = match &source_id {
            Some(id) => format!("{}_{}", source.id_prefix(), id),
            None => generate_product_id(source, &brand.brand, &cleaned.name, &size_text),
        };
        facts.set(names::PRODUCT_ID, FieldValue::Text(product_id));
        if let Some(id) = source_id {
            facts.set(names::SOURCE_PRODUCT_ID, FieldValue::Text(id));
        }
        facts.set(
            names::SLUG,
            FieldValue::Text(product_slug(&brand.brand, &cleaned.name, &size_text)),
        );

        // SchemaEnforcer
        let record = self.enforcer.enforce(facts)?;

        Ok(CleanedRecord {
            record,
            brand,
            degraded,
        })
    }

    /// Raw keys that name a schema field, normalized to its type.
    ///
    /// `is_` prefixes are tolerated (`is_vegan` → Vegan). Top-level keys win
    /// over nested ones. A successfully parsed value marks the field explicit,
    /// so inference will not override it.
    fn pass_through(
        &self,
        raw: &RawProductRecord,
        facts: &mut FactSet,
        explicit: &mut HashSet<&'static str>,
        degraded: &mut Vec<DegradedField>,
    ) {
        for (key, value) in raw.entries() {
            let Some(def) = schema_field_for_key(key) else {
                continue;
            };
            if DERIVED_FIELDS.contains(&def.name) || explicit.contains(def.name) {
                continue;
            }
            match self.normalizer.normalize(def, value) {
                Ok(v) => {
                    if value_to_text(value).is_some() {
                        explicit.insert(def.name);
                        facts.set(def.name, v);
                    }
                }
                Err(d) => {
                    tracing::warn!(field = %d.field, raw = %d.raw, reason = %d.reason, "degraded field value");
                    degraded.push(d);
                }
            }
        }
    }

    fn apply_identity(&self, raw: &RawProductRecord, facts: &mut FactSet, degraded: &mut Vec<DegradedField>) {
        if let Some(barcode) = raw.lookup_text(BARCODE_ALIASES) {
            match normalize_barcode(&barcode) {
                Ok(digits) => facts.set(names::BARCODE, FieldValue::Text(digits)),
                Err(d) => {
                    tracing::warn!(field = %d.field, raw = %d.raw, reason = %d.reason, "degraded field value");
                    degraded.push(d);
                }
            }
        }
        if let Some(sku) = raw.lookup_text(SKU_ALIASES) {
            facts.set_if_absent(names::SKU, FieldValue::text(collapse_whitespace(&sku)));
        }
    }

    fn apply_size(
        &self,
        raw: &RawProductRecord,
        size: Option<&str>,
        facts: &mut FactSet,
        explicit: &HashSet<&'static str>,
    ) {
        if let Some(size) = size {
            let size = collapse_whitespace(size);
            facts.set(names::PACKAGE_SIZE, FieldValue::text(size.as_str()));

            if let Some(parsed) = PackageSize::parse(&size, self.units()) {
                facts.set(names::PACKAGE_SIZE_VALUE, FieldValue::number(parsed.value));
                facts.set(names::PACKAGE_SIZE_UNIT, FieldValue::text(parsed.unit.as_str()));
                if !explicit.contains(names::PACK_COUNT) {
                    facts.set(names::PACK_COUNT, FieldValue::number(f64::from(parsed.count.unwrap_or(1))));
                }
                if !explicit.contains(names::IS_MULTIPACK) {
                    facts.set(names::IS_MULTIPACK, FieldValue::Boolean(parsed.is_multipack()));
                }
                if UnitTable::is_volume(&parsed.unit) {
                    facts.set_if_absent(names::VOLUME_FOR_LIQUIDS, FieldValue::number(parsed.value));
                } else if parsed.unit == "g" {
                    facts.set_if_absent(names::NET_WEIGHT, FieldValue::number(parsed.value));
                }
            }
        }

        // Wholesale case sizes ("24") when the name carried no multiplier
        if explicit.contains(names::PACK_COUNT) || facts.number(names::PACK_COUNT).is_some_and(|n| n > 1.0) {
            return;
        }
        let case_size = raw
            .lookup_text(PACK_COUNT_ALIASES)
            .and_then(|t| self.normalizer.parse_quantity(&t))
            .map(|q| q.value)
            .filter(|n| *n >= 1.0 && n.fract() == 0.0);
        if let Some(count) = case_size {
            facts.set(names::PACK_COUNT, FieldValue::number(count));
            if !explicit.contains(names::IS_MULTIPACK) {
                facts.set(names::IS_MULTIPACK, FieldValue::Boolean(count > 1.0));
            }
        }
    }

    fn apply_packaging(
        &self,
        raw: &RawProductRecord,
        raw_name: &str,
        size: Option<&str>,
        facts: &mut FactSet,
        explicit: &HashSet<&'static str>,
    ) {
        let text = format!(
            "{} {} {}",
            raw.lookup_text(PACKAGING_ALIASES).unwrap_or_default(),
            raw_name,
            size.unwrap_or_default()
        );
        let Some(packaging) = detect_packaging(&text) else {
            return;
        };
        facts.set_if_absent(names::PACKAGING_TYPE, FieldValue::text(packaging.label));
        if !explicit.contains(names::TAGS) {
            facts.push_unique(names::TAGS, packaging.label);
        }
        if !explicit.contains(names::CANNED_FOOD) {
            facts.set(names::CANNED_FOOD, FieldValue::Boolean(packaging.canned));
        }
        if !explicit.contains(names::NON_CANNED_FOOD) {
            facts.set(names::NON_CANNED_FOOD, FieldValue::Boolean(!packaging.canned));
        }
    }

    fn apply_category(&self, raw: &RawProductRecord, cleaned_name: &str, facts: &mut FactSet) {
        let raw_category = raw.lookup(CATEGORY_ALIASES).and_then(|value| match value {
            Value::Array(levels) => {
                let levels: Vec<String> = levels.iter().filter_map(value_to_text).collect();
                (!levels.is_empty()).then(|| levels.join(" > "))
            }
            other => value_to_text(other),
        });

        match raw_category {
            Some(text) => {
                let path = self.categories.parse_path(&text);
                facts.set(names::CATEGORY, FieldValue::Text(path.category));
                facts.set(names::SUBCATEGORY, FieldValue::Text(path.subcategory));
                facts.set(names::CATEGORY_PATH, FieldValue::List(path.levels));
            }
            None => {
                if let Some(category) = self.categories.infer_from_name(cleaned_name) {
                    facts.set(names::CATEGORY, FieldValue::text(category));
                }
            }
        }

        if let Some(subcategory) = raw.lookup_text(SUBCATEGORY_ALIASES) {
            facts.set(names::SUBCATEGORY, FieldValue::text(collapse_whitespace(&subcategory)));
        }
    }

    fn apply_media(&self, raw: &RawProductRecord, facts: &mut FactSet, degraded: &mut Vec<DegradedField>) {
        for (field, aliases) in [
            (names::FEATURED_IMAGE_URL, FEATURED_IMAGE_ALIASES),
            (names::THUMBNAIL_URL, THUMBNAIL_ALIASES),
            (names::PRODUCT_PAGE_URL, PAGE_URL_ALIASES),
        ] {
            let Some(text) = raw.lookup_text(aliases) else {
                continue;
            };
            match normalize_url(&text) {
                Some(url) => facts.set_if_absent(field, FieldValue::Text(url)),
                None => {
                    let d = DegradedField::new(field, text, "not an absolute http(s) URL");
                    tracing::warn!(field = %d.field, raw = %d.raw, reason = %d.reason, "degraded field value");
                    degraded.push(d);
                }
            }
        }

        let mut gallery = raw
            .lookup(IMAGES_ALIASES)
            .map(list_items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| normalize_url(&item));
        if !facts.is_filled(names::FEATURED_IMAGE_URL) {
            if let Some(first) = gallery.next() {
                facts.set(names::FEATURED_IMAGE_URL, FieldValue::Text(first));
            }
        }

        let featured = facts.text(names::FEATURED_IMAGE_URL).to_string();
        let mut extras = gallery.filter(|url| *url != featured);
        for slot in names::EXTRA_IMAGE_SLOTS {
            if facts.is_filled(slot) {
                continue;
            }
            match extras.next() {
                Some(url) => facts.set(slot, FieldValue::Text(url)),
                None => break,
            }
        }
    }

    fn apply_scraped_at(&self, raw: &RawProductRecord, facts: &mut FactSet, degraded: &mut Vec<DegradedField>) {
        let Some(text) = raw.lookup_text(SCRAPED_AT_ALIASES) else {
            return;
        };
        match time::parse_timestamp(&text) {
            Some(ts) => facts.set(names::SCRAPED_AT, FieldValue::Text(time::to_record_string(&ts))),
            None => {
                let d = DegradedField::new(names::SCRAPED_AT, text, "unrecognized timestamp");
                tracing::warn!(field = %d.field, raw = %d.raw, reason = %d.reason, "degraded field value");
                degraded.push(d);
            }
        }
    }

    /// Clean every batch and merge the results.
    ///
    /// **Algorithm:**
    /// 1. Flatten batches into `(source, position, record)` work items
    /// 2. Clean items on rayon in `spawn_blocking`, with brands resolved for
    ///    the whole batch at once; the token is checked per item and
    ///    unstarted items count as cancelled
    /// 3. Barrier: collect outcomes in input order
    /// 4. Merge (dedupe, metadata) and build the run summary
    ///
    /// Brands registered before a cancellation stay in the vocabulary.
    pub async fn run(
        self: Arc<Self>,
        batches: Vec<RawBatch>,
        vocabulary: SharedVocabulary,
        cancel: CancellationToken,
    ) -> CleanResult<BatchResult> {
        let started_at = time::now();
        let total: usize = batches.iter().map(RawBatch::len).sum();
        tracing::info!(sources = batches.len(), records = total, "Starting cleaning run");

        let sources: Vec<SourceInfo> = batches.iter().map(|b| b.source.clone()).collect();
        let work: Vec<(usize, usize, Value)> = batches
            .into_iter()
            .enumerate()
            .flat_map(|(s, batch)| batch.records.into_iter().enumerate().map(move |(p, v)| (s, p, v)))
            .collect();

        let cleaner = Arc::clone(&self);
        let task_sources = sources.clone();
        let task_vocabulary = vocabulary.clone();
        let task_cancel = cancel.clone();
        let outcomes: Vec<(usize, usize, CleanResult<CleanedRecord>)> = tokio::task::spawn_blocking(move || {
            cleaner.clean_all(work, &task_sources, &task_vocabulary, &task_cancel)
        })
        .await
        .map_err(|e| prodclean_common::Error::Internal(format!("Cleaning task failed: {}", e)))?;

        let mut summary = RunSummary::new(started_at);
        summary.cancelled = cancel.is_cancelled();
        let (mut stats, per_source) = tally_outcomes(outcomes, &sources, &mut summary);

        let merge_input = sources
            .iter()
            .cloned()
            .zip(per_source)
            .map(|(source, records)| SourceRecords { source, records })
            .collect();
        let merged = self.merger.merge(merge_input, time::now());
        tracing::info!("{}", merged.stats.display_string());

        for (source_stats, merge_stats) in stats.iter_mut().zip(&merged.stats.per_source) {
            source_stats.cleaned = merge_stats.kept;
            source_stats.duplicates = merge_stats.duplicates;
        }
        for source_stats in &stats {
            tracing::info!("{}", source_stats.display_string());
        }
        summary.sources = stats;
        summary.known_brands = vocabulary.len();
        summary.finish(&merged.records, time::now());
        tracing::info!("{}", summary.display_string());

        Ok(BatchResult {
            records: merged.records,
            summary,
        })
    }

    /// Blocking part of [`ProductCleaner::run`]
    ///
    /// **Algorithm:**
    /// 1. Parallel: parse each raw value and clean its name
    /// 2. One [`BrandResolver::resolve_batch`] call over every named record,
    ///    so learned brands depend neither on scheduling nor on input order
    /// 3. Parallel: the remaining stages
    ///
    /// The token is checked before steps 1 and 3 for each record.
    fn clean_all(
        &self,
        work: Vec<(usize, usize, Value)>,
        sources: &[SourceInfo],
        vocabulary: &SharedVocabulary,
        cancel: &CancellationToken,
    ) -> Vec<(usize, usize, CleanResult<CleanedRecord>)> {
        let processed = AtomicUsize::new(0);
        let total = work.len();

        let process = || -> Vec<(usize, usize, CleanResult<CleanedRecord>)> {
            // Indexed collects keep input order regardless of scheduling
            let named: Vec<(usize, usize, CleanResult<(RawProductRecord, NamedRecord)>)> = work
                .into_par_iter()
                .map(|(s, position, value)| {
                    if cancel.is_cancelled() {
                        return (s, position, Err(CleanError::Cancelled));
                    }
                    let outcome = RawProductRecord::try_from(value)
                        .and_then(|raw| self.clean_name(&raw).map(|named| (raw, named)));
                    (s, position, outcome)
                })
                .collect();

            let resolutions = {
                let explicit: Vec<(Option<String>, &NamedRecord)> = named
                    .iter()
                    .filter_map(|(_, _, outcome)| outcome.as_ref().ok())
                    .map(|(raw, named)| (raw.lookup_text(BRAND_ALIASES), named))
                    .collect();
                let requests: Vec<BrandRequest<'_>> = explicit
                    .iter()
                    .map(|(brand, named)| BrandRequest {
                        explicit: brand.as_deref(),
                        cleaned_name: &named.cleaned.name,
                    })
                    .collect();
                self.brand_resolver.resolve_batch(&requests, vocabulary)
            };
            let mut resolutions = resolutions.into_iter();

            let branded: Vec<BrandedItem> = named
                .into_iter()
                .map(|(s, position, outcome)| {
                    let outcome = outcome.map(|(raw, named)| {
                        let brand = resolutions.next().unwrap_or_default();
                        (raw, named, brand)
                    });
                    (s, position, outcome)
                })
                .collect();

            branded
                .into_par_iter()
                .map(|(s, position, outcome)| {
                    let outcome = outcome.and_then(|(raw, named, brand)| {
                        if cancel.is_cancelled() {
                            return Err(CleanError::Cancelled);
                        }
                        self.complete_record(&raw, &named, brand, &sources[s])
                    });

                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_INTERVAL == 0 {
                        tracing::debug!("Cleaned {}/{} records", done, total);
                    }
                    (s, position, outcome)
                })
                .collect()
        };

        match self.workers {
            Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(process),
                Err(e) => {
                    tracing::warn!(workers = n, error = %e, "could not build worker pool, using global pool");
                    process()
                }
            },
            None => process(),
        }
    }
}

/// Count per-source outcomes and collect the records that survived.
///
/// Schema violations and other unexpected failures become hard errors;
/// malformed and cancelled records are only counted.
fn tally_outcomes(
    outcomes: Vec<(usize, usize, CleanResult<CleanedRecord>)>,
    sources: &[SourceInfo],
    summary: &mut RunSummary,
) -> (Vec<SourceStats>, Vec<Vec<CanonicalProductRecord>>) {
    let mut stats: Vec<SourceStats> = sources.iter().map(|s| SourceStats::new(s.name.as_str())).collect();
    let mut per_source: Vec<Vec<CanonicalProductRecord>> = vec![Vec::new(); sources.len()];

    for (s, position, outcome) in outcomes {
        let source_stats = &mut stats[s];
        source_stats.input += 1;
        match outcome {
            Ok(cleaned) => {
                source_stats.degraded_fields += cleaned.degraded.len();
                if cleaned.brand.is_new {
                    summary.new_brands.push(cleaned.brand.brand.clone());
                }
                per_source[s].push(cleaned.record);
            }
            Err(CleanError::MalformedRecord { reason }) => {
                tracing::warn!(source = %sources[s].name, position, reason = %reason, "Skipping malformed record");
                source_stats.malformed += 1;
            }
            Err(CleanError::Cancelled) => source_stats.cancelled += 1,
            Err(e) => {
                tracing::error!(source = %sources[s].name, position, error = %e, "Record excluded");
                if matches!(e, CleanError::SchemaViolation { .. }) {
                    source_stats.schema_violations += 1;
                }
                summary.hard_errors.push(HardError {
                    source: sources[s].name.clone(),
                    position,
                    message: e.to_string(),
                });
            }
        }
    }
    (stats, per_source)
}

/// Load every configured source file.
///
/// A missing or unreadable file fails the run: it is a configuration error,
/// not bad record data.
pub fn load_batches(sources: &[SourceConfig]) -> prodclean_common::Result<Vec<RawBatch>> {
    sources
        .iter()
        .map(|config| {
            let mut source = SourceInfo::new(config.name.as_str(), config.url.as_str());
            if let Some(text) = &config.scraped_at {
                match time::parse_timestamp(text) {
                    Some(ts) => source = source.with_scraped_at(ts),
                    None => tracing::warn!(source = %config.name, scraped_at = %text, "ignoring unrecognized scraped_at"),
                }
            }
            let batch = RawBatch::load(source, &config.file)?;
            tracing::info!(source = %config.name, file = %config.file.display(), records = batch.len(), "Loaded source");
            Ok(batch)
        })
        .collect()
}

/// Schema field for a raw key, tolerating an `is_` prefix
fn schema_field_for_key(key: &str) -> Option<&'static FieldDef> {
    MASTER_SCHEMA.find_loose(key).or_else(|| {
        let loose = loose_key(key);
        loose
            .strip_prefix("is")
            .filter(|rest| !rest.is_empty())
            .and_then(|rest| MASTER_SCHEMA.find_loose(rest))
    })
}

/// List items from an array or a delimited string
fn list_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).flat_map(|t| split_list(&t)).collect(),
        other => value_to_text(other).map(|t| split_list(&t)).unwrap_or_default(),
    }
}

/// Free text gathered for the InferenceEngine
#[derive(Debug, Default)]
struct InferenceTexts {
    description: String,
    ingredients: Option<String>,
    allergy_warning: Option<String>,
    nutrition: String,
    nutrition_per_serving: String,
}

impl InferenceTexts {
    fn collect(raw: &RawProductRecord) -> Self {
        let mut description_parts: Vec<String> = Vec::new();
        for aliases in [LONG_DESCRIPTION_ALIASES, SHORT_DESCRIPTION_ALIASES] {
            if let Some(text) = raw.lookup_text(aliases) {
                description_parts.push(text);
            }
        }
        for alias in INFERENCE_TEXT_ALIASES.iter().copied() {
            if let Some(value) = raw.lookup(&[alias]) {
                description_parts.extend(list_items(value));
            }
        }

        let mut nutrition_parts: Vec<String> = raw.lookup_text(NUTRITION_TEXT_ALIASES).into_iter().collect();
        let mut serving_parts = Vec::new();
        for (key, object) in raw.nested_objects() {
            let key = loose_key(key);
            if NUTRITION_OBJECT_MARKERS.iter().any(|m| key.contains(m)) {
                flatten_nutrition(object, key.contains("serving"), &mut nutrition_parts, &mut serving_parts);
            } else if key.contains("serving") {
                flatten_nutrition(object, true, &mut nutrition_parts, &mut serving_parts);
            }
        }

        Self {
            description: description_parts.join(". "),
            ingredients: raw.lookup(INGREDIENT_ALIASES).map(list_items).filter(|items| !items.is_empty()).map(|items| items.join(", ")),
            allergy_warning: raw.lookup_text(ALLERGY_ALIASES),
            nutrition: nutrition_parts.join("; "),
            nutrition_per_serving: serving_parts.join("; "),
        }
    }
}

/// `{"energy": "1880kJ", "per_serving": {...}}` → `"energy 1880kJ"` entries
fn flatten_nutrition(object: &Map<String, Value>, per_serving: bool, per_100: &mut Vec<String>, serving: &mut Vec<String>) {
    for (key, value) in object {
        let label = key.replace(['_', '-'], " ");
        match value {
            Value::Object(inner) => {
                let inner_serving = per_serving || loose_key(key).contains("serving");
                flatten_nutrition(inner, inner_serving, per_100, serving);
            }
            other => {
                if let Some(text) = value_to_text(other) {
                    let entry = format!("{} {}", label, text);
                    if per_serving {
                        serving.push(entry);
                    } else {
                        per_100.push(entry);
                    }
                }
            }
        }
    }
}

/// Convenience for callers holding one file: load and run in one step
pub async fn clean_file(
    cleaner: Arc<ProductCleaner>,
    source: SourceInfo,
    path: &Path,
    vocabulary: SharedVocabulary,
) -> CleanResult<BatchResult> {
    let batch = RawBatch::load(source, path)?;
    cleaner.run(vec![batch], vocabulary, CancellationToken::new()).await
}

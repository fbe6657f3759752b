//! End-to-end tests for batch cleaning
//!
//! Covers:
//! - Schema totality of every output record
//! - First-seen deduplication across sources
//! - Malformed records skipped and counted without aborting the batch
//! - Brand learning persisted across runs
//! - Cancellation before any record starts
//! - Loading a source file from disk

use std::sync::Arc;

use prodclean::models::schema::names;
use prodclean::services::name_cleaner::NameCleaner;
use prodclean::{
    clean_file, BrandVocabulary, ProductCleaner, RawBatch, SharedVocabulary, SourceInfo, MASTER_SCHEMA,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn bestway() -> SourceInfo {
    SourceInfo::new("Bestway Wholesale", "https://www.bestwaywholesale.co.uk")
}

fn booker() -> SourceInfo {
    SourceInfo::new("Booker", "https://www.booker.co.uk")
}

fn batch(source: SourceInfo, records: Value) -> RawBatch {
    match records {
        Value::Array(items) => RawBatch::new(source, items),
        other => RawBatch::new(source, vec![other]),
    }
}

fn seeded() -> SharedVocabulary {
    SharedVocabulary::new(BrandVocabulary::seeded())
}

async fn run(batches: Vec<RawBatch>, vocabulary: SharedVocabulary) -> prodclean::BatchResult {
    Arc::new(ProductCleaner::default())
        .run(batches, vocabulary, CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_every_record_has_exactly_the_schema_fields() {
    let result = run(
        vec![batch(
            bestway(),
            json!([
                {"name": "Coca-Cola Original Taste 24 x 330ml Cans", "price": "£9.99", "colour": "red"},
                {"title": "Heinz Baked Beans 415g", "details": {"category": "Grocery > Tins"}},
                {"Product Name": "Walkers Ready Salted Crisps 32.5g", "Vegan": true, "unknown_key": [1, 2]},
            ]),
        )],
        seeded(),
    )
    .await;

    assert_eq!(result.records.len(), 3);
    for record in &result.records {
        let order: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        let schema: Vec<&str> = MASTER_SCHEMA.names().collect();
        assert_eq!(order, schema);

        let json = serde_json::to_value(record).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), MASTER_SCHEMA.len());
        assert!(!object.contains_key("price"));
        assert!(!object.contains_key("colour"));
    }
}

#[tokio::test]
async fn test_duplicates_keep_first_seen_across_sources() {
    let result = run(
        vec![
            batch(
                bestway(),
                json!([
                    {"name": "Heinz Baked Beans 415g", "id": "B1"},
                    {"name": "Irn Bru 330ml", "id": "B2"},
                ]),
            ),
            batch(
                booker(),
                json!([
                    {"name": "HEINZ  baked beans 415g", "id": "K9"},
                    {"name": "Heinz Tomato Ketchup 460g", "id": "K10"},
                ]),
            ),
        ],
        seeded(),
    )
    .await;

    assert_eq!(result.records.len(), 3);
    let beans = &result.records[0];
    assert_eq!(beans.text(names::PRODUCT_ID), "BES_B1");
    assert_eq!(beans.text(names::SOURCE_WEBSITE_NAME), "Bestway Wholesale");
    assert_eq!(beans.text(names::SOURCE_WEBSITE_URL), "https://www.bestwaywholesale.co.uk");
    assert!(!beans.text(names::CONTENT_HASH).is_empty());
    assert!(!beans.text(names::CLEANED_AT).is_empty());

    assert_eq!(result.records[1].text(names::BRAND), "Irn-Bru");
    assert_eq!(result.records[2].text(names::PRODUCT_ID), "BOO_K10");

    let summary = &result.summary;
    assert_eq!(summary.sources[0].cleaned, 2);
    assert_eq!(summary.sources[0].duplicates, 0);
    assert_eq!(summary.sources[1].cleaned, 1);
    assert_eq!(summary.sources[1].duplicates, 1);
    assert_eq!(summary.totals.duplicates, 1);
    assert_eq!(summary.totals.input, 4);
}

#[tokio::test]
async fn test_malformed_records_are_skipped_and_counted() {
    let result = run(
        vec![batch(
            bestway(),
            json!([
                {"name": "Lucozade Energy Orange 380ml"},
                {"description": "Ingredients: water", "price": "£1.00"},
                "not a product",
                {"name": "null"},
                {"name": "Ribena Blackcurrant 500ml"},
            ]),
        )],
        seeded(),
    )
    .await;

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].text(names::BRAND), "Lucozade");
    assert_eq!(result.records[1].text(names::BRAND), "Ribena");

    let stats = &result.summary.sources[0];
    assert_eq!(stats.input, 5);
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.cleaned, 2);
    assert!(result.summary.hard_errors.is_empty());
    assert!(!result.summary.cancelled);
}

#[tokio::test]
async fn test_description_inference_end_to_end() {
    let result = run(
        vec![batch(
            bestway(),
            json!({
                "name": "Kenco Latte Sachets",
                "description": "Ingredients: Coffee, sugar, milk. Energy 45kcal",
            }),
        )],
        seeded(),
    )
    .await;

    let record = &result.records[0];
    assert_eq!(record.number(names::CALORIES), Some(45.0));
    assert!(record.flag("Contains Milk"));
    assert!(!record.flag("Contains Peanuts"));
    assert_eq!(record.list(names::INGREDIENTS_LIST), ["Coffee", "sugar", "milk"]);
}

#[tokio::test]
async fn test_unit_normalization_of_uppercase_size() {
    let result = run(vec![batch(bestway(), json!({"name": "Volvic Still Water 250ML"}))], seeded()).await;

    let record = &result.records[0];
    assert_eq!(record.number(names::PACKAGE_SIZE_VALUE), Some(250.0));
    assert_eq!(record.text(names::PACKAGE_SIZE_UNIT), "ml");
    assert_eq!(record.number(names::VOLUME_FOR_LIQUIDS), Some(250.0));
    assert_eq!(record.number(names::PACK_COUNT), Some(1.0));
    assert!(!record.flag(names::IS_MULTIPACK));
}

#[tokio::test]
async fn test_learned_brand_is_not_new_on_second_run() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("brand_vocabulary.json");
    let records = json!([{"name": "Oatly Milk 1L"}, {"name": "Oatly Milk Semi 1L"}]);

    let vocabulary = SharedVocabulary::new(BrandVocabulary::load(&path).unwrap());
    let first = run(vec![batch(bestway(), records.clone())], vocabulary.clone()).await;
    assert_eq!(first.summary.new_brands, ["Oatly"]);
    assert_eq!(first.records[0].text(names::BRAND), "Oatly");
    vocabulary.save(&path).unwrap();

    let reloaded = BrandVocabulary::load(&path).unwrap();
    assert!(reloaded.contains_brand("Oatly"));
    assert!(reloaded.contains_brand("Nescafe"));

    let second = run(vec![batch(bestway(), records)], SharedVocabulary::new(reloaded)).await;
    assert!(second.summary.new_brands.is_empty());
    assert_eq!(second.records[0].text(names::BRAND), "Oatly");
    assert_eq!(second.summary.brand_detection_rate, 100.0);
}

#[tokio::test]
async fn test_cancelled_run_reports_unstarted_records() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = Arc::new(ProductCleaner::default())
        .run(
            vec![batch(
                bestway(),
                json!([{"name": "Pepsi Max 330ml"}, {"name": "Tango Orange 330ml"}]),
            )],
            seeded(),
            cancel,
        )
        .await
        .unwrap();

    assert!(result.records.is_empty());
    assert!(result.summary.cancelled);
    assert_eq!(result.summary.sources[0].cancelled, 2);
    assert_eq!(result.summary.sources[0].cleaned, 0);
}

#[tokio::test]
async fn test_clean_file_reads_products_wrapper() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bestway.json");
    let text = json!({
        "products": [
            {"name": "Fanta Orange 2L", "ean": "5449000004840", "scraped_at": "2024-03-01T09:30:00Z"},
            {"name": "Sprite 2L"},
        ]
    })
    .to_string();
    std::fs::write(&path, text).unwrap();

    let result = clean_file(Arc::new(ProductCleaner::default()), bestway(), &path, seeded())
        .await
        .unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].text(names::BARCODE), "5449000004840");
    assert!(result.records[0].text(names::SCRAPED_AT).starts_with("2024-03-01"));
    assert!(result.records[1].number(names::DATA_COMPLETENESS).is_some_and(|p| p > 0.0));
}

#[tokio::test]
async fn test_clean_file_missing_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.json");

    let result = clean_file(Arc::new(ProductCleaner::default()), bestway(), &path, seeded()).await;
    assert!(result.is_err());
}

#[test]
fn test_cleaned_names_are_stable_under_recleaning() {
    let cleaner = NameCleaner::default();
    for raw in [
        "Nescafe Cappuccino Unsweetened PMP £3.99 7 x 14.2g",
        "Coca-Cola Original Taste 24 x 330ml Cans",
        "HEINZ baked beans 415g",
        "Walkers Ready Salted Crisps (32.5g)",
    ] {
        let once = cleaner.clean(raw).name;
        let twice = cleaner.clean(&once).name;
        assert_eq!(once, twice, "recleaning changed {:?}", raw);
    }
}

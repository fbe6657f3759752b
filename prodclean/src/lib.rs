//! prodclean - Product record cleaning engine
//!
//! Turns heterogeneous scraped grocery records into canonical records that
//! carry exactly the [`MASTER_SCHEMA`] field set:
//!
//! - **NameCleaner**: strips price, promo and size noise from product names
//! - **BrandResolver**: explicit brand or name heuristics, learned into a shared [`BrandVocabulary`]
//! - **Normalizer**: unit and type coercion into schema types
//! - **InferenceEngine**: allergen, nutrition, dietary and certification facts from free text
//! - **SchemaEnforcer**: projection onto the schema with a final type check
//! - **BatchMerger**: content-hash dedup and merge metadata across sources
//!
//! [`ProductCleaner::run`] drives a whole batch and returns the merged records
//! with a [`RunSummary`].

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;

pub use config::CleanerSettings;
pub use error::{CleanError, CleanResult, DegradedField, VocabularyError};
pub use models::{
    CanonicalProductRecord, FactSet, FieldValue, MasterSchema, RawBatch, RawProductRecord, SourceInfo,
    MASTER_SCHEMA, SCHEMA_VERSION,
};
pub use pipeline::{clean_file, load_batches, BatchResult, CleanedRecord, ProductCleaner};
pub use services::brand_vocabulary::{BrandVocabulary, SharedVocabulary};
pub use services::statistics::RunSummary;

//! Data model: schema table, typed records, raw input

pub mod raw;
pub mod record;
pub mod schema;

pub use raw::{RawBatch, RawProductRecord, SourceInfo};
pub use record::{CanonicalProductRecord, FactSet, FieldValue};
pub use schema::{FieldCategory, FieldDef, FieldType, MasterSchema, MASTER_SCHEMA, SCHEMA_VERSION};

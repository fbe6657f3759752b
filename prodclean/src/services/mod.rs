//! Cleaning stages and their supporting tables

pub mod batch_merger;
pub mod brand_resolver;
pub mod brand_vocabulary;
pub mod category_mapper;
pub mod identity;
pub mod inference;
pub mod name_cleaner;
pub mod normalizer;
pub mod packaging;
pub mod schema_enforcer;
pub mod statistics;

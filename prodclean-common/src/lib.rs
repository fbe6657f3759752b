//! prodclean-common - Shared code for the product cleaning workspace
//!
//! This crate contains:
//! - Common error type
//! - TOML configuration model and config file resolution
//! - Timestamp helpers
//! - Atomic file writes

pub mod config;
pub mod error;
pub mod fs;
pub mod time;

pub use error::{Error, Result};

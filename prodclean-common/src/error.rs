//! Common error types

use thiserror::Error;

/// Common result type for the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a source file, the vocabulary or the config; writing outputs
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file or vocabulary snapshot is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML text passed to `CleanerConfig::from_toml_str` is invalid
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Config file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named file or entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied data has the wrong shape, e.g. a source file that is
    /// neither an array nor a `products` wrapper
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A background task failed to complete
    #[error("Internal error: {0}")]
    Internal(String),
}

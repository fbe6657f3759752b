//! Configuration loading and path resolution
//!
//! The TOML file has four sections:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [cleaner]
//! dedupe_fields = ["Brand", "Product Name", "Package Size"]
//! brand_stoplist = ["milk", "juice"]
//!
//! [paths]
//! brand_vocabulary = "brands.json"
//! output_dir = "cleaned"
//!
//! [[sources]]
//! name = "Bestway Wholesale"
//! url = "https://www.bestwaywholesale.co.uk"
//! file = "raw/bestway.json"
//! ```
//!
//! Every `[cleaner]` key is optional. A present key replaces the built-in
//! table wholesale; it is not merged with it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PRODCLEAN_CONFIG";

/// Environment variable naming the output directory
pub const OUTPUT_DIR_ENV_VAR: &str = "PRODCLEAN_OUTPUT_DIR";

/// Output directory used when nothing else is configured
pub const DEFAULT_OUTPUT_DIR: &str = "cleaned";

/// Vocabulary file name used when no path is configured
pub const DEFAULT_VOCABULARY_FILE: &str = "brand_vocabulary.json";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cleaner: CleanerOptions,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Overrides for the cleaner's built-in tables.
///
/// `None` keeps the built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanerOptions {
    /// Allergen field name (e.g. `"Contains Milk"`) to trigger keywords
    #[serde(default)]
    pub allergen_lexicon: Option<BTreeMap<String, Vec<String>>>,

    /// Generic nouns that end a heuristic brand (e.g. `"milk"`, `"juice"`)
    #[serde(default)]
    pub brand_stoplist: Option<Vec<String>>,

    /// Unit spelling (e.g. `"litres"`) to canonical symbol (e.g. `"l"`)
    #[serde(default)]
    pub unit_table: Option<BTreeMap<String, String>>,

    /// Schema fields that feed the content hash
    #[serde(default)]
    pub dedupe_fields: Option<Vec<String>>,
}

/// File locations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default)]
    pub brand_vocabulary: Option<PathBuf>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// One scraped source to clean
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Human-readable source name (becomes `Source Website Name`)
    pub name: String,

    /// Source site URL (becomes `Source Website URL`)
    pub url: String,

    /// Raw JSON file produced by the scraper
    pub file: PathBuf,

    /// Scrape time for the whole file, when records don't carry their own
    #[serde(default)]
    pub scraped_at: Option<String>,
}

impl SourceConfig {
    /// Parse the CLI form `NAME,URL,FILE`.
    ///
    /// The file part may itself contain commas.
    pub fn from_cli_arg(arg: &str) -> Result<Self> {
        let mut parts = arg.splitn(3, ',');
        let name = parts.next().map(str::trim).unwrap_or_default();
        let url = parts.next().map(str::trim).unwrap_or_default();
        let file = parts.next().map(str::trim).unwrap_or_default();

        if name.is_empty() || file.is_empty() {
            return Err(Error::InvalidInput(format!(
                "source must be NAME,URL,FILE (got {:?})",
                arg
            )));
        }

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            file: PathBuf::from(file),
            scraped_at: None,
        })
    }
}

impl CleanerConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), sources = config.sources.len(), "loaded config");
        Ok(config)
    }

    /// Resolve and load configuration, falling back to defaults when no file is found
    pub fn resolve_and_load(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("no config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. User config file, if it exists
/// 4. None (built-in defaults)
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config file
    default_config_path().filter(|p| p.exists())
}

/// Platform config file location (`~/.config/prodclean/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("prodclean").join("config.toml"))
}

/// Output directory resolution:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML `[paths] output_dir`
/// 4. `./cleaned`
pub fn resolve_output_dir(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &CleanerConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.paths.output_dir {
        return path.clone();
    }

    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

/// Brand vocabulary path resolution:
/// 1. Command-line argument
/// 2. TOML `[paths] brand_vocabulary`
/// 3. `<output_dir>/brand_vocabulary.json`
pub fn resolve_vocabulary_path(cli_arg: Option<&Path>, config: &CleanerConfig, output_dir: &Path) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| config.paths.brand_vocabulary.clone())
        .unwrap_or_else(|| output_dir.join(DEFAULT_VOCABULARY_FILE))
}

//! Tests for configuration loading and path resolution
//!
//! Covers:
//! - Priority order for config file resolution (CLI > ENV > user file > defaults)
//! - Priority order for output directory resolution
//! - Loading a full config file from disk
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PRODCLEAN_CONFIG or PRODCLEAN_OUTPUT_DIR are marked
//! with #[serial] so they run sequentially.

use prodclean_common::config::{
    resolve_config_path, resolve_output_dir, CleanerConfig, CONFIG_ENV_VAR, DEFAULT_OUTPUT_DIR,
    OUTPUT_DIR_ENV_VAR,
};
use prodclean_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_config_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/prodclean-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/prodclean-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/prodclean-cli.toml")));

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_config_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/prodclean-env.toml");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/prodclean-env.toml")));

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_config_path_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_ne!(resolved, Some(PathBuf::from("   ")));

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_output_dir_priority() {
    env::remove_var(OUTPUT_DIR_ENV_VAR);

    let mut config = CleanerConfig::default();
    assert_eq!(
        resolve_output_dir(None, OUTPUT_DIR_ENV_VAR, &config),
        PathBuf::from(DEFAULT_OUTPUT_DIR)
    );

    config.paths.output_dir = Some(PathBuf::from("/tmp/from-toml"));
    assert_eq!(
        resolve_output_dir(None, OUTPUT_DIR_ENV_VAR, &config),
        PathBuf::from("/tmp/from-toml")
    );

    env::set_var(OUTPUT_DIR_ENV_VAR, "/tmp/from-env");
    assert_eq!(
        resolve_output_dir(None, OUTPUT_DIR_ENV_VAR, &config),
        PathBuf::from("/tmp/from-env")
    );

    assert_eq!(
        resolve_output_dir(Some(Path::new("/tmp/from-cli")), OUTPUT_DIR_ENV_VAR, &config),
        PathBuf::from("/tmp/from-cli")
    );

    // Cleanup
    env::remove_var(OUTPUT_DIR_ENV_VAR);
}

#[test]
fn test_load_config_file_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [logging]
        level = "debug"

        [paths]
        brand_vocabulary = "brands.json"

        [[sources]]
        name = "Bestway Wholesale"
        url = "https://www.bestwaywholesale.co.uk"
        file = "raw/bestway.json"

        [[sources]]
        name = "Costco"
        url = "https://www.costco.co.uk"
        file = "raw/costco.json"
        "#,
    )
    .unwrap();

    let config = CleanerConfig::load(&path).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.paths.brand_vocabulary, Some(PathBuf::from("brands.json")));
    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.sources[1].name, "Costco");
}

#[test]
fn test_load_missing_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = CleanerConfig::load(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "Expected Config error, got {:?}", err);
}

#[test]
fn test_load_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[cleaner\nbroken").unwrap();

    let err = CleanerConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "Expected Config error, got {:?}", err);
}

#[test]
#[serial]
fn test_resolve_and_load_with_env_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("env.toml");
    std::fs::write(&path, "[cleaner]\ndedupe_fields = [\"Barcode (EAN/UPC)\"]\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = CleanerConfig::resolve_and_load(None).unwrap();
    assert_eq!(
        config.cleaner.dedupe_fields,
        Some(vec!["Barcode (EAN/UPC)".to_string()])
    );

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

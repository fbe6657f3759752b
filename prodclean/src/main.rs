//! prodclean - Product record cleaner CLI
//!
//! Loads scraped source files, cleans every record into the master schema,
//! deduplicates across sources and writes:
//! - `<output_dir>/products.json`: merged canonical records
//! - `<output_dir>/summary.json`: run summary
//! - the brand vocabulary snapshot (see `--brands`)

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prodclean::{load_batches, BrandVocabulary, CleanerSettings, ProductCleaner, SharedVocabulary};
use prodclean_common::config::{
    resolve_output_dir, resolve_vocabulary_path, CleanerConfig, LoggingConfig, SourceConfig, OUTPUT_DIR_ENV_VAR,
};
use prodclean_common::fs::write_json_atomic;

const PRODUCTS_FILE: &str = "products.json";
const SUMMARY_FILE: &str = "summary.json";

/// Command-line arguments for prodclean
#[derive(Parser, Debug)]
#[command(name = "prodclean")]
#[command(about = "Clean scraped grocery product records into one canonical schema")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "PRODCLEAN_CONFIG")]
    config: Option<PathBuf>,

    /// Source to clean as NAME,URL,FILE (repeatable, added to [[sources]])
    #[arg(short, long = "source", value_name = "NAME,URL,FILE")]
    sources: Vec<String>,

    /// Brand vocabulary snapshot to load and update
    #[arg(short, long, value_name = "PATH")]
    brands: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Rayon worker threads (default: one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Clean and report without writing any files
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CleanerConfig::resolve_and_load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!(
        "Starting prodclean v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut sources = config.sources.clone();
    for arg in &args.sources {
        sources.push(SourceConfig::from_cli_arg(arg)?);
    }
    if sources.is_empty() {
        bail!("No sources to clean: pass --source NAME,URL,FILE or add [[sources]] to the config");
    }

    let output_dir = resolve_output_dir(args.output_dir.as_deref(), OUTPUT_DIR_ENV_VAR, &config);
    let vocabulary_path = resolve_vocabulary_path(args.brands.as_deref(), &config, &output_dir);
    info!(output_dir = %output_dir.display(), vocabulary = %vocabulary_path.display(), dry_run = args.dry_run, "Resolved paths");

    let settings = CleanerSettings::from_options(&config.cleaner).with_workers(args.workers);
    let cleaner = Arc::new(ProductCleaner::new(&settings));

    let vocabulary = BrandVocabulary::load(&vocabulary_path)
        .with_context(|| format!("Failed to load brand vocabulary {}", vocabulary_path.display()))?;
    let vocabulary = SharedVocabulary::new(vocabulary);

    let batches = load_batches(&sources).context("Failed to load source files")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = cleaner
        .run(batches, vocabulary.clone(), cancel)
        .await
        .context("Cleaning run failed")?;

    if args.dry_run {
        info!("Dry run: nothing written");
        return Ok(());
    }

    // Brands learned before a cancellation are kept
    vocabulary
        .save(&vocabulary_path)
        .with_context(|| format!("Failed to save brand vocabulary {}", vocabulary_path.display()))?;
    write_output(&output_dir.join(PRODUCTS_FILE), &result.records)?;
    write_output(&output_dir.join(SUMMARY_FILE), &result.summary)?;

    if result.summary.cancelled {
        warn!("Run was cancelled; outputs hold only the records cleaned before cancellation");
    }
    info!(records = result.records.len(), "Cleaning complete");
    Ok(())
}

/// Install the subscriber: `RUST_LOG` wins over `[logging] level`; a
/// configured file replaces stdout
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stdout_layer = file_layer.is_none().then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, cancelling after in-flight records");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    write_json_atomic(path, value).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote output");
    Ok(())
}

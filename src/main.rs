//! tabload CLI - main entry point

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use tabload::bulk::{BulkLoader, LoadReport};
use tabload::config::TabloadConfig;
use tabload::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use tabload::output::{DirectoryLocator, OutputLocator};
use tabload::store::{MemoryStore, RecordStore};
use tabload::{convert, DatasetGenerator, Dialect};

/// Generate, convert and bulk-load student datasets
#[derive(Debug, Parser)]
#[command(name = "tabload", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving generated and converted files
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Minimum log level (RUST_LOG directives still apply)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log line format: text or json
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a spreadsheet of random student records
    Generate {
        /// Number of data rows
        #[arg(long, short = 'n')]
        count: u64,
        /// Fixed RNG seed for a reproducible dataset
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Convert a spreadsheet into delimited text
    Convert {
        source: PathBuf,
        /// quoted or plain
        #[arg(long)]
        dialect: Option<Dialect>,
    },
    /// Bulk-load delimited text into the students table
    Upload {
        source: PathBuf,
        #[arg(long, env = "TABLOAD_DATABASE_URL", conflicts_with = "dry_run")]
        database_url: Option<String>,
        /// Load into an in-memory table instead of a database
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Warning: {}; using default logging settings", e);
        LogConfig::default()
    });
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    // the CLI still works without a logger
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = run(cli) {
        error!(error = %e, "command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<TabloadConfig> {
    let mut config = match &cli.config {
        Some(path) => TabloadConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TabloadConfig::from_env(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;
    let locator = DirectoryLocator::new(&config.output_dir);

    match cli.command {
        Command::Generate { count, seed } => {
            let destination = locator.build_file_path("students", ".xlsx")?;
            let mut generator = match seed {
                Some(seed) => DatasetGenerator::seeded(config.generator.clone(), seed)?,
                None => DatasetGenerator::new(config.generator.clone())?,
            };
            let path = generator
                .generate(count, &destination)
                .context("generation failed")?;
            println!("{}", path.display());
        }
        Command::Convert { source, dialect } => {
            if let Some(dialect) = dialect {
                config.convert.dialect = dialect;
            }
            let destination = locator.build_file_path("students", ".csv")?;
            let summary = convert(&source, &destination, &config.reader, &config.convert)
                .with_context(|| format!("failed to convert {}", source.display()))?;
            println!("{} ({} rows)", summary.destination.display(), summary.rows);
        }
        Command::Upload {
            source,
            database_url,
            dry_run,
        } => {
            let report = if dry_run {
                upload(MemoryStore::new(), &config, &source)?
            } else {
                let url = database_url
                    .or_else(|| config.load.database_url.clone())
                    .context("no database URL; pass --database-url or --dry-run")?;
                upload_postgres(&url, &config, &source)?
            };
            println!("{} rows via {:?}", report.rows, report.path);
        }
    }
    Ok(())
}

fn upload<S: RecordStore>(store: S, config: &TabloadConfig, source: &Path) -> Result<LoadReport> {
    let loader = BulkLoader::new(store, config.load.clone());
    loader
        .upload(source)
        .with_context(|| format!("failed to upload {}", source.display()))
}

#[cfg(feature = "postgres")]
fn upload_postgres(url: &str, config: &TabloadConfig, source: &Path) -> Result<LoadReport> {
    let store = tabload::store::PostgresStore::new(url, config.load.table.clone());
    upload(store, config, source)
}

#[cfg(not(feature = "postgres"))]
fn upload_postgres(_url: &str, _config: &TabloadConfig, _source: &Path) -> Result<LoadReport> {
    anyhow::bail!("built without the `postgres` feature; use --dry-run")
}

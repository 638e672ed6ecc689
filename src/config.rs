//! Pipeline configuration
//!
//! Every knob has a default matching the historical service, so an empty
//! TOML document (or no file at all) yields a working configuration.
//!
//! ```toml
//! [reader]
//! max_bytes = 500000000
//! min_inflate_ratio = 0.0
//!
//! [load]
//! table = "students"
//! dialect = "plain"
//! ```

use crate::codec::Dialect;
use crate::error::{Result, TableError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `load.database_url`
pub const ENV_DATABASE_URL: &str = "TABLOAD_DATABASE_URL";
/// Environment variable overriding `output_dir`
pub const ENV_OUTPUT_DIR: &str = "TABLOAD_OUTPUT_DIR";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TabloadConfig {
    /// Directory receiving generated and converted files
    pub output_dir: PathBuf,
    pub generator: GeneratorConfig,
    pub reader: ReaderConfig,
    pub convert: ConvertConfig,
    pub load: LoadConfig,
}

impl Default for TabloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            generator: GeneratorConfig::default(),
            reader: ReaderConfig::default(),
            convert: ConvertConfig::default(),
            load: LoadConfig::default(),
        }
    }
}

/// Windowed writer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Maximum rows held in memory before the oldest are flushed
    pub window_size: usize,
    /// Rows appended between two flushes
    pub flush_interval: usize,
    /// Name of the single worksheet
    pub sheet_name: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            window_size: 5000,
            flush_interval: 5000,
            sheet_name: "students".to_string(),
        }
    }
}

/// Streaming reader safety settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Ceiling on the container size and on decompressed worksheet bytes
    pub max_bytes: u64,
    /// Minimum compressed/uncompressed ratio; 0.0 accepts any ratio
    pub min_inflate_ratio: f64,
    /// Bytes pulled from the worksheet stream per read
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_bytes: 500_000_000,
            min_inflate_ratio: 0.0,
            chunk_size: 64 * 1024,
        }
    }
}

/// Spreadsheet to text conversion settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Rows per write batch
    pub batch_size: usize,
    pub score_offset: i64,
    pub dialect: Dialect,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            score_offset: 10,
            dialect: Dialect::Plain,
        }
    }
}

/// Bulk-load settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Records per chunk sent through the pipe
    pub batch_size: usize,
    /// Chunks the pipe holds before the producer blocks
    pub pipe_capacity: usize,
    pub score_offset: i32,
    pub table: String,
    pub dialect: Dialect,
    /// PostgreSQL connection string
    pub database_url: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            pipe_capacity: 8,
            score_offset: 5,
            table: "students".to_string(),
            dialect: Dialect::Plain,
            database_url: None,
        }
    }
}

impl TabloadConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TableError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TableError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::from_toml_str(&content)?.with_env_overrides())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `TABLOAD_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            if !url.is_empty() {
                self.load.database_url = Some(url);
            }
        }
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            if !dir.is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Reject settings that would stall or divide by zero
    pub fn validate(&self) -> Result<()> {
        if self.generator.window_size == 0 || self.generator.flush_interval == 0 {
            return Err(TableError::Config(
                "generator.window_size and generator.flush_interval must be positive".into(),
            ));
        }
        if self.reader.chunk_size == 0 {
            return Err(TableError::Config("reader.chunk_size must be positive".into()));
        }
        let ratio = self.reader.min_inflate_ratio;
        if ratio.is_nan() || ratio < 0.0 {
            return Err(TableError::Config(
                "reader.min_inflate_ratio must be a non-negative number".into(),
            ));
        }
        if self.convert.batch_size == 0 || self.load.batch_size == 0 {
            return Err(TableError::Config("batch sizes must be positive".into()));
        }
        if self.load.pipe_capacity == 0 {
            return Err(TableError::Config("load.pipe_capacity must be positive".into()));
        }
        if self.load.table.is_empty()
            || !self
                .load
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(TableError::Config(format!(
                "load.table '{}' is not a plain identifier",
                self.load.table
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TabloadConfig::default();
        assert_eq!(config.generator.window_size, 5000);
        assert_eq!(config.reader.max_bytes, 500_000_000);
        assert_eq!(config.reader.min_inflate_ratio, 0.0);
        assert_eq!(config.convert.score_offset, 10);
        assert_eq!(config.load.score_offset, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TabloadConfig::from_toml_str(
            r#"
            [load]
            table = "pupils"
            dialect = "quoted"

            [reader]
            min_inflate_ratio = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(config.load.table, "pupils");
        assert_eq!(config.load.dialect, Dialect::Quoted);
        assert_eq!(config.load.batch_size, 5000);
        assert_eq!(config.reader.min_inflate_ratio, 0.01);
        assert_eq!(config.convert.batch_size, 1000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(TabloadConfig::from_toml_str("[load]\npipe_capacity = 0").is_err());
        assert!(TabloadConfig::from_toml_str("[load]\ntable = \"x; drop\"").is_err());
        assert!(TabloadConfig::from_toml_str("[generator]\nwindow_size = 0").is_err());
    }
}

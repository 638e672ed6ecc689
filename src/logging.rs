//! Logging configuration and initialization
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or to an embedding application), which calls
//! [`init_logging`] once at startup.
//!
//! Filtering follows `RUST_LOG` when it is set, on top of the configured
//! default level:
//!
//! ```text
//! RUST_LOG=tabload::bulk=debug tabload upload students.csv
//! ```

use crate::error::{Result, TableError};
use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(TableError::Config(format!("invalid log level: {}", s))),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(TableError::Config(format!("invalid log format: {}", s))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Extra filter directives, e.g. `"postgres=warn,tabload::bulk=debug"`
    pub filter_directives: Option<String>,
    pub include_thread_ids: bool,
}

impl LogConfig {
    /// Read `LOG_LEVEL`, `LOG_FORMAT` and `LOG_FILTER`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; `from_env` uses the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }
        Ok(config)
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter =
            EnvFilter::from_default_env().add_directive(self.level.to_tracing_level().into());
        if let Some(directives) = &self.filter_directives {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                let directive = directive.trim().parse().map_err(|e| {
                    TableError::Config(format!("invalid filter directive '{}': {}", directive, e))
                })?;
                filter = filter.add_directive(directive);
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber; logs go to stderr
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.filter()?;
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(config.include_thread_ids)
        .with_span_events(FmtSpan::CLOSE);

    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .try_init(),
    };
    installed.map_err(|e| TableError::Config(format!("cannot install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels_and_formats() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_bad_directive_is_rejected() {
        let config = LogConfig {
            filter_directives: Some("tabload=notalevel".into()),
            ..LogConfig::default()
        };
        assert!(config.filter().is_err());
    }

    #[test]
    fn test_lookup_reads_and_rejects_values() {
        let config = LogConfig::from_lookup(|key| match key {
            "LOG_LEVEL" => Some("debug".into()),
            "LOG_FORMAT" => Some("json".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.filter_directives.is_none());

        let err = LogConfig::from_lookup(|key| (key == "LOG_LEVEL").then(|| "loud".to_string()))
            .unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
    }
}

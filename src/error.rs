//! Error types for tabload

use thiserror::Error;

/// Errors raised by the generation, conversion and bulk-load stages
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O failure on a source, destination or temporary file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container could not be read or written as a ZIP package
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Input does not have the expected container or text shape
    #[error("Format error: {0}")]
    Format(String),

    /// Input exceeds the configured size ceiling
    #[error("Size limit exceeded: {size} bytes (limit {limit} bytes)")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// Worksheet entry compresses better than the configured minimum ratio allows
    #[error("Compression ratio {ratio:.5} is below the allowed minimum {minimum:.5}")]
    CompressionRatio { ratio: f64, minimum: f64 },

    /// Writer misuse or a failure while finalizing output
    #[error("Write error: {0}")]
    WriteError(String),

    /// The relational store rejected a command or the connection failed
    #[error("Store error: {0}")]
    Store(String),

    /// The operation was cancelled while waiting on the producer
    #[error("Operation interrupted")]
    Interrupted,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(feature = "postgres")]
impl From<postgres::Error> for TableError {
    fn from(err: postgres::Error) -> Self {
        TableError::Store(err.to_string())
    }
}

impl From<tempfile::PersistError> for TableError {
    fn from(err: tempfile::PersistError) -> Self {
        TableError::Io(err.error)
    }
}

impl TableError {
    /// True for the cooperative-cancellation error
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TableError::Interrupted)
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit_message() {
        let err = TableError::SizeLimitExceeded {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Size limit exceeded: 2048 bytes (limit 1024 bytes)"
        );
    }

    #[test]
    fn test_interrupted_is_distinguishable() {
        assert!(TableError::Interrupted.is_interrupted());
        assert!(!TableError::Format("x".into()).is_interrupted());
    }
}

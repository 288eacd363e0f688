//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;
use vaultgraph_core::ConfigError;

/// Errors that can occur during indexing operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File could not be turned into metadata
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Graph store rejected a statement or the connection failed
    #[error("Store error: {0}")]
    Store(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dump buffer could not be written or replayed
    #[error("Dump error: {0}")]
    Dump(String),
}

impl From<neo4rs::Error> for IndexerError {
    fn from(e: neo4rs::Error) -> Self {
        IndexerError::Store(e.to_string())
    }
}

impl From<neo4rs::DeError> for IndexerError {
    fn from(e: neo4rs::DeError) -> Self {
        IndexerError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::NotFound(PathBuf::from("/test/path"));
        assert!(err.to_string().contains("/test/path"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IndexerError = io_err.into();
        assert!(matches!(err, IndexerError::Io(_)));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: IndexerError = ConfigError::Invalid("x".to_string()).into();
        assert!(matches!(err, IndexerError::Config(_)));
    }
}

//! Configuration error types.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Semantically invalid configuration (bad glob, empty rules, ...)
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

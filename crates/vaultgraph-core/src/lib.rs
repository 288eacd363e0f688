//! VaultGraph Core
//!
//! Shared configuration model for the VaultGraph indexer and daemon:
//! source roots, content-type rules, debounce interval and graph store
//! connection settings.

mod config;
mod error;

pub use config::{ContentRules, IndexerConfig, SourceConfig, StoreConfig};
pub use error::ConfigError;

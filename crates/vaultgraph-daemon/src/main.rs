//! VaultGraph Daemon
//!
//! Indexes the configured sources into the graph store, then keeps the
//! graph current by watching for changes until interrupted.
//!
//! Usage: `vaultgraph-daemon [CONFIG]`. Without an argument the config is
//! read from `~/.vaultgraph/config.yaml`, falling back to defaults.

mod daemon;
mod signals;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultgraph_core::IndexerConfig;

pub use daemon::Daemon;

fn load_config() -> Result<IndexerConfig> {
    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => IndexerConfig::load_from(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(IndexerConfig::load()),
    }
}

/// Run the daemon
pub async fn run(config: IndexerConfig) -> Result<()> {
    let daemon = Daemon::new(config)?;
    daemon.run().await
}

fn main() -> Result<()> {
    let config = load_config()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting VaultGraph daemon v{}", env!("CARGO_PKG_VERSION"));

    // Run async runtime
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

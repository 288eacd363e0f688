//! Daemon lifecycle management.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultgraph_core::IndexerConfig;
use vaultgraph_indexer::{
    Classifier, FileWatcher, Neo4jStore, Pipeline, ScanReport, Scanner, SyncClient,
};

use crate::signals;

/// The main daemon process
pub struct Daemon {
    config: IndexerConfig,
    pid_file: PathBuf,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: IndexerConfig) -> Result<Self> {
        let data_dir = IndexerConfig::default_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(Self {
            config: canonical_sources(config),
            pid_file: data_dir.join("daemon.pid"),
        })
    }

    /// Run the daemon: full scan, then watch until a shutdown signal.
    pub async fn run(&self) -> Result<()> {
        // Check single instance
        acquire_pid_lock(&self.pid_file)?;
        let result = self.serve().await;
        self.cleanup();
        result
    }

    async fn serve(&self) -> Result<()> {
        let sources: Vec<_> = self.config.enabled_sources().cloned().collect();
        if sources.is_empty() {
            anyhow::bail!("No enabled sources configured");
        }
        let roots: Vec<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();

        tracing::info!(
            sources = sources.len(),
            store = %self.config.store.uri,
            dump = self.config.dump_path.is_some(),
            "Daemon starting"
        );

        let classifier = Arc::new(Classifier::new(&self.config)?);
        let store = Arc::new(
            Neo4jStore::connect(&self.config.store)
                .await
                .context("Failed to connect to graph store")?,
        );
        let direct_sync = Arc::new(SyncClient::direct(store.clone()));
        let direct = Arc::new(Pipeline::new(classifier.clone(), direct_sync.clone()));

        let report = match &self.config.dump_path {
            Some(dump_path) => {
                bulk_load(classifier.clone(), &store, direct_sync, &sources, dump_path).await?
            }
            None => Scanner::new(direct.clone()).full_scan(&sources, None).await?,
        };
        tracing::info!(
            notes = report.notes,
            code = report.code,
            assets = report.assets,
            skipped = report.skipped,
            "Initial index complete"
        );

        let watcher = FileWatcher::new(direct, self.config.debounce());
        watcher
            .watch(&roots)
            .context("Failed to start file watcher")?;

        signals::wait_for_shutdown().await;
        tracing::info!("Shutdown signal received");
        watcher.stop();

        Ok(())
    }

    /// Cleanup resources on shutdown
    fn cleanup(&self) {
        tracing::info!("Cleaning up...");
        if self.pid_file.exists() {
            let _ = std::fs::remove_file(&self.pid_file);
        }
        tracing::info!("Cleanup complete");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        // Ensure cleanup happens even on panic
        if self.pid_file.exists() {
            let _ = std::fs::remove_file(&self.pid_file);
        }
    }
}

/// Scan into a dump buffer, write it out, then replay it in one pass.
/// Files gone since the last run are pruned through `direct`.
async fn bulk_load(
    classifier: Arc<Classifier>,
    store: &Neo4jStore,
    direct: Arc<SyncClient>,
    sources: &[vaultgraph_core::SourceConfig],
    dump_path: &Path,
) -> Result<ScanReport> {
    let sync = Arc::new(SyncClient::dump());
    let pipeline = Arc::new(Pipeline::new(classifier, sync.clone()));
    let report = Scanner::new(pipeline)
        .prune_through(direct.clone())
        .full_scan(sources, None)
        .await?;

    let batches = sync
        .write_dump(dump_path)
        .await
        .context("Failed to write dump")?;
    tracing::info!(path = %dump_path.display(), batches, "Replaying dump");
    store
        .load_dump(dump_path)
        .await
        .context("Failed to load dump into graph store")?;
    if let Err(e) = direct.resolve_placeholders().await {
        tracing::warn!(error = %e, "Failed to merge placeholder notes");
    }
    Ok(report)
}

/// Resolve source roots so classifier rules match the paths the OS reports.
fn canonical_sources(mut config: IndexerConfig) -> IndexerConfig {
    for source in &mut config.sources {
        match source.path.canonicalize() {
            Ok(path) => source.path = path,
            Err(e) => tracing::warn!(
                source = %source.name,
                path = %source.path.display(),
                error = %e,
                "Source root not found"
            ),
        }
    }
    config
}

/// Acquire PID lock to ensure single instance
fn acquire_pid_lock(pid_file: &Path) -> Result<()> {
    if pid_file.exists() {
        // Read existing PID
        if let Ok(pid_str) = std::fs::read_to_string(pid_file) {
            if let Ok(pid) = pid_str.trim().parse::<u32>() {
                if pid != std::process::id() && is_process_running(pid) {
                    anyhow::bail!("Daemon already running (PID: {})", pid);
                }
            }
        }
        // Stale PID file, remove it
        std::fs::remove_file(pid_file)?;
    }

    std::fs::write(pid_file, std::process::id().to_string())?;
    tracing::debug!(pid = std::process::id(), "PID lock acquired");
    Ok(())
}

/// Check if a process is running by PID
fn is_process_running(pid: u32) -> bool {
    // kill(pid, 0) only checks for existence
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgraph_core::SourceConfig;

    #[test]
    fn test_is_process_running() {
        // Current process should be running
        assert!(is_process_running(std::process::id()));

        // Very high PID should not exist
        assert!(!is_process_running(999999999));
    }

    #[test]
    fn test_pid_lock_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("daemon.pid");
        std::fs::write(&pid_file, "999999999").unwrap();

        acquire_pid_lock(&pid_file).unwrap();
        let written = std::fs::read_to_string(&pid_file).unwrap();
        assert_eq!(written, std::process::id().to_string());
    }

    #[test]
    fn test_canonical_sources_keeps_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IndexerConfig::default();
        config.sources = vec![
            SourceConfig::new("here", dir.path()),
            SourceConfig::new("gone", "/definitely/not/here"),
        ];

        let config = canonical_sources(config);
        assert_eq!(config.sources[0].path, dir.path().canonicalize().unwrap());
        assert_eq!(config.sources[1].path, PathBuf::from("/definitely/not/here"));
    }
}

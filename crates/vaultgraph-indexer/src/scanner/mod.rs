//! Full and bulk indexing.
//!
//! A single blocking task walks the roots and feeds a bounded queue; a
//! fixed pool of workers pulls from it, parses and syncs. Workers keep
//! local tallies and report them once to an aggregator when the queue is
//! drained.

mod walker;

pub use walker::{WalkEntry, Walker};

use crate::classifier::ContentType;
use crate::graph::{GraphQuery, NodeLabel, QueryOutput, SyncClient};
use crate::pipeline::Pipeline;
use crate::IndexerError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use vaultgraph_core::SourceConfig;

/// Options for a full scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of parse+sync workers
    pub workers: usize,
    /// Capacity of the job queue between the walker and the workers
    pub queue_depth: usize,
    /// Delete indexed files under the scanned roots that were not seen.
    /// Needs a live store: the pipeline's in direct mode, or the one set
    /// with `Scanner::prune_through`.
    pub prune_missing: bool,
    /// Whether to follow symlinks while walking
    pub follow_symlinks: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            queue_depth: 1024,
            prune_missing: true,
            follow_symlinks: false,
        }
    }
}

/// Outcome of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub notes: usize,
    pub code: usize,
    pub assets: usize,
    /// Files that failed to parse or sync
    pub skipped: usize,
    /// Stale file nodes removed after the walk
    pub pruned: usize,
    pub duration_ms: u64,
}

impl ScanReport {
    fn record(&mut self, content_type: ContentType) {
        match content_type {
            ContentType::Prose => self.notes += 1,
            ContentType::Code => self.code += 1,
            ContentType::Asset => self.assets += 1,
        }
    }

    fn merge(&mut self, other: &ScanReport) {
        self.notes += other.notes;
        self.code += other.code;
        self.assets += other.assets;
        self.skipped += other.skipped;
    }

    /// Files successfully indexed.
    pub fn indexed(&self) -> usize {
        self.notes + self.code + self.assets
    }
}

struct Job {
    path: PathBuf,
    content_type: ContentType,
}

/// Parallel scan orchestrator.
pub struct Scanner {
    pipeline: Arc<Pipeline>,
    options: ScanOptions,
    prune_target: Option<Arc<SyncClient>>,
}

impl Scanner {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self::with_options(pipeline, ScanOptions::default())
    }

    pub fn with_options(pipeline: Arc<Pipeline>, options: ScanOptions) -> Self {
        Self {
            pipeline,
            options,
            prune_target: None,
        }
    }

    /// Prune stale files through `sync` instead of the pipeline's client.
    /// Lets a dump-mode scan clean up a live store it will be loaded into.
    pub fn prune_through(mut self, sync: Arc<SyncClient>) -> Self {
        self.prune_target = Some(sync);
        self
    }

    fn pruner(&self) -> Option<&Arc<SyncClient>> {
        match &self.prune_target {
            Some(sync) => Some(sync),
            None => Some(self.pipeline.sync()).filter(|sync| !sync.is_dump()),
        }
    }

    /// Index every enabled source, or only `override_path` when given.
    ///
    /// A missing override path is an error; a missing configured source is
    /// logged and skipped. Per-file failures are counted, never fatal.
    pub async fn full_scan(
        &self,
        sources: &[SourceConfig],
        override_path: Option<&Path>,
    ) -> Result<ScanReport, IndexerError> {
        let start = Instant::now();
        let roots = resolve_roots(sources, override_path)?;
        let workers = self.options.workers.max(1);

        info!(
            roots = roots.len(),
            workers,
            dump = self.pipeline.sync().is_dump(),
            "Starting full scan"
        );

        let (job_tx, job_rx) = mpsc::channel::<Job>(self.options.queue_depth.max(1));
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<ScanReport>(workers);

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            handles.push(tokio::spawn(worker(
                id,
                self.pipeline.clone(),
                job_rx.clone(),
                result_tx.clone(),
            )));
        }
        drop(result_tx);

        let aggregator = tokio::spawn(async move {
            let mut total = ScanReport::default();
            while let Some(tally) = result_rx.recv().await {
                total.merge(&tally);
            }
            total
        });

        let classifier = self.pipeline.classifier().clone();
        let follow = self.options.follow_symlinks;
        let walk_roots = roots.clone();
        let walk = tokio::task::spawn_blocking(move || {
            let mut seen = HashSet::new();
            for root in &walk_roots {
                let walker = Walker::new(root, classifier.clone()).follow_symlinks(follow);
                for path in walker.files() {
                    let Some(content_type) = classifier.classify(&path) else {
                        continue;
                    };
                    seen.insert(path.clone());
                    if job_tx.blocking_send(Job { path, content_type }).is_err() {
                        return seen;
                    }
                }
            }
            seen
        });

        let seen = walk.await.map_err(join_error)?;
        for handle in handles {
            handle.await.map_err(join_error)?;
        }
        let mut report = aggregator.await.map_err(join_error)?;

        let sync = self.pipeline.sync();
        if !sync.is_dump() && report.indexed() > 0 {
            if let Err(e) = sync.resolve_placeholders().await {
                warn!(error = %e, "Failed to resolve placeholder notes");
            }
        }

        if self.options.prune_missing {
            if let Some(pruner) = self.pruner() {
                report.pruned = prune(pruner, &roots, &seen).await?;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            notes = report.notes,
            code = report.code,
            assets = report.assets,
            skipped = report.skipped,
            pruned = report.pruned,
            duration_ms = report.duration_ms,
            "Scan complete"
        );
        Ok(report)
    }
}

/// Remove file nodes under `roots` whose paths were not visited.
async fn prune(
    sync: &SyncClient,
    roots: &[PathBuf],
    seen: &HashSet<PathBuf>,
) -> Result<usize, IndexerError> {
    let Some(store) = sync.store() else {
        return Ok(0);
    };

    let mut pruned = 0;
    for root in roots {
        let mut prefix = root.to_string_lossy().into_owned();
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
        for label in NodeLabel::FILES {
            let query = GraphQuery::IndexedPaths {
                label,
                prefix: prefix.clone(),
            };
            let QueryOutput::Names(paths) = store.query(&query).await? else {
                continue;
            };
            for path in paths.iter().map(PathBuf::from) {
                if seen.contains(&path) {
                    continue;
                }
                debug!(path = ?path, "Pruning file missing from scan");
                let result = match label {
                    NodeLabel::Note => sync.delete_note(&path).await,
                    NodeLabel::Code => sync.delete_code(&path).await,
                    _ => sync.delete_path(&path).await,
                };
                match result {
                    Ok(()) => pruned += 1,
                    Err(e) => warn!(path = ?path, error = %e, "Failed to prune"),
                }
            }
        }
    }
    Ok(pruned)
}

async fn worker(
    id: usize,
    pipeline: Arc<Pipeline>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<ScanReport>,
) {
    let mut tally = ScanReport::default();
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        match pipeline.process(&job.path, job.content_type).await {
            Ok(()) => tally.record(job.content_type),
            Err(e) => {
                warn!(path = ?job.path, error = %e, "Failed to index file");
                tally.skipped += 1;
            }
        }
    }
    debug!(worker = id, indexed = tally.indexed(), "Worker drained");
    let _ = results.send(tally).await;
}

fn resolve_roots(
    sources: &[SourceConfig],
    override_path: Option<&Path>,
) -> Result<Vec<PathBuf>, IndexerError> {
    if let Some(path) = override_path {
        let root = path
            .canonicalize()
            .map_err(|_| IndexerError::NotFound(path.to_path_buf()))?;
        return Ok(vec![root]);
    }

    let mut roots = Vec::new();
    for source in sources.iter().filter(|s| s.enabled) {
        match source.path.canonicalize() {
            Ok(root) => roots.push(root),
            Err(e) => warn!(
                source = %source.name,
                path = ?source.path,
                error = %e,
                "Source root unavailable, skipping"
            ),
        }
    }
    Ok(roots)
}

fn join_error(e: tokio::task::JoinError) -> IndexerError {
    IndexerError::Io(std::io::Error::other(e.to_string()))
}

/// Get the number of CPUs available.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::graph::{MemoryGraph, NodeRef, SyncClient};
    use std::fs;
    use tempfile::tempdir;
    use vaultgraph_core::IndexerConfig;

    fn setup(root: &Path, dump: bool) -> (Arc<MemoryGraph>, Scanner, Vec<SourceConfig>) {
        let mut config = IndexerConfig::default();
        config.sources = vec![SourceConfig::new("vault", root)];
        let classifier = Arc::new(Classifier::new(&config).unwrap());
        let graph = Arc::new(MemoryGraph::new());
        let sync = if dump {
            SyncClient::dump()
        } else {
            SyncClient::direct(graph.clone())
        };
        let pipeline = Arc::new(Pipeline::new(classifier, Arc::new(sync)));
        (graph, Scanner::new(pipeline), config.sources)
    }

    fn write_vault(root: &Path) {
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::write(root.join("notes/A.md"), "---\ntags: [x]\n---\nsee [[B]]").unwrap();
        fs::write(root.join("notes/B.md"), "plain").unwrap();
        fs::write(root.join("notes/C.md"), "#y").unwrap();
        fs::write(root.join("src/main.go"), "package main\n\nfunc main() {}\n").unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "function x() {}").unwrap();
        fs::write(root.join(".obsidian/cache.md"), "hidden").unwrap();
        fs::write(root.join("notes/readme.txt"), "unclassified").unwrap();
    }

    #[tokio::test]
    async fn test_scan_counts_by_type() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        write_vault(&root);
        fs::write(root.join("pic.png"), [0u8; 4]).unwrap();

        let (graph, scanner, sources) = setup(&root, false);
        let report = scanner.full_scan(&sources, None).await.unwrap();

        assert_eq!(report.notes, 3);
        assert_eq!(report.code, 1);
        assert_eq!(report.assets, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(graph.count(NodeLabel::Code), 1);
        assert_eq!(graph.count(NodeLabel::Function), 1);
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let (graph, scanner, sources) = setup(&root, false);

        let report = scanner.full_scan(&sources, None).await.unwrap();
        assert_eq!(report.indexed(), 0);
        assert_eq!(graph.applied_batches(), 0);
    }

    #[tokio::test]
    async fn test_bad_file_is_skipped_not_fatal() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("good.md"), "fine").unwrap();
        fs::write(root.join("bad.md"), [0xffu8, 0xfe, 0x00]).unwrap();

        let (_graph, scanner, sources) = setup(&root, false);
        let report = scanner.full_scan(&sources, None).await.unwrap();
        assert_eq!(report.notes, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_rescan_prunes_missing_files() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        write_vault(&root);

        let (graph, scanner, sources) = setup(&root, false);
        scanner.full_scan(&sources, None).await.unwrap();

        let c = root.join("notes/C.md");
        fs::remove_file(&c).unwrap();
        let report = scanner.full_scan(&sources, None).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert!(!graph.contains(&NodeRef::file(NodeLabel::Note, c.to_string_lossy())));
        assert!(graph.contains(&NodeRef::file(
            NodeLabel::Note,
            root.join("notes/A.md").to_string_lossy()
        )));
    }

    #[tokio::test]
    async fn test_override_path_limits_scan() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        write_vault(&root);

        let (_graph, scanner, sources) = setup(&root, false);
        let report = scanner
            .full_scan(&sources, Some(&root.join("src")))
            .await
            .unwrap();
        assert_eq!(report.notes, 0);
        assert_eq!(report.code, 1);
    }

    #[tokio::test]
    async fn test_missing_override_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let (_graph, scanner, sources) = setup(&root, false);

        let result = scanner
            .full_scan(&sources, Some(&root.join("nope")))
            .await;
        assert!(matches!(result, Err(IndexerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let (_graph, scanner, _) = setup(&root, false);

        let sources = vec![SourceConfig::new("gone", root.join("gone"))];
        let report = scanner.full_scan(&sources, None).await.unwrap();
        assert_eq!(report, ScanReport {
            duration_ms: report.duration_ms,
            ..ScanReport::default()
        });
    }

    #[tokio::test]
    async fn test_dump_scan_makes_no_store_calls() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        write_vault(&root);

        let (graph, scanner, sources) = setup(&root, true);
        let report = scanner.full_scan(&sources, None).await.unwrap();

        assert_eq!(report.indexed(), 4);
        assert_eq!(report.pruned, 0);
        assert_eq!(graph.applied_batches(), 0);
        assert_eq!(scanner.pipeline.sync().buffered_batches(), 4);
    }

    #[tokio::test]
    async fn test_dump_scan_prunes_through_live_store() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        write_vault(&root);

        let (graph, direct_scanner, sources) = setup(&root, false);
        direct_scanner.full_scan(&sources, None).await.unwrap();
        let c = root.join("notes/C.md");
        fs::remove_file(&c).unwrap();

        let dump = Arc::new(Pipeline::new(
            direct_scanner.pipeline.classifier().clone(),
            Arc::new(SyncClient::dump()),
        ));
        let scanner =
            Scanner::new(dump).prune_through(Arc::new(SyncClient::direct(graph.clone())));
        let report = scanner.full_scan(&sources, None).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert!(!graph.contains(&NodeRef::file(NodeLabel::Note, c.to_string_lossy())));
        assert_eq!(graph.count(NodeLabel::Tag), 1);
        assert_eq!(scanner.pipeline.sync().buffered_batches(), 3);
    }
}

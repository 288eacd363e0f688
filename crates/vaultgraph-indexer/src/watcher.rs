//! File system watcher for live re-indexing.
//!
//! Every non-ignored directory gets its own non-recursive subscription, so
//! ignored trees never generate events. Notifications arrive on one stream
//! consumed by a single dispatch loop. Writes are debounced per path;
//! removals skip the debounce and delete immediately.

use crate::pipeline::Pipeline;
use crate::scanner::Walker;
use crate::IndexerError;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Kind of file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
}

/// A normalized file system change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
    pub is_dir: bool,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir,
        }
    }
}

/// Convert a notify event into zero or more changes.
///
/// Renames become a removal of the old path and a creation of the new one.
pub fn convert_event(event: &Event) -> Vec<FsEvent> {
    let first = match event.paths.first() {
        Some(path) => path,
        None => return Vec::new(),
    };

    let existing = |path: &Path| {
        if path.exists() {
            FsEvent::new(path, FsEventKind::Created, path.is_dir())
        } else {
            FsEvent::new(path, FsEventKind::Removed, false)
        }
    };

    match &event.kind {
        EventKind::Create(kind) => {
            let is_dir = *kind == CreateKind::Folder || first.is_dir();
            vec![FsEvent::new(first, FsEventKind::Created, is_dir)]
        }
        EventKind::Remove(kind) => {
            vec![FsEvent::new(first, FsEventKind::Removed, *kind == RemoveKind::Folder)]
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => vec![FsEvent::new(first, FsEventKind::Removed, false)],
            RenameMode::To => vec![FsEvent::new(first, FsEventKind::Created, first.is_dir())],
            RenameMode::Both => event.paths.iter().map(|p| existing(p)).collect(),
            _ => vec![existing(first)],
        },
        // Permission and timestamp changes don't change content.
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => {
            if first.is_dir() {
                Vec::new()
            } else {
                vec![FsEvent::new(first, FsEventKind::Modified, false)]
            }
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One-shot timers keyed by path. Scheduling a path that already has a
/// timer resets it; only the last scheduled callback runs.
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<HashMap<PathBuf, Pending>>>,
    generation: AtomicU64,
    closed: AtomicBool,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Arm (or re-arm) the timer for `path`. Must be called inside a
    /// tokio runtime. No-op after `shutdown`.
    pub fn schedule<F, Fut>(&self, path: PathBuf, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let pending = self.pending.clone();
        let key = path.clone();

        // Held across spawn so the timer cannot look itself up before it is stored.
        let mut map = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(p) if p.generation == generation => {
                        map.remove(&key);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                callback().await;
            }
        });
        if let Some(old) = map.insert(path, Pending { generation, handle }) {
            old.handle.abort();
        }
    }

    /// Drop the timer for `path`. Returns whether one was pending.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.pending.lock().remove(path) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel every pending timer and refuse new ones. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, p) in self.pending.lock().drain() {
            p.handle.abort();
        }
    }
}

struct Shared {
    pipeline: Arc<Pipeline>,
    debouncer: Debouncer,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
    stopping: AtomicBool,
}

impl Shared {
    fn subscribe(&self, dir: &Path) -> Result<bool, IndexerError> {
        if self.watched.lock().contains(dir) {
            return Ok(false);
        }
        let mut guard = self.watcher.lock();
        let Some(watcher) = guard.as_mut() else {
            return Ok(false);
        };
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| IndexerError::Watcher(format!("{}: {}", dir.display(), e)))?;
        self.watched.lock().insert(dir.to_path_buf());
        debug!(dir = ?dir, "Subscribed");
        Ok(true)
    }

    /// Forget `dir` and every subscription below it. Returns whether `dir`
    /// itself was subscribed.
    fn unsubscribe(&self, dir: &Path) -> bool {
        let removed: Vec<PathBuf> = {
            let mut watched = self.watched.lock();
            let gone: Vec<PathBuf> = watched
                .iter()
                .filter(|p| p.starts_with(dir))
                .cloned()
                .collect();
            for p in &gone {
                watched.remove(p);
            }
            gone
        };
        if let Some(watcher) = self.watcher.lock().as_mut() {
            for p in &removed {
                // The directory is usually gone already, which drops the watch.
                let _ = watcher.unwatch(p);
            }
        }
        removed.iter().any(|p| p == dir)
    }

    fn schedule(&self, path: PathBuf) {
        let pipeline = self.pipeline.clone();
        let target = path.clone();
        self.debouncer.schedule(path, move || async move {
            match pipeline.process_path(&target).await {
                Ok(Some(content_type)) => {
                    debug!(path = ?target, content_type = content_type.name(), "Re-indexed")
                }
                Ok(None) => {}
                Err(IndexerError::NotFound(_)) => {
                    debug!(path = ?target, "File vanished before processing")
                }
                Err(e) => warn!(path = ?target, error = %e, "Failed to index changed file"),
            }
        });
    }

    /// Subscribe a new directory tree and queue the files already in it.
    fn directory_created(&self, dir: &Path) {
        let classifier = self.pipeline.classifier();
        if classifier.is_ignored(dir) {
            return;
        }
        if let Err(e) = self.subscribe(dir) {
            warn!(error = %e, "Failed to subscribe new directory");
        }
        for entry in Walker::new(dir, classifier.clone()).entries() {
            if entry.is_dir {
                if let Err(e) = self.subscribe(&entry.path) {
                    warn!(error = %e, "Failed to subscribe new directory");
                }
            } else if classifier.classify(&entry.path).is_some() {
                self.schedule(entry.path);
            }
        }
    }

    async fn handle(&self, event: FsEvent) {
        debug!(path = ?event.path, kind = ?event.kind, is_dir = event.is_dir, "Change");
        match event.kind {
            FsEventKind::Removed => {
                self.debouncer.cancel(&event.path);
                let was_dir = self.unsubscribe(&event.path) || event.is_dir;
                let result = if was_dir {
                    self.pipeline.remove_subtree(&event.path).await
                } else {
                    self.pipeline.remove_path(&event.path).await
                };
                if let Err(e) = result {
                    warn!(path = ?event.path, error = %e, "Failed to remove from graph");
                }
            }
            FsEventKind::Created if event.is_dir => self.directory_created(&event.path),
            FsEventKind::Created | FsEventKind::Modified => {
                if self.pipeline.classifier().classify(&event.path).is_some() {
                    self.schedule(event.path);
                }
            }
        }
    }
}

/// Live watcher feeding changes through the indexing pipeline.
pub struct FileWatcher {
    shared: Arc<Shared>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl FileWatcher {
    pub fn new(pipeline: Arc<Pipeline>, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                debouncer: Debouncer::new(debounce),
                watcher: Mutex::new(None),
                watched: Mutex::new(HashSet::new()),
                stopping: AtomicBool::new(false),
            }),
            dispatch: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Subscribe every non-ignored directory under `roots` and start the
    /// dispatch loop. A root that does not exist is an error.
    pub fn watch(&self, roots: &[PathBuf]) -> Result<(), IndexerError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(IndexerError::Watcher("watcher already stopped".to_string()));
        }
        let roots = roots
            .iter()
            .map(|r| r.canonicalize().map_err(|_| IndexerError::NotFound(r.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        // Unbounded: subscribing from the dispatch loop round-trips through
        // the notify thread, which must never block on a full channel.
        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let watcher = notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        })
        .map_err(|e| IndexerError::Watcher(e.to_string()))?;
        *self.shared.watcher.lock() = Some(watcher);

        for root in &roots {
            self.shared.subscribe(root)?;
            let classifier = self.shared.pipeline.classifier().clone();
            for dir in Walker::new(root, classifier).dirs().skip(1) {
                if let Err(e) = self.shared.subscribe(&dir) {
                    warn!(error = %e, "Failed to subscribe directory");
                }
            }
        }

        let shared = self.shared.clone();
        let handle = tokio::spawn(dispatch(shared, rx));
        if let Some(old) = self.dispatch.lock().replace(handle) {
            old.abort();
        }

        info!(
            roots = roots.len(),
            dirs = self.watched_dirs(),
            "Started watching"
        );
        Ok(())
    }

    /// Feed one change through the watcher as if the OS had reported it.
    pub async fn handle(&self, event: FsEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.shared.handle(event).await;
    }

    /// Number of subscribed directories.
    pub fn watched_dirs(&self) -> usize {
        self.shared.watched.lock().len()
    }

    /// Number of armed debounce timers.
    pub fn pending(&self) -> usize {
        self.shared.debouncer.pending_count()
    }

    /// Drop the OS subscription, stop dispatching and cancel pending
    /// timers. A change already being applied, including a removal,
    /// runs to completion. Safe to call more than once.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.watcher.lock().take();
        self.shared.watched.lock().clear();
        // Detached: the loop exits after its current change.
        drop(self.dispatch.lock().take());
        self.shared.debouncer.shutdown();
        info!("Stopped watching");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn dispatch(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>) {
    while let Some(result) = rx.recv().await {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        match result {
            Ok(event) => {
                for change in convert_event(&event) {
                    if shared.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    shared.handle(change).await;
                }
            }
            Err(e) => warn!(error = %e, "Watcher error"),
        }
    }
    debug!("Dispatch loop finished");
}

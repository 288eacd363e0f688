//! Directory walker that prunes ignored paths before descending.

use crate::classifier::Classifier;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A visited path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Single-threaded walk of one root.
///
/// Ignore decisions come from the classifier alone, so a scan and the
/// watcher agree on what is visible. VCS ignore files are not consulted.
pub struct Walker {
    root: PathBuf,
    classifier: Arc<Classifier>,
    follow_symlinks: bool,
}

impl Walker {
    pub fn new(root: &Path, classifier: Arc<Classifier>) -> Self {
        Self {
            root: root.to_path_buf(),
            classifier,
            follow_symlinks: false,
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Lazily yield every non-ignored file and directory below the root,
    /// in file name order. The root itself is not yielded.
    pub fn entries(&self) -> impl Iterator<Item = WalkEntry> {
        let classifier = self.classifier.clone();
        WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| entry.depth() == 0 || !classifier.is_ignored(entry.path()))
            .build()
            .filter_map(|result| match result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    // Unreadable entries don't fail the walk
                    debug!(error = %e, "Walk error");
                    None
                }
            })
            .filter(|entry| entry.depth() > 0)
            .filter_map(|entry| {
                let file_type = entry.file_type()?;
                if !file_type.is_dir() && !file_type.is_file() {
                    return None;
                }
                Some(WalkEntry {
                    is_dir: file_type.is_dir(),
                    path: entry.into_path(),
                })
            })
    }

    /// Files only.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> {
        self.entries().filter(|e| !e.is_dir).map(|e| e.path)
    }

    /// Directories only, the root first.
    pub fn dirs(&self) -> impl Iterator<Item = PathBuf> {
        std::iter::once(self.root.clone())
            .chain(self.entries().filter(|e| e.is_dir).map(|e| e.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;
    use vaultgraph_core::{IndexerConfig, SourceConfig};

    fn walker(root: &Path) -> Walker {
        let mut config = IndexerConfig::default();
        config.sources = vec![SourceConfig::new("vault", root)];
        Walker::new(root, Arc::new(Classifier::new(&config).unwrap()))
    }

    #[test]
    fn test_walker_empty_directory() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(walker(&root).entries().count(), 0);
    }

    #[test]
    fn test_walker_handles_nested_directories() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        fs::create_dir_all(root.join("a/b/c")).unwrap();
        File::create(root.join("a/file1.md")).unwrap();
        File::create(root.join("a/b/file2.md")).unwrap();
        File::create(root.join("a/b/c/file3.md")).unwrap();

        let w = walker(&root);
        assert_eq!(w.files().count(), 3);
        assert_eq!(w.dirs().count(), 4);
    }

    #[test]
    fn test_walker_prunes_ignored_and_hidden() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        File::create(root.join("node_modules/pkg/index.js")).unwrap();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        File::create(root.join(".obsidian/workspace.md")).unwrap();
        File::create(root.join(".hidden.md")).unwrap();
        File::create(root.join("kept.md")).unwrap();

        let names: Vec<_> = walker(&root)
            .entries()
            .map(|e| e.path.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("kept.md")]);
    }

    #[test]
    fn test_walker_results_are_sorted() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();

        File::create(root.join("c.md")).unwrap();
        File::create(root.join("a.md")).unwrap();
        File::create(root.join("b.md")).unwrap();

        let names: Vec<_> = walker(&root)
            .files()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
    }
}

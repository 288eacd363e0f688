//! Path classification.
//!
//! Decides from a path and the configured source rules whether a path
//! should be skipped, and if not, which content type it carries.

use crate::IndexerError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use vaultgraph_core::{ConfigError, IndexerConfig};

/// Kind of content a file holds. Each variant has its own parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Markdown-like note
    Prose,
    /// Source code
    Code,
    /// Binary attachment (image, pdf, ...)
    Asset,
}

impl ContentType {
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::Prose => "prose",
            ContentType::Code => "code",
            ContentType::Asset => "asset",
        }
    }
}

struct SourceRule {
    root: PathBuf,
    enabled: bool,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

/// Compiled classification rules. Cheap to share behind an `Arc`.
pub struct Classifier {
    sources: Vec<SourceRule>,
    ignore: GlobSet,
    extensions: HashMap<String, ContentType>,
    project_roots: Vec<String>,
}

impl Classifier {
    /// Compile the rules from configuration.
    pub fn new(config: &IndexerConfig) -> Result<Self, IndexerError> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let include = if source.include.is_empty() {
                None
            } else {
                Some(build_globset(&source.include)?)
            };
            sources.push(SourceRule {
                root: source.path.clone(),
                enabled: source.enabled,
                include,
                exclude: build_globset(&source.exclude)?,
            });
        }

        let mut extensions = HashMap::new();
        let rules = &config.content_types;
        for (exts, kind) in [
            (&rules.asset, ContentType::Asset),
            (&rules.code, ContentType::Code),
            (&rules.prose, ContentType::Prose),
        ] {
            for ext in exts {
                extensions.insert(ext.trim_start_matches('.').to_lowercase(), kind);
            }
        }

        Ok(Self {
            sources,
            ignore: build_globset(&config.ignore)?,
            extensions,
            project_roots: config.project_roots.clone(),
        })
    }

    /// Classify a file path. `None` means "do not process".
    pub fn classify(&self, path: &Path) -> Option<ContentType> {
        if self.is_ignored(path) {
            return None;
        }

        if let Some((rule, rel)) = self.source_for(path) {
            if let Some(include) = &rule.include {
                if !include.is_match(rel) {
                    return None;
                }
            }
        }

        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extensions.get(&ext).copied()
    }

    /// Whether a path (file or directory) is excluded outright.
    ///
    /// Ignored directories are never descended into.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let (rule, rel) = match self.source_for(path) {
            Some((rule, rel)) => (Some(rule), rel),
            None => (None, path.file_name().map(Path::new).unwrap_or(path)),
        };

        if rule.is_some_and(|r| !r.enabled) {
            return true;
        }

        if is_hidden(rel) {
            return true;
        }

        // Check the path and every ancestor up to the source root so that a
        // file below an ignored directory is ignored too.
        let mut current = Some(path);
        while let Some(p) = current {
            if rule.is_some_and(|r| p == r.root.as_path()) {
                break;
            }
            if self.ignore.is_match(p) {
                return true;
            }
            if let Some(r) = rule {
                if let Ok(rel) = p.strip_prefix(&r.root) {
                    if r.exclude.is_match(rel) {
                        return true;
                    }
                }
            }
            current = p.parent();
            if rule.is_none() {
                break;
            }
        }

        false
    }

    /// Project a file belongs to: the directory directly below a project root.
    pub fn project_for(&self, path: &Path) -> Option<String> {
        let components: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        // The project name must be a directory, not the file itself.
        components
            .windows(3)
            .find(|w| self.project_roots.iter().any(|r| r == w[0]))
            .map(|w| w[1].to_string())
    }

    fn source_for<'a>(&self, path: &'a Path) -> Option<(&SourceRule, &'a Path)> {
        self.sources
            .iter()
            .filter_map(|rule| path.strip_prefix(&rule.root).ok().map(|rel| (rule, rel)))
            // Prefer the most specific root when sources nest.
            .max_by_key(|(rule, _)| rule.root.components().count())
    }
}

fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(s) => s.to_str().is_some_and(|s| s.starts_with('.')),
        _ => false,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, IndexerError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| ConfigError::Invalid(format!("glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Invalid(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultgraph_core::SourceConfig;

    fn classifier() -> Classifier {
        let mut config = IndexerConfig::default();
        let mut vault = SourceConfig::new("vault", "/vault");
        vault.exclude = vec!["archive/**".to_string()];
        let mut code = SourceConfig::new("code", "/code");
        code.include = vec!["src/**".to_string()];
        let mut off = SourceConfig::new("off", "/off");
        off.enabled = false;
        config.sources = vec![vault, code, off];
        Classifier::new(&config).unwrap()
    }

    #[test]
    fn test_classify_by_extension() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/vault/notes/a.md")),
            Some(ContentType::Prose)
        );
        assert_eq!(
            c.classify(Path::new("/vault/img/pic.PNG")),
            Some(ContentType::Asset)
        );
        assert_eq!(
            c.classify(Path::new("/code/src/main.go")),
            Some(ContentType::Code)
        );
        assert_eq!(c.classify(Path::new("/vault/data.xyz")), None);
        assert_eq!(c.classify(Path::new("/vault/README")), None);
    }

    #[test]
    fn test_hidden_paths_rejected() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("/vault/.obsidian/app.md")), None);
        assert_eq!(c.classify(Path::new("/vault/.draft.md")), None);
        assert!(c.is_ignored(Path::new("/vault/.git")));
    }

    #[test]
    fn test_global_ignore_covers_descendants() {
        let c = classifier();
        assert!(c.is_ignored(Path::new("/code/src/node_modules")));
        assert_eq!(c.classify(Path::new("/code/src/node_modules/x/index.js")), None);
    }

    #[test]
    fn test_source_include_exclude() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("/vault/archive/old.md")), None);
        assert_eq!(c.classify(Path::new("/code/scripts/build.sh")), None);
        assert_eq!(
            c.classify(Path::new("/code/src/lib/util.rs")),
            Some(ContentType::Code)
        );
    }

    #[test]
    fn test_disabled_source_ignored() {
        let c = classifier();
        assert!(c.is_ignored(Path::new("/off/note.md")));
        assert_eq!(c.classify(Path::new("/off/note.md")), None);
    }

    #[test]
    fn test_project_for() {
        let c = classifier();
        assert_eq!(
            c.project_for(Path::new("/vault/projects/apollo/plan.md")),
            Some("apollo".to_string())
        );
        assert_eq!(
            c.project_for(Path::new("/vault/projects/apollo/deep/x.md")),
            Some("apollo".to_string())
        );
        assert_eq!(c.project_for(Path::new("/vault/projects/loose.md")), None);
        assert_eq!(c.project_for(Path::new("/vault/inbox/a.md")), None);
    }
}

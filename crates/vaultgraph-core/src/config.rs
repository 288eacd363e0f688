//! Configuration for the VaultGraph indexer.

use crate::ConfigError;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Source roots to index
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Global ignore globs, applied to every source
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Extension rules mapping files to content types
    #[serde(default)]
    pub content_types: ContentRules,

    /// Quiet period before a changed file is re-indexed, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Graph store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Directory names whose immediate children name a project
    #[serde(default = "default_project_roots")]
    pub project_roots: Vec<String>,

    /// When set, the initial scan buffers statements and writes them here
    #[serde(default)]
    pub dump_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// A single source root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name
    pub name: String,

    /// Root directory
    pub path: PathBuf,

    /// Disabled sources are neither scanned nor watched
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// If non-empty, only paths matching one of these globs are processed
    #[serde(default)]
    pub include: Vec<String>,

    /// Paths matching any of these globs are skipped
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// File extensions (without the dot) per content type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRules {
    #[serde(default = "default_prose_exts")]
    pub prose: Vec<String>,

    #[serde(default = "default_code_exts")]
    pub code: Vec<String>,

    #[serde(default = "default_asset_exts")]
    pub asset: Vec<String>,
}

/// Graph store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bolt address, e.g. `127.0.0.1:7687`
    #[serde(default = "default_store_uri")]
    pub uri: String,

    #[serde(default = "default_store_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Size of the connection pool shared by concurrent writers
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_true() -> bool {
    true
}

fn default_ignore() -> Vec<String> {
    vec![
        "**/node_modules".to_string(),
        "**/target".to_string(),
        "**/vendor".to_string(),
        "**/__pycache__".to_string(),
    ]
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_project_roots() -> Vec<String> {
    vec!["projects".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prose_exts() -> Vec<String> {
    to_strings(&["md", "markdown"])
}

fn default_code_exts() -> Vec<String> {
    to_strings(&[
        "rs", "go", "py", "ts", "tsx", "js", "jsx", "mjs", "java", "c", "h", "cc", "cpp", "hpp",
        "rb", "sh", "lua",
    ])
}

fn default_asset_exts() -> Vec<String> {
    to_strings(&[
        "png", "jpg", "jpeg", "gif", "svg", "webp", "pdf", "mp3", "mp4", "zip",
    ])
}

fn default_store_uri() -> String {
    "127.0.0.1:7687".to_string()
}

fn default_store_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ContentRules {
    fn default() -> Self {
        Self {
            prose: default_prose_exts(),
            code: default_code_exts(),
            asset: default_asset_exts(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            user: default_store_user(),
            password: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            ignore: default_ignore(),
            content_types: ContentRules::default(),
            debounce_ms: default_debounce_ms(),
            store: StoreConfig::default(),
            project_roots: default_project_roots(),
            dump_path: None,
            log_level: default_log_level(),
        }
    }
}

impl SourceConfig {
    /// Create an enabled source with no include/exclude rules
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl IndexerConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vaultgraph")
            .join("config.yaml")
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let config_path = Self::default_path();

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check globs compile and every content type has at least one extension
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source_globs = self
            .sources
            .iter()
            .flat_map(|s| s.include.iter().chain(s.exclude.iter()));

        for pattern in self.ignore.iter().chain(source_globs) {
            Glob::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("glob '{}': {}", pattern, e)))?;
        }

        let rules = &self.content_types;
        if rules.prose.is_empty() && rules.code.is_empty() && rules.asset.is_empty() {
            return Err(ConfigError::Invalid(
                "content_types defines no extensions".to_string(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Sources that are switched on
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Debounce interval as a `Duration`
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = IndexerConfig::default();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.store.uri, "127.0.0.1:7687");
        assert_eq!(config.project_roots, vec!["projects".to_string()]);
        assert!(config.content_types.prose.contains(&"md".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = IndexerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: IndexerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.debounce_ms, parsed.debounce_ms);
        assert_eq!(config.ignore, parsed.ignore);
    }

    #[test]
    fn test_load_from_yaml_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
sources:
  - name: vault
    path: /tmp/vault
    exclude: ["**/archive/**"]
  - name: code
    path: /tmp/code
    enabled: false
debounce_ms: 250
"#,
        )
        .unwrap();

        let config = IndexerConfig::load_from(&path).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].enabled);
        assert_eq!(config.enabled_sources().count(), 1);
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.store.max_connections, 16);
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut config = IndexerConfig::default();
        config.ignore.push("a[".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_rules() {
        let mut config = IndexerConfig::default();
        config.content_types = ContentRules {
            prose: vec![],
            code: vec![],
            asset: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = IndexerConfig::load_from(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

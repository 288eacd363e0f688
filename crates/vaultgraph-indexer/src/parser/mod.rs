//! Metadata extraction.
//!
//! Turns a classified file into structured metadata:
//! - Prose: front matter, tags, wikilinks, embeds and title
//! - Code: language, function and type declarations, imports, TODO markers
//! - Asset: name and size only
//!
//! Extraction is pattern based. It never aborts a batch: a file that
//! cannot be read or decoded yields an `IndexerError` for the caller to
//! log and skip.

mod code;
mod language;
mod prose;

pub use code::{parse_code, Marker, MarkerKind, Symbol, SymbolKind};
pub use language::{detect_language, detect_language_from_content, Language};
pub use prose::parse_prose;

use crate::classifier::ContentType;
use crate::IndexerError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Metadata for one file, tagged by content type.
#[derive(Debug, Clone)]
pub enum Metadata {
    Note(NoteMeta),
    Code(CodeMeta),
    Asset(AssetMeta),
}

/// A parsed prose note.
#[derive(Debug, Clone, Default)]
pub struct NoteMeta {
    /// Absolute path (identity)
    pub path: PathBuf,
    /// File stem, used to resolve wikilinks by name
    pub name: String,
    /// Front matter `title`, else the file stem
    pub title: String,
    /// Tags in first-seen order, deduplicated, case preserved
    pub tags: Vec<String>,
    /// Wikilink targets by display name, aliases dropped
    pub links: Vec<String>,
    /// `![[...]]` targets
    pub embeds: Vec<String>,
    /// SHA-256 of the content
    pub hash: String,
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct CodeMeta {
    pub path: PathBuf,
    pub name: String,
    pub language: Language,
    /// Function and method declarations
    pub functions: Vec<Symbol>,
    /// Class, struct, interface and type declarations
    pub classes: Vec<Symbol>,
    /// Import/include targets as written
    pub imports: Vec<String>,
    /// TODO/FIXME/NOTE/HACK comments
    pub markers: Vec<Marker>,
    pub line_count: usize,
    pub hash: String,
}

/// A binary attachment.
#[derive(Debug, Clone)]
pub struct AssetMeta {
    pub path: PathBuf,
    /// File name including extension, the target of `![[...]]` embeds
    pub name: String,
    pub size: u64,
}

/// Reads files and dispatches to the parser for their content type.
#[derive(Debug, Default, Clone, Copy)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse a file.
    pub async fn parse(
        &self,
        path: &Path,
        content_type: ContentType,
    ) -> Result<Metadata, IndexerError> {
        if content_type == ContentType::Asset {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|e| read_error(path, e))?;
            return Ok(Metadata::Asset(AssetMeta {
                path: path.to_path_buf(),
                name: file_name(path),
                size: metadata.len(),
            }));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| read_error(path, e))?;

        self.parse_content(path, content_type, &content)
    }

    /// Parse already-loaded content.
    pub fn parse_content(
        &self,
        path: &Path,
        content_type: ContentType,
        content: &str,
    ) -> Result<Metadata, IndexerError> {
        let metadata = match content_type {
            ContentType::Prose => Metadata::Note(parse_prose(path, content)?),
            ContentType::Code => Metadata::Code(parse_code(path, content)),
            ContentType::Asset => Metadata::Asset(AssetMeta {
                path: path.to_path_buf(),
                name: file_name(path),
                size: content.len() as u64,
            }),
        };

        debug!(path = ?path, kind = content_type.name(), "Parsed file");

        Ok(metadata)
    }
}

fn read_error(path: &Path, e: std::io::Error) -> IndexerError {
    match e.kind() {
        std::io::ErrorKind::NotFound => IndexerError::NotFound(path.to_path_buf()),
        std::io::ErrorKind::InvalidData => IndexerError::Parse {
            path: path.to_path_buf(),
            message: "file is not valid UTF-8".to_string(),
        },
        _ => IndexerError::Io(e),
    }
}

/// File stem, used as a note's link name.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Compute SHA256 hash of content.
pub(crate) fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

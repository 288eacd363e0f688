//! VaultGraph Indexer
//!
//! This crate provides the indexing engine for VaultGraph, including:
//! - Path classification by source rules and file extension
//! - Pattern-based metadata extraction for notes and source code
//! - Idempotent graph synchronization, direct or through a dump buffer
//! - Parallel full scans with a bounded worker pool
//! - File watching with per-path debounced updates
//! - Structural queries (orphans, backlinks, tags, symbols)

pub mod classifier;
mod error;
pub mod graph;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod scanner;
pub mod watcher;

pub use classifier::{Classifier, ContentType};
pub use error::IndexerError;
pub use graph::{GraphStore, MemoryGraph, Neo4jStore, SyncClient};
pub use parser::{Metadata, Parser};
pub use pipeline::Pipeline;
pub use query::VaultQuery;
pub use scanner::{ScanOptions, ScanReport, Scanner};
pub use watcher::{Debouncer, FileWatcher, FsEvent, FsEventKind};

//! Classify, parse and sync one path.
//!
//! Shared by the scanner and the watcher so both entry points end in the
//! same parser and sync calls.

use crate::classifier::{Classifier, ContentType};
use crate::graph::SyncClient;
use crate::parser::Parser;
use crate::IndexerError;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct Pipeline {
    classifier: Arc<Classifier>,
    parser: Parser,
    sync: Arc<SyncClient>,
}

impl Pipeline {
    pub fn new(classifier: Arc<Classifier>, sync: Arc<SyncClient>) -> Self {
        Self {
            classifier,
            parser: Parser::new(),
            sync,
        }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn sync(&self) -> &Arc<SyncClient> {
        &self.sync
    }

    /// Parse and upsert a file already classified as `content_type`.
    pub async fn process(&self, path: &Path, content_type: ContentType) -> Result<(), IndexerError> {
        let meta = self.parser.parse(path, content_type).await?;
        let project = self.classifier.project_for(path);
        self.sync.upsert(&meta, project.as_deref()).await
    }

    /// Classify then process. Returns `None` if the path is not indexed.
    pub async fn process_path(&self, path: &Path) -> Result<Option<ContentType>, IndexerError> {
        match self.classifier.classify(path) {
            Some(content_type) => {
                self.process(path, content_type).await?;
                Ok(Some(content_type))
            }
            None => {
                debug!(path = ?path, "Skipping unclassified path");
                Ok(None)
            }
        }
    }

    /// Remove a file that no longer exists. Classification uses the path only.
    pub async fn remove_path(&self, path: &Path) -> Result<(), IndexerError> {
        match self.classifier.classify(path) {
            Some(ContentType::Prose) => self.sync.delete_note(path).await,
            Some(ContentType::Code) => self.sync.delete_code(path).await,
            Some(ContentType::Asset) => self.sync.delete_path(path).await,
            None => Ok(()),
        }
    }

    /// Remove every indexed file under a directory that no longer exists.
    pub async fn remove_subtree(&self, dir: &Path) -> Result<(), IndexerError> {
        if self.classifier.is_ignored(dir) {
            return Ok(());
        }
        self.sync.delete_subtree(dir).await
    }
}

//! Read-only queries over the indexed graph.

use crate::graph::{GraphQuery, GraphStats, GraphStore, QueryOutput, SymbolHit};
use crate::parser::SymbolKind;
use crate::IndexerError;
use std::sync::Arc;

/// Structural queries. Empty results are returned as empty lists.
#[derive(Clone)]
pub struct VaultQuery {
    store: Arc<dyn GraphStore>,
}

impl VaultQuery {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    async fn names(&self, query: GraphQuery) -> Result<Vec<String>, IndexerError> {
        match self.store.query(&query).await? {
            QueryOutput::Names(names) => Ok(names),
            other => Err(unexpected(&query, &other)),
        }
    }

    /// Notes no other note links to.
    pub async fn orphans(&self) -> Result<Vec<String>, IndexerError> {
        self.names(GraphQuery::Orphans).await
    }

    /// Names of notes linking to the note called `name`.
    pub async fn backlinks(&self, name: &str) -> Result<Vec<String>, IndexerError> {
        self.names(GraphQuery::Backlinks {
            name: name.to_string(),
        })
        .await
    }

    /// Names of notes carrying `tag`.
    pub async fn tagged(&self, tag: &str) -> Result<Vec<String>, IndexerError> {
        self.names(GraphQuery::TaggedWith {
            tag: tag.trim_start_matches('#').to_string(),
        })
        .await
    }

    pub async fn untagged(&self) -> Result<Vec<String>, IndexerError> {
        self.names(GraphQuery::Untagged).await
    }

    /// Link targets with no backing file.
    pub async fn broken_links(&self) -> Result<Vec<String>, IndexerError> {
        self.names(GraphQuery::BrokenLinks).await
    }

    /// Declarations named `name` of any kind.
    pub async fn symbols(&self, name: &str) -> Result<Vec<SymbolHit>, IndexerError> {
        self.symbols_of(name, None).await
    }

    pub async fn functions(&self, name: &str) -> Result<Vec<SymbolHit>, IndexerError> {
        self.symbols_of(name, Some(SymbolKind::Function)).await
    }

    pub async fn classes(&self, name: &str) -> Result<Vec<SymbolHit>, IndexerError> {
        self.symbols_of(name, Some(SymbolKind::Class)).await
    }

    async fn symbols_of(
        &self,
        name: &str,
        kind: Option<SymbolKind>,
    ) -> Result<Vec<SymbolHit>, IndexerError> {
        let query = GraphQuery::Symbols {
            name: name.to_string(),
            kind,
        };
        match self.store.query(&query).await? {
            QueryOutput::Symbols(hits) => Ok(hits),
            other => Err(unexpected(&query, &other)),
        }
    }

    pub async fn stats(&self) -> Result<GraphStats, IndexerError> {
        match self.store.query(&GraphQuery::Stats).await? {
            QueryOutput::Stats(stats) => Ok(stats),
            other => Err(unexpected(&GraphQuery::Stats, &other)),
        }
    }
}

fn unexpected(query: &GraphQuery, output: &QueryOutput) -> IndexerError {
    IndexerError::Store(format!(
        "unexpected result shape for {:?}: {:?}",
        query, output
    ))
}

//! GraphStore trait definition.

use super::{GraphQuery, QueryOutput, Statement};
use crate::IndexerError;
use async_trait::async_trait;

/// A property-graph store the indexer writes to and reads from.
///
/// Implementations must accept concurrent callers. Batches for different
/// files may interleave; one batch is applied as a unit.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Apply a batch of statements in order.
    async fn apply(&self, batch: &[Statement]) -> Result<(), IndexerError>;

    /// Run a read-only query. Empty results are not errors.
    async fn query(&self, query: &GraphQuery) -> Result<QueryOutput, IndexerError>;
}

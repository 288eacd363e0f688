//! Graph layer: statement IR, store backends and the sync client.

mod memory;
mod neo4j;
mod statement;
mod store;
mod sync;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jStore;
pub use statement::{
    quote, GraphQuery, GraphStats, NodeLabel, NodeRef, Props, QueryOutput, Rel, Statement,
    SymbolHit, Value,
};
pub use store::GraphStore;
pub use sync::{asset_statements, code_statements, note_statements, SyncClient};

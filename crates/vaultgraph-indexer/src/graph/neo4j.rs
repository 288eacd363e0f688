//! Bolt-backed `GraphStore`.

use super::store::GraphStore;
use super::{GraphQuery, GraphStats, QueryOutput, Statement, SymbolHit};
use crate::parser::SymbolKind;
use crate::IndexerError;
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use std::path::Path;
use tracing::{debug, info, warn};
use vaultgraph_core::StoreConfig;

// Placeholder notes and assets are merged by name without a constraint,
// since distinct files may share a name; see `Statement::FoldPlaceholders`.
const CONSTRAINTS: [&str; 6] = [
    "CREATE CONSTRAINT note_path IF NOT EXISTS FOR (n:Note) REQUIRE n.path IS UNIQUE",
    "CREATE CONSTRAINT code_path IF NOT EXISTS FOR (c:Code) REQUIRE c.path IS UNIQUE",
    "CREATE CONSTRAINT asset_path IF NOT EXISTS FOR (a:Asset) REQUIRE a.path IS UNIQUE",
    "CREATE CONSTRAINT tag_name IF NOT EXISTS FOR (t:Tag) REQUIRE t.name IS UNIQUE",
    "CREATE CONSTRAINT module_name IF NOT EXISTS FOR (m:Module) REQUIRE m.name IS UNIQUE",
    "CREATE CONSTRAINT project_name IF NOT EXISTS FOR (p:Project) REQUIRE p.name IS UNIQUE",
];

const INDEXES: [&str; 3] = [
    "CREATE INDEX note_name IF NOT EXISTS FOR (n:Note) ON (n.name)",
    "CREATE INDEX function_name IF NOT EXISTS FOR (f:Function) ON (f.name)",
    "CREATE INDEX class_name IF NOT EXISTS FOR (c:Class) ON (c.name)",
];

/// Graph database reached over Bolt. The driver pools connections, so one
/// store is shared by every worker.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect and make sure the key constraints exist.
    pub async fn connect(config: &StoreConfig) -> Result<Self, IndexerError> {
        let bolt = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .max_connections(config.max_connections)
            .build()?;
        let graph = Graph::connect(bolt).await?;

        let store = Self { graph };
        store.init_schema().await;
        info!(uri = %config.uri, "Connected to graph store");
        Ok(store)
    }

    async fn init_schema(&self) {
        for stmt in CONSTRAINTS.iter().chain(INDEXES.iter()) {
            if let Err(e) = self.graph.run(query(stmt)).await {
                warn!(error = %e, "Schema statement failed, it may already exist");
            }
        }
    }

    async fn rows(&self, cypher: &str) -> Result<Vec<Row>, IndexerError> {
        let mut result = self.graph.execute(query(cypher)).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn names(&self, cypher: &str) -> Result<Vec<String>, IndexerError> {
        self.rows(cypher)
            .await?
            .iter()
            .map(|row| row.get::<String>("name").map_err(IndexerError::from))
            .collect()
    }

    async fn count(&self, cypher: &str) -> Result<u64, IndexerError> {
        let rows = self.rows(cypher).await?;
        match rows.first() {
            Some(row) => Ok(row.get::<i64>("count")?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Replay a dump artifact.
    ///
    /// Each non-empty, non-comment line is one statement; blank lines
    /// separate batches, and every batch runs in its own transaction.
    pub async fn load_dump(&self, path: &Path) -> Result<usize, IndexerError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IndexerError::Dump(format!("{}: {}", path.display(), e)))?;

        let batches = split_dump(&text);
        for batch in &batches {
            self.run_batch(batch).await?;
        }
        info!(path = %path.display(), batches = batches.len(), "Loaded dump");
        Ok(batches.len())
    }

    async fn run_batch(&self, cypher: &[String]) -> Result<(), IndexerError> {
        if cypher.is_empty() {
            return Ok(());
        }
        let queries: Vec<Query> = cypher.iter().map(|c| query(c)).collect();
        let mut txn = self.graph.start_txn().await?;
        txn.run_queries(queries).await?;
        txn.commit().await?;
        Ok(())
    }
}

/// Split dump text into batches of statements.
pub(crate) fn split_dump(text: &str) -> Vec<Vec<String>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with("//") {
            continue;
        }
        current.push(line.strip_suffix(';').unwrap_or(line).to_string());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn parse_kind(label: &str) -> Option<SymbolKind> {
    match label {
        "Function" => Some(SymbolKind::Function),
        "Class" => Some(SymbolKind::Class),
        _ => None,
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn apply(&self, batch: &[Statement]) -> Result<(), IndexerError> {
        let cypher: Vec<String> = batch.iter().map(Statement::to_cypher).collect();
        debug!(statements = cypher.len(), "Applying batch");
        self.run_batch(&cypher).await
    }

    async fn query(&self, q: &GraphQuery) -> Result<QueryOutput, IndexerError> {
        let cypher = q.to_cypher();
        match q {
            GraphQuery::Stats => {
                let mut counts = [0u64; 6];
                for (slot, stmt) in counts.iter_mut().zip(&cypher) {
                    *slot = self.count(stmt).await?;
                }
                let [notes, links, tags, code, functions, classes] = counts;
                Ok(QueryOutput::Stats(GraphStats {
                    notes,
                    links,
                    tags,
                    code,
                    functions,
                    classes,
                }))
            }
            GraphQuery::Symbols { .. } => {
                let mut hits = Vec::new();
                for stmt in &cypher {
                    for row in self.rows(stmt).await? {
                        let label: String = row.get("kind")?;
                        let Some(kind) = parse_kind(&label) else {
                            continue;
                        };
                        hits.push(SymbolHit {
                            name: row.get("name")?,
                            kind,
                            file: row.get("file")?,
                            line: row.get::<i64>("line").unwrap_or(0),
                        });
                    }
                }
                Ok(QueryOutput::Symbols(hits))
            }
            _ => {
                let mut names = Vec::new();
                for stmt in &cypher {
                    names.extend(self.names(stmt).await?);
                }
                Ok(QueryOutput::Names(names))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dump_batches() {
        let text = "// vaultgraph dump 2024-01-01T00:00:00Z\n\
                    MERGE (n:Note {path: '/a.md'});\n\
                    MERGE (t:Tag {name: 'x'});\n\
                    \n\
                    \n\
                    MATCH (n:Code {path: '/b.go'}) DETACH DELETE n;\n";
        let batches = split_dump(text);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0], "MERGE (n:Note {path: '/a.md'})");
        assert_eq!(batches[1], vec!["MATCH (n:Code {path: '/b.go'}) DETACH DELETE n"]);
    }

    #[test]
    fn test_split_dump_empty() {
        assert!(split_dump("// header only\n\n").is_empty());
    }

    #[test]
    fn test_schema_constrains_shared_names() {
        for label in ["Tag", "Module", "Project"] {
            let pattern = format!(":{}) REQUIRE", label);
            assert!(
                CONSTRAINTS
                    .iter()
                    .any(|c| c.contains(&pattern) && c.ends_with(".name IS UNIQUE")),
                "no name constraint for {}",
                label
            );
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("Function"), Some(SymbolKind::Function));
        assert_eq!(parse_kind("Class"), Some(SymbolKind::Class));
        assert_eq!(parse_kind("Marker"), None);
    }
}

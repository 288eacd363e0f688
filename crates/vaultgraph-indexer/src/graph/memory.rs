//! In-process property graph.
//!
//! Applies the same `Statement` IR the Bolt store renders to Cypher, with
//! the same merge/detach semantics. Used for tests and dry runs.

use super::store::GraphStore;
use super::{
    GraphQuery, GraphStats, NodeLabel, NodeRef, Props, QueryOutput, Rel, Statement, SymbolHit,
    Value,
};
use crate::parser::SymbolKind;
use crate::IndexerError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

type NodeId = u64;

#[derive(Debug, Clone)]
struct MemNode {
    label: NodeLabel,
    props: BTreeMap<&'static str, Value>,
}

impl MemNode {
    fn str_prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<NodeId, MemNode>,
    edges: BTreeSet<(NodeId, Rel, NodeId)>,
    next_id: NodeId,
}

/// In-memory `GraphStore`.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: RwLock<Inner>,
    batches: AtomicUsize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `apply` calls served so far.
    pub fn applied_batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of nodes with this label.
    pub fn count(&self, label: NodeLabel) -> usize {
        let inner = self.inner.read();
        inner.nodes.values().filter(|n| n.label == label).count()
    }

    /// Number of relationships in the graph.
    pub fn edge_count(&self) -> usize {
        self.inner.read().edges.len()
    }

    /// Whether a node with this key exists.
    pub fn contains(&self, node: &NodeRef) -> bool {
        !self.inner.read().find(node).is_empty()
    }

    /// Key values of nodes reached from `node` through `rel`, sorted.
    pub fn targets(&self, node: &NodeRef, rel: Rel) -> Vec<String> {
        let inner = self.inner.read();
        let mut out: Vec<String> = inner
            .find(node)
            .into_iter()
            .flat_map(|id| inner.outgoing(id, rel))
            .filter_map(|target| inner.display_key(target))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Number of relationships starting or ending at `node`.
    pub fn degree(&self, node: &NodeRef) -> usize {
        let inner = self.inner.read();
        let ids = inner.find(node);
        inner
            .edges
            .iter()
            .filter(|(a, _, b)| ids.contains(a) || ids.contains(b))
            .count()
    }

    /// Snapshot of all relationships as `(from_key, rel, to_key)`.
    pub fn relationships(&self) -> BTreeSet<(String, Rel, String)> {
        let inner = self.inner.read();
        inner
            .edges
            .iter()
            .filter_map(|(a, rel, b)| {
                Some((inner.display_key(*a)?, *rel, inner.display_key(*b)?))
            })
            .collect()
    }
}

impl Inner {
    fn find(&self, node: &NodeRef) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| {
                n.label == node.label && n.str_prop(node.key) == Some(node.value.as_str())
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn merge(&mut self, node: &NodeRef) -> Vec<NodeId> {
        let found = self.find(node);
        if !found.is_empty() {
            return found;
        }
        let id = self.next_id;
        self.next_id += 1;
        let mut props = BTreeMap::new();
        props.insert(node.key, Value::Str(node.value.clone()));
        self.nodes.insert(
            id,
            MemNode {
                label: node.label,
                props,
            },
        );
        vec![id]
    }

    fn set_props(&mut self, ids: &[NodeId], props: &Props) {
        for id in ids {
            if let Some(node) = self.nodes.get_mut(id) {
                for (key, value) in props {
                    node.props.insert(key, value.clone());
                }
            }
        }
    }

    fn outgoing(&self, id: NodeId, rel: Rel) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(a, r, _)| *a == id && *r == rel)
            .map(|(_, _, b)| *b)
            .collect()
    }

    fn has_incoming(&self, id: NodeId, rel: Rel) -> bool {
        self.edges.iter().any(|(_, r, b)| *b == id && *r == rel)
    }

    /// Shared by-name node with nothing pointing at it.
    fn is_unreferenced_leaf(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let leaf = match node.label {
            NodeLabel::Tag | NodeLabel::Module => true,
            NodeLabel::Note | NodeLabel::Asset => !node.props.contains_key("path"),
            _ => false,
        };
        leaf && !self.edges.iter().any(|(_, _, b)| *b == id)
    }

    /// Remove edges matching `owned`, then any leaf they orphaned.
    fn drop_outgoing(&mut self, owned: impl Fn(NodeId, Rel) -> bool) {
        let mut targets = BTreeSet::new();
        self.edges.retain(|(a, r, b)| {
            let drop = owned(*a, *r);
            if drop {
                targets.insert(*b);
            }
            !drop
        });
        for id in targets {
            if self.is_unreferenced_leaf(id) {
                self.detach_delete(id);
            }
        }
    }

    fn is_file_under(&self, id: NodeId, prefix: &str) -> bool {
        self.nodes.get(&id).is_some_and(|n| {
            NodeLabel::FILES.contains(&n.label)
                && n.str_prop("path").is_some_and(|p| p.starts_with(prefix))
        })
    }

    fn detach_delete(&mut self, id: NodeId) {
        self.edges.retain(|(a, _, b)| *a != id && *b != id);
        self.nodes.remove(&id);
    }

    fn display_key(&self, id: NodeId) -> Option<String> {
        let node = self.nodes.get(&id)?;
        node.str_prop("path")
            .or_else(|| node.str_prop("name"))
            .or_else(|| node.str_prop("id"))
            .map(str::to_string)
    }

    fn name(&self, id: NodeId) -> Option<String> {
        self.nodes.get(&id)?.str_prop("name").map(str::to_string)
    }

    fn is_real_note(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|n| n.label == NodeLabel::Note && n.props.contains_key("path"))
    }

    fn apply(&mut self, stmt: &Statement) {
        match stmt {
            Statement::AdoptPlaceholder { label, name, path } => {
                let already = !self.find(&NodeRef::file(*label, path.clone())).is_empty();
                if already {
                    return;
                }
                let placeholder = self.nodes.iter_mut().find(|(_, n)| {
                    n.label == *label
                        && n.str_prop("name") == Some(name.as_str())
                        && !n.props.contains_key("path")
                });
                if let Some((_, node)) = placeholder {
                    node.props.insert("path", Value::Str(path.clone()));
                }
            }
            Statement::FoldPlaceholders { label, name } => {
                let placeholders: Vec<(NodeId, String)> = self
                    .nodes
                    .iter()
                    .filter(|(_, n)| n.label == *label && !n.props.contains_key("path"))
                    .filter_map(|(id, n)| Some((*id, n.str_prop("name")?.to_string())))
                    .filter(|(_, n)| name.as_ref().map_or(true, |want| want == n))
                    .collect();
                for (placeholder, pname) in placeholders {
                    let real: Vec<NodeId> = self
                        .find(&NodeRef::named(*label, pname))
                        .into_iter()
                        .filter(|id| *id != placeholder)
                        .collect();
                    if real.is_empty() {
                        continue;
                    }
                    let incoming: Vec<(NodeId, Rel)> = self
                        .edges
                        .iter()
                        .filter(|(_, r, b)| *b == placeholder && matches!(r, Rel::LinksTo | Rel::Embeds))
                        .map(|(a, r, _)| (*a, *r))
                        .collect();
                    for (source, rel) in incoming {
                        for target in &real {
                            self.edges.insert((source, rel, *target));
                        }
                    }
                    self.detach_delete(placeholder);
                }
            }
            Statement::MergeNode { node, props } => {
                let ids = self.merge(node);
                self.set_props(&ids, props);
            }
            Statement::DropOutgoing { node, rels } => {
                let ids = self.find(node);
                self.drop_outgoing(|a, r| ids.contains(&a) && rels.contains(&r));
            }
            Statement::DropOutgoingUnder { prefix, rels } => {
                let files: BTreeSet<NodeId> = self
                    .nodes
                    .keys()
                    .copied()
                    .filter(|id| self.is_file_under(*id, prefix))
                    .collect();
                self.drop_outgoing(|a, r| files.contains(&a) && rels.contains(&r));
            }
            Statement::DropChildren { node, rels } => {
                let ids = self.find(node);
                let children: Vec<NodeId> = self
                    .edges
                    .iter()
                    .filter(|(a, r, _)| ids.contains(a) && rels.contains(r))
                    .map(|(_, _, b)| *b)
                    .collect();
                for child in children {
                    self.detach_delete(child);
                }
            }
            Statement::MergeEdge {
                from,
                rel,
                to,
                props,
            } => {
                let sources = self.merge(from);
                let targets = self.merge(to);
                self.set_props(&targets, props);
                for a in &sources {
                    for b in &targets {
                        self.edges.insert((*a, *rel, *b));
                    }
                }
            }
            Statement::DetachDelete { node } => {
                for id in self.find(node) {
                    self.detach_delete(id);
                }
            }
            Statement::DeleteUnder { prefix } => {
                let files: Vec<NodeId> = self
                    .nodes
                    .keys()
                    .copied()
                    .filter(|id| self.is_file_under(*id, prefix))
                    .collect();
                for id in files {
                    let children: Vec<NodeId> = self
                        .edges
                        .iter()
                        .filter(|(a, r, _)| *a == id && matches!(r, Rel::Defines | Rel::Contains))
                        .map(|(_, _, b)| *b)
                        .collect();
                    for child in children {
                        self.detach_delete(child);
                    }
                    self.detach_delete(id);
                }
            }
            Statement::DropEmptyProjects => {
                let empty: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .filter(|(id, n)| {
                        n.label == NodeLabel::Project && !self.edges.iter().any(|(a, _, _)| a == *id)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for id in empty {
                    self.nodes.remove(&id);
                }
            }
        }
    }

    /// Names of distinct nodes, sorted. Nodes sharing a name each appear.
    fn sorted_names(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<String> {
        let ids: BTreeSet<NodeId> = ids.into_iter().collect();
        let mut names: Vec<String> = ids.into_iter().filter_map(|id| self.name(id)).collect();
        names.sort();
        names
    }

    fn run(&self, query: &GraphQuery) -> QueryOutput {
        match query {
            GraphQuery::Orphans => {
                let ids = self
                    .nodes
                    .keys()
                    .copied()
                    .filter(|id| self.is_real_note(*id) && !self.has_incoming(*id, Rel::LinksTo));
                QueryOutput::Names(self.sorted_names(ids))
            }
            GraphQuery::Backlinks { name } => {
                let targets = self.find(&NodeRef::named(NodeLabel::Note, name.clone()));
                let sources = self
                    .edges
                    .iter()
                    .filter(|(_, r, b)| *r == Rel::LinksTo && targets.contains(b))
                    .map(|(a, _, _)| *a);
                QueryOutput::Names(self.sorted_names(sources))
            }
            GraphQuery::TaggedWith { tag } => {
                let tags = self.find(&NodeRef::named(NodeLabel::Tag, tag.clone()));
                let notes = self
                    .edges
                    .iter()
                    .filter(|(_, r, b)| *r == Rel::Tagged && tags.contains(b))
                    .map(|(a, _, _)| *a);
                QueryOutput::Names(self.sorted_names(notes))
            }
            GraphQuery::Untagged => {
                let ids = self.nodes.keys().copied().filter(|id| {
                    self.is_real_note(*id) && self.outgoing(*id, Rel::Tagged).is_empty()
                });
                QueryOutput::Names(self.sorted_names(ids))
            }
            GraphQuery::BrokenLinks => {
                let ids = self.nodes.iter().filter_map(|(id, n)| {
                    let broken = n.label == NodeLabel::Note
                        && !n.props.contains_key("path")
                        && self.has_incoming(*id, Rel::LinksTo);
                    broken.then_some(*id)
                });
                QueryOutput::Names(self.sorted_names(ids))
            }
            GraphQuery::Symbols { name, kind } => {
                let mut hits = Vec::new();
                for (file, rel, sym) in &self.edges {
                    if *rel != Rel::Defines {
                        continue;
                    }
                    let (Some(code), Some(node)) = (self.nodes.get(file), self.nodes.get(sym))
                    else {
                        continue;
                    };
                    let sym_kind = match node.label {
                        NodeLabel::Function => SymbolKind::Function,
                        NodeLabel::Class => SymbolKind::Class,
                        _ => continue,
                    };
                    let wrong_kind = kind.is_some_and(|k| k != sym_kind);
                    if wrong_kind || node.str_prop("name") != Some(name.as_str()) {
                        continue;
                    }
                    let line = match node.props.get("line") {
                        Some(Value::Int(n)) => *n,
                        _ => 0,
                    };
                    hits.push(SymbolHit {
                        name: name.clone(),
                        kind: sym_kind,
                        file: code.str_prop("path").unwrap_or_default().to_string(),
                        line,
                    });
                }
                hits.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
                QueryOutput::Symbols(hits)
            }
            GraphQuery::IndexedPaths { label, prefix } => {
                let mut paths: Vec<String> = self
                    .nodes
                    .values()
                    .filter(|n| n.label == *label)
                    .filter_map(|n| n.str_prop("path"))
                    .filter(|p| p.starts_with(prefix.as_str()))
                    .map(str::to_string)
                    .collect();
                paths.sort();
                QueryOutput::Names(paths)
            }
            GraphQuery::Stats => {
                let count = |label: NodeLabel| {
                    self.nodes.values().filter(|n| n.label == label).count() as u64
                };
                QueryOutput::Stats(GraphStats {
                    notes: self
                        .nodes
                        .keys()
                        .filter(|id| self.is_real_note(**id))
                        .count() as u64,
                    links: self
                        .edges
                        .iter()
                        .filter(|(_, r, _)| *r == Rel::LinksTo)
                        .count() as u64,
                    tags: count(NodeLabel::Tag),
                    code: count(NodeLabel::Code),
                    functions: count(NodeLabel::Function),
                    classes: count(NodeLabel::Class),
                })
            }
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn apply(&self, batch: &[Statement]) -> Result<(), IndexerError> {
        let mut inner = self.inner.write();
        for stmt in batch {
            inner.apply(stmt);
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, query: &GraphQuery) -> Result<QueryOutput, IndexerError> {
        Ok(self.inner.read().run(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(path: &str) -> NodeRef {
        NodeRef::file(NodeLabel::Note, path)
    }

    #[tokio::test]
    async fn test_merge_node_is_idempotent() {
        let graph = MemoryGraph::new();
        let stmt = Statement::MergeNode {
            node: note("/v/a.md"),
            props: vec![("name", Value::from("a"))],
        };
        graph.apply(&[stmt.clone()]).await.unwrap();
        graph.apply(&[stmt]).await.unwrap();

        assert_eq!(graph.count(NodeLabel::Note), 1);
        assert_eq!(graph.applied_batches(), 2);
        assert_eq!(
            graph.query(&GraphQuery::Orphans).await.unwrap(),
            QueryOutput::Names(vec!["a".to_string()])
        );
    }

    #[tokio::test]
    async fn test_placeholder_adopted() {
        let graph = MemoryGraph::new();
        graph
            .apply(&[Statement::MergeEdge {
                from: note("/v/a.md"),
                rel: Rel::LinksTo,
                to: NodeRef::named(NodeLabel::Note, "b"),
                props: vec![],
            }])
            .await
            .unwrap();
        assert_eq!(graph.count(NodeLabel::Note), 2);

        graph
            .apply(&[
                Statement::AdoptPlaceholder {
                    label: NodeLabel::Note,
                    name: "b".to_string(),
                    path: "/v/b.md".to_string(),
                },
                Statement::MergeNode {
                    node: note("/v/b.md"),
                    props: vec![],
                },
            ])
            .await
            .unwrap();

        assert_eq!(graph.count(NodeLabel::Note), 2);
        assert_eq!(graph.targets(&note("/v/a.md"), Rel::LinksTo), vec!["/v/b.md"]);
    }

    #[tokio::test]
    async fn test_detach_delete_removes_edges() {
        let graph = MemoryGraph::new();
        graph
            .apply(&[
                Statement::MergeEdge {
                    from: note("/v/a.md"),
                    rel: Rel::Tagged,
                    to: NodeRef::named(NodeLabel::Tag, "x"),
                    props: vec![],
                },
                Statement::DetachDelete {
                    node: note("/v/a.md"),
                },
            ])
            .await
            .unwrap();

        assert!(!graph.contains(&note("/v/a.md")));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.count(NodeLabel::Tag), 1);
    }

    #[tokio::test]
    async fn test_twin_placeholder_folded_into_real_note() {
        let graph = MemoryGraph::new();
        // A's link merged before B's own upsert became visible.
        graph
            .apply(&[
                Statement::MergeEdge {
                    from: note("/v/A.md"),
                    rel: Rel::LinksTo,
                    to: NodeRef::named(NodeLabel::Note, "B"),
                    props: vec![],
                },
                Statement::MergeNode {
                    node: note("/v/B.md"),
                    props: vec![("name", Value::from("B"))],
                },
            ])
            .await
            .unwrap();
        assert_eq!(graph.count(NodeLabel::Note), 3);

        let adopt = Statement::AdoptPlaceholder {
            label: NodeLabel::Note,
            name: "B".to_string(),
            path: "/v/B.md".to_string(),
        };
        graph.apply(&[adopt]).await.unwrap();
        assert_eq!(graph.count(NodeLabel::Note), 3);

        graph
            .apply(&[Statement::FoldPlaceholders {
                label: NodeLabel::Note,
                name: None,
            }])
            .await
            .unwrap();
        assert_eq!(graph.count(NodeLabel::Note), 2);
        assert_eq!(graph.targets(&note("/v/A.md"), Rel::LinksTo), vec!["/v/B.md"]);
        assert_eq!(
            graph.query(&GraphQuery::BrokenLinks).await.unwrap(),
            QueryOutput::Names(vec![])
        );
    }

    #[tokio::test]
    async fn test_drop_outgoing_removes_unreferenced_leaves() {
        let graph = MemoryGraph::new();
        let tag = |from: &str, name: &str| Statement::MergeEdge {
            from: note(from),
            rel: Rel::Tagged,
            to: NodeRef::named(NodeLabel::Tag, name),
            props: vec![],
        };
        graph
            .apply(&[tag("/v/a.md", "solo"), tag("/v/a.md", "shared"), tag("/v/b.md", "shared")])
            .await
            .unwrap();
        assert_eq!(graph.count(NodeLabel::Tag), 2);

        graph
            .apply(&[Statement::DropOutgoing {
                node: note("/v/a.md"),
                rels: vec![Rel::Tagged],
            }])
            .await
            .unwrap();
        assert!(!graph.contains(&NodeRef::named(NodeLabel::Tag, "solo")));
        assert!(graph.contains(&NodeRef::named(NodeLabel::Tag, "shared")));
    }

    #[tokio::test]
    async fn test_orphans_one_entry_per_note() {
        let graph = MemoryGraph::new();
        for path in ["/v/a/index.md", "/v/b/index.md"] {
            graph
                .apply(&[Statement::MergeNode {
                    node: note(path),
                    props: vec![("name", Value::from("index"))],
                }])
                .await
                .unwrap();
        }
        assert_eq!(
            graph.query(&GraphQuery::Orphans).await.unwrap(),
            QueryOutput::Names(vec!["index".to_string(), "index".to_string()])
        );
    }

    #[tokio::test]
    async fn test_queries_on_empty_graph() {
        let graph = MemoryGraph::new();
        assert_eq!(
            graph.query(&GraphQuery::Orphans).await.unwrap(),
            QueryOutput::Names(vec![])
        );
        assert_eq!(
            graph.query(&GraphQuery::Stats).await.unwrap(),
            QueryOutput::Stats(GraphStats::default())
        );
    }
}

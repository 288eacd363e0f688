//! Graph mutations and reads as closed enums.
//!
//! Every statement renders to openCypher text for the wire and the dump
//! artifact. String literals are always quoted and escaped; labels,
//! relationship types and property keys come from fixed enums and are
//! never taken from file content.

use crate::parser::SymbolKind;
use std::fmt::{self, Write};

/// Node labels in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    Note,
    Code,
    Asset,
    Tag,
    Function,
    Class,
    Module,
    Marker,
    Project,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Note => "Note",
            NodeLabel::Code => "Code",
            NodeLabel::Asset => "Asset",
            NodeLabel::Tag => "Tag",
            NodeLabel::Function => "Function",
            NodeLabel::Class => "Class",
            NodeLabel::Module => "Module",
            NodeLabel::Marker => "Marker",
            NodeLabel::Project => "Project",
        }
    }

    /// Labels of file-backed nodes, keyed by `path`.
    pub const FILES: [NodeLabel; 3] = [NodeLabel::Note, NodeLabel::Code, NodeLabel::Asset];
}

impl From<SymbolKind> for NodeLabel {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Function => NodeLabel::Function,
            SymbolKind::Class => NodeLabel::Class,
        }
    }
}

/// Relationship types in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rel {
    LinksTo,
    Embeds,
    Tagged,
    Defines,
    References,
    Contains,
}

impl Rel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rel::LinksTo => "LINKS_TO",
            Rel::Embeds => "EMBEDS",
            Rel::Tagged => "TAGGED",
            Rel::Defines => "DEFINES",
            Rel::References => "REFERENCES",
            Rel::Contains => "CONTAINS",
        }
    }
}

/// Property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    List(Vec<String>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<&[String]> for Value {
    fn from(items: &[String]) -> Self {
        Value::List(items.to_vec())
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(&quote(s)),
            Value::Int(n) => write!(f, "{}", n),
            Value::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&quote(item))?;
                }
                f.write_char(']')
            }
        }
    }
}

/// A node addressed by one identifying property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub key: &'static str,
    pub value: String,
}

impl NodeRef {
    pub fn new(label: NodeLabel, key: &'static str, value: impl Into<String>) -> Self {
        Self {
            label,
            key,
            value: value.into(),
        }
    }

    /// A file-backed node by path.
    pub fn file(label: NodeLabel, path: impl Into<String>) -> Self {
        Self::new(label, "path", path)
    }

    /// A node by display name (tags, modules, projects, soft references).
    pub fn named(label: NodeLabel, name: impl Into<String>) -> Self {
        Self::new(label, "name", name)
    }

    /// A child node with a synthetic id.
    pub fn child(label: NodeLabel, id: impl Into<String>) -> Self {
        Self::new(label, "id", id)
    }

    fn pattern(&self, var: &str) -> String {
        format!(
            "({}:{} {{{}: {}}})",
            var,
            self.label.as_str(),
            self.key,
            quote(&self.value)
        )
    }
}

/// Property assignments.
pub type Props = Vec<(&'static str, Value)>;

/// One idempotent graph mutation.
///
/// Placeholder handling is best-effort under concurrent writers: two
/// transactions merging the same name can still produce a name-only twin
/// of a real node. `FoldPlaceholders` merges such twins back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Give a name-only placeholder of `label` the real path, so the
    /// following merge by path updates it instead of creating a twin.
    /// Does nothing once a node with that path exists.
    AdoptPlaceholder {
        label: NodeLabel,
        name: String,
        path: String,
    },
    /// Move the incoming links and embeds of name-only `label` nodes onto
    /// the real nodes of the same name, then delete the placeholders.
    /// `name: None` folds every placeholder of the label.
    FoldPlaceholders {
        label: NodeLabel,
        name: Option<String>,
    },
    /// Merge the node by its key and overwrite the given properties.
    MergeNode { node: NodeRef, props: Props },
    /// Delete the node's outgoing relationships of the given types, and
    /// any shared leaf they pointed at that nothing references anymore.
    DropOutgoing { node: NodeRef, rels: Vec<Rel> },
    /// `DropOutgoing` for every file node under a directory.
    DropOutgoingUnder { prefix: String, rels: Vec<Rel> },
    /// Detach-delete every node the node points at through the given types.
    DropChildren { node: NodeRef, rels: Vec<Rel> },
    /// Merge both endpoints and the relationship between them; `props`
    /// are set on the target.
    MergeEdge {
        from: NodeRef,
        rel: Rel,
        to: NodeRef,
        props: Props,
    },
    /// Delete the node and every relationship touching it.
    DetachDelete { node: NodeRef },
    /// Delete all file nodes under a directory, with their owned children.
    DeleteUnder { prefix: String },
    /// Delete projects that no longer contain anything.
    DropEmptyProjects,
}

/// Leaf nodes are shared by name and live only while something points at them.
const LEAF_CONDITION: &str = "(t:Tag OR t:Module OR ((t:Note OR t:Asset) AND t.path IS NULL)) \
     AND NOT ()-->(t)";

const FILE_CONDITION: &str = "(n:Note OR n:Code OR n:Asset)";

impl Statement {
    /// Render as one line of openCypher.
    pub fn to_cypher(&self) -> String {
        match self {
            Statement::AdoptPlaceholder { label, name, path } => format!(
                "MATCH (n:{label} {{name: {name}}}) WHERE n.path IS NULL \
                 AND NOT EXISTS {{ MATCH (:{label} {{path: {path}}}) }} \
                 WITH n LIMIT 1 SET n.path = {path}",
                label = label.as_str(),
                name = quote(name),
                path = quote(path)
            ),
            Statement::FoldPlaceholders { label, name } => {
                let filter = match name {
                    Some(name) => format!(" AND p.name = {}", quote(name)),
                    None => String::new(),
                };
                format!(
                    "MATCH (p:{label}) WHERE p.path IS NULL{filter} \
                     MATCH (n:{label} {{name: p.name}}) WHERE n.path IS NOT NULL \
                     OPTIONAL MATCH (s)-[:LINKS_TO]->(p) \
                     FOREACH (x IN CASE WHEN s IS NULL THEN [] ELSE [s] END | MERGE (x)-[:LINKS_TO]->(n)) \
                     WITH DISTINCT p, n \
                     OPTIONAL MATCH (e)-[:EMBEDS]->(p) \
                     FOREACH (x IN CASE WHEN e IS NULL THEN [] ELSE [e] END | MERGE (x)-[:EMBEDS]->(n)) \
                     WITH DISTINCT p \
                     DETACH DELETE p",
                    label = label.as_str(),
                    filter = filter
                )
            }
            Statement::MergeNode { node, props } => {
                let mut out = format!("MERGE {}", node.pattern("n"));
                push_set(&mut out, "n", props);
                out
            }
            Statement::DropOutgoing { node, rels } => format!(
                "MATCH {}-[r:{}]->(t) DELETE r \
                 WITH DISTINCT t WHERE {} DETACH DELETE t",
                node.pattern("n"),
                rel_union(rels),
                LEAF_CONDITION
            ),
            Statement::DropOutgoingUnder { prefix, rels } => format!(
                "MATCH (n)-[r:{}]->(t) WHERE {} AND n.path STARTS WITH {} DELETE r \
                 WITH DISTINCT t WHERE {} DETACH DELETE t",
                rel_union(rels),
                FILE_CONDITION,
                quote(prefix),
                LEAF_CONDITION
            ),
            Statement::DropChildren { node, rels } => format!(
                "MATCH {}-[:{}]->(c) DETACH DELETE c",
                node.pattern("n"),
                rel_union(rels)
            ),
            Statement::MergeEdge {
                from,
                rel,
                to,
                props,
            } => {
                let mut out = format!("MERGE {} MERGE {}", from.pattern("a"), to.pattern("b"));
                push_set(&mut out, "b", props);
                let _ = write!(out, " MERGE (a)-[:{}]->(b)", rel.as_str());
                out
            }
            Statement::DetachDelete { node } => {
                format!("MATCH {} DETACH DELETE n", node.pattern("n"))
            }
            Statement::DeleteUnder { prefix } => format!(
                "MATCH (n) WHERE {} AND n.path STARTS WITH {} \
                 OPTIONAL MATCH (n)-[:DEFINES|CONTAINS]->(c) DETACH DELETE c, n",
                FILE_CONDITION,
                quote(prefix)
            ),
            Statement::DropEmptyProjects => {
                "MATCH (p:Project) WHERE NOT (p)-->() DELETE p".to_string()
            }
        }
    }
}

fn push_set(out: &mut String, var: &str, props: &Props) {
    for (i, (key, value)) in props.iter().enumerate() {
        let sep = if i == 0 { " SET " } else { ", " };
        let _ = write!(out, "{}{}.{} = {}", sep, var, key, value);
    }
}

fn rel_union(rels: &[Rel]) -> String {
    rels.iter()
        .map(Rel::as_str)
        .collect::<Vec<_>>()
        .join("|")
}

/// Quote a string literal, escaping backslashes, quotes and line breaks.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Read-only graph queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphQuery {
    /// Real notes without an incoming link. Name-returning queries yield
    /// one entry per matching node, so notes sharing a name repeat.
    Orphans,
    /// Notes linking to the note with this name
    Backlinks { name: String },
    /// Notes carrying this tag
    TaggedWith { tag: String },
    /// Real notes without tags
    Untagged,
    /// Link targets that do not exist as files
    BrokenLinks,
    /// Declared symbols by name, optionally restricted to one kind
    Symbols {
        name: String,
        kind: Option<SymbolKind>,
    },
    /// Paths of file nodes of one label under a prefix
    IndexedPaths { label: NodeLabel, prefix: String },
    /// Aggregate counts
    Stats,
}

impl GraphQuery {
    /// Render as openCypher. `Stats` renders as several counting queries.
    pub fn to_cypher(&self) -> Vec<String> {
        let one = |s: String| vec![s];
        match self {
            GraphQuery::Orphans => one(
                "MATCH (n:Note) WHERE n.path IS NOT NULL AND NOT ()-[:LINKS_TO]->(n) \
                 RETURN n.name AS name ORDER BY name"
                    .to_string(),
            ),
            GraphQuery::Backlinks { name } => one(format!(
                "MATCH (a:Note)-[:LINKS_TO]->(b:Note {{name: {}}}) \
                 WITH DISTINCT a RETURN a.name AS name ORDER BY name",
                quote(name)
            )),
            GraphQuery::TaggedWith { tag } => one(format!(
                "MATCH (n:Note)-[:TAGGED]->(:Tag {{name: {}}}) \
                 WITH DISTINCT n RETURN n.name AS name ORDER BY name",
                quote(tag)
            )),
            GraphQuery::Untagged => one(
                "MATCH (n:Note) WHERE n.path IS NOT NULL AND NOT (n)-[:TAGGED]->() \
                 RETURN n.name AS name ORDER BY name"
                    .to_string(),
            ),
            GraphQuery::BrokenLinks => one(
                "MATCH (:Note)-[:LINKS_TO]->(t:Note) WHERE t.path IS NULL \
                 WITH DISTINCT t RETURN t.name AS name ORDER BY name"
                    .to_string(),
            ),
            GraphQuery::Symbols { name, kind } => {
                let target = match kind {
                    Some(kind) => format!("s:{}", NodeLabel::from(*kind).as_str()),
                    None => "s".to_string(),
                };
                one(format!(
                    "MATCH (c:Code)-[:DEFINES]->({}) WHERE s.name = {} \
                     RETURN s.name AS name, labels(s)[0] AS kind, c.path AS file, s.line AS line \
                     ORDER BY file, line",
                    target,
                    quote(name)
                ))
            }
            GraphQuery::IndexedPaths { label, prefix } => one(format!(
                "MATCH (n:{}) WHERE n.path STARTS WITH {} RETURN n.path AS name",
                label.as_str(),
                quote(prefix)
            )),
            GraphQuery::Stats => vec![
                "MATCH (n:Note) WHERE n.path IS NOT NULL RETURN count(n) AS count".to_string(),
                "MATCH ()-[r:LINKS_TO]->() RETURN count(r) AS count".to_string(),
                "MATCH (t:Tag) RETURN count(t) AS count".to_string(),
                "MATCH (c:Code) RETURN count(c) AS count".to_string(),
                "MATCH (f:Function) RETURN count(f) AS count".to_string(),
                "MATCH (k:Class) RETURN count(k) AS count".to_string(),
            ],
        }
    }
}

/// One symbol lookup hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolHit {
    pub name: String,
    pub kind: SymbolKind,
    /// Path of the declaring `Code` node
    pub file: String,
    pub line: i64,
}

/// Aggregate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub notes: u64,
    pub links: u64,
    pub tags: u64,
    pub code: u64,
    pub functions: u64,
    pub classes: u64,
}

/// Result of a `GraphQuery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    Names(Vec<String>),
    Symbols(Vec<SymbolHit>),
    Stats(GraphStats),
}

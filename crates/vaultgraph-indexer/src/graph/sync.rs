//! Graph sync client.
//!
//! Translates parsed metadata into statement batches. In direct mode each
//! batch is applied to the store as soon as it is built; in dump mode
//! batches accumulate in memory until written out or flushed.
//!
//! Every upsert is a full replace of the file's derived state: the node is
//! merged by path, its owned relationships and children are dropped, then
//! the current ones are merged back.

use super::store::GraphStore;
use super::{NodeLabel, NodeRef, Props, Rel, Statement, Value};
use crate::parser::{AssetMeta, CodeMeta, Metadata, NoteMeta};
use crate::IndexerError;
use parking_lot::Mutex;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const NOTE_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Relationships a file node owns and replaces on every upsert.
const NOTE_RELS: [Rel; 3] = [Rel::LinksTo, Rel::Embeds, Rel::Tagged];
const CODE_RELS: [Rel; 1] = [Rel::References];
const FILE_RELS: [Rel; 4] = [Rel::LinksTo, Rel::Embeds, Rel::Tagged, Rel::References];

/// Writes metadata to the graph, directly or through a dump buffer.
pub struct SyncClient {
    store: Option<Arc<dyn GraphStore>>,
    buffer: Mutex<Vec<Vec<Statement>>>,
}

impl SyncClient {
    /// Apply every batch to `store` immediately.
    pub fn direct(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store: Some(store),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Buffer every batch until `write_dump` or `flush`.
    pub fn dump() -> Self {
        Self {
            store: None,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn is_dump(&self) -> bool {
        self.store.is_none()
    }

    /// The live store, if in direct mode.
    pub fn store(&self) -> Option<&Arc<dyn GraphStore>> {
        self.store.as_ref()
    }

    async fn submit(&self, batch: Vec<Statement>) -> Result<(), IndexerError> {
        if batch.is_empty() {
            return Ok(());
        }
        match &self.store {
            Some(store) => store.apply(&batch).await,
            None => {
                self.buffer.lock().push(batch);
                Ok(())
            }
        }
    }

    /// Upsert any parsed file.
    pub async fn upsert(&self, meta: &Metadata, project: Option<&str>) -> Result<(), IndexerError> {
        match meta {
            Metadata::Note(note) => self.upsert_note(note, project).await,
            Metadata::Code(code) => self.upsert_code(code, project).await,
            Metadata::Asset(asset) => self.upsert_asset(asset, project).await,
        }
    }

    pub async fn upsert_note(
        &self,
        note: &NoteMeta,
        project: Option<&str>,
    ) -> Result<(), IndexerError> {
        debug!(path = ?note.path, tags = note.tags.len(), links = note.links.len(), "Upsert note");
        self.submit(note_statements(note, project)).await
    }

    pub async fn upsert_code(
        &self,
        code: &CodeMeta,
        project: Option<&str>,
    ) -> Result<(), IndexerError> {
        debug!(
            path = ?code.path,
            functions = code.functions.len(),
            classes = code.classes.len(),
            "Upsert code"
        );
        self.submit(code_statements(code, project)).await
    }

    pub async fn upsert_asset(
        &self,
        asset: &AssetMeta,
        project: Option<&str>,
    ) -> Result<(), IndexerError> {
        debug!(path = ?asset.path, "Upsert asset");
        self.submit(asset_statements(asset, project)).await
    }

    /// Delete a note, the tags and placeholders only it referenced, and
    /// its project if it was the last member.
    pub async fn delete_note(&self, path: &Path) -> Result<(), IndexerError> {
        let node = NodeRef::file(NodeLabel::Note, path_str(path));
        self.submit(vec![
            Statement::DropOutgoing {
                node: node.clone(),
                rels: NOTE_RELS.to_vec(),
            },
            Statement::DetachDelete { node },
            Statement::DropEmptyProjects,
        ])
        .await
    }

    /// Delete a source file together with its symbols and markers.
    pub async fn delete_code(&self, path: &Path) -> Result<(), IndexerError> {
        let node = NodeRef::file(NodeLabel::Code, path_str(path));
        self.submit(vec![
            Statement::DropChildren {
                node: node.clone(),
                rels: vec![Rel::Defines, Rel::Contains],
            },
            Statement::DropOutgoing {
                node: node.clone(),
                rels: CODE_RELS.to_vec(),
            },
            Statement::DetachDelete { node },
            Statement::DropEmptyProjects,
        ])
        .await
    }

    /// Delete whatever file node has this path, without knowing its type.
    pub async fn delete_path(&self, path: &Path) -> Result<(), IndexerError> {
        let value = path_str(path);
        let code = NodeRef::file(NodeLabel::Code, value.clone());
        let mut batch = vec![Statement::DropChildren {
            node: code,
            rels: vec![Rel::Defines, Rel::Contains],
        }];
        for label in NodeLabel::FILES {
            let node = NodeRef::file(label, value.clone());
            batch.push(Statement::DropOutgoing {
                node: node.clone(),
                rels: FILE_RELS.to_vec(),
            });
            batch.push(Statement::DetachDelete { node });
        }
        batch.push(Statement::DropEmptyProjects);
        debug!(path = ?path, "Delete file");
        self.submit(batch).await
    }

    /// Delete every file node under a directory.
    pub async fn delete_subtree(&self, dir: &Path) -> Result<(), IndexerError> {
        let mut prefix = path_str(dir);
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
        debug!(dir = ?dir, "Delete subtree");
        self.submit(vec![
            Statement::DropOutgoingUnder {
                prefix: prefix.clone(),
                rels: FILE_RELS.to_vec(),
            },
            Statement::DeleteUnder { prefix },
            Statement::DropEmptyProjects,
        ])
        .await
    }

    /// Merge name-only note and asset twins into the real nodes of the
    /// same name. Concurrent upserts can leave such twins behind.
    pub async fn resolve_placeholders(&self) -> Result<(), IndexerError> {
        self.submit(vec![
            Statement::FoldPlaceholders {
                label: NodeLabel::Note,
                name: None,
            },
            Statement::FoldPlaceholders {
                label: NodeLabel::Asset,
                name: None,
            },
        ])
        .await
    }

    /// Buffered batch count (dump mode).
    pub fn buffered_batches(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Render the buffer as a replayable dump.
    pub fn render_dump(&self) -> String {
        let buffer = self.buffer.lock();
        let mut out = format!("// vaultgraph dump {}\n", chrono::Utc::now().to_rfc3339());
        for batch in buffer.iter() {
            out.push('\n');
            for stmt in batch {
                let _ = writeln!(out, "{};", stmt.to_cypher());
            }
        }
        out
    }

    /// Write the buffer to `path`. Returns the number of batches written.
    pub async fn write_dump(&self, path: &Path) -> Result<usize, IndexerError> {
        let text = self.render_dump();
        let batches = self.buffered_batches();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexerError::Dump(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, text)
            .await
            .map_err(|e| IndexerError::Dump(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), batches, "Wrote dump");
        Ok(batches)
    }

    /// Apply and drain the buffer against `store`, in order.
    pub async fn flush(&self, store: &dyn GraphStore) -> Result<usize, IndexerError> {
        let batches = std::mem::take(&mut *self.buffer.lock());
        let total = batches.len();
        for batch in &batches {
            store.apply(batch).await?;
        }
        info!(batches = total, "Flushed dump buffer");
        Ok(total)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn timestamp() -> Value {
    Value::Str(chrono::Utc::now().to_rfc3339())
}

/// Name a wikilink target resolves to: last path segment, note extension dropped.
fn link_name(target: &str) -> &str {
    let last = target.rsplit('/').next().unwrap_or(target);
    NOTE_EXTENSIONS
        .iter()
        .find_map(|ext| last.strip_suffix(ext).and_then(|s| s.strip_suffix('.')))
        .unwrap_or(last)
}

/// Node an embed points at: an asset by file name, or a note by name.
fn embed_target(target: &str) -> NodeRef {
    let last = target.rsplit('/').next().unwrap_or(target);
    let ext = Path::new(last)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext {
        Some(ext) if !NOTE_EXTENSIONS.contains(&ext.as_str()) => {
            NodeRef::named(NodeLabel::Asset, last)
        }
        _ => NodeRef::named(NodeLabel::Note, link_name(last)),
    }
}

fn project_edge(project: Option<&str>, node: &NodeRef) -> Option<Statement> {
    project.map(|name| Statement::MergeEdge {
        from: NodeRef::named(NodeLabel::Project, name),
        rel: Rel::Contains,
        to: node.clone(),
        props: vec![],
    })
}

fn with_project(mut props: Props, project: Option<&str>) -> Props {
    if let Some(name) = project {
        props.push(("project", Value::from(name)));
    }
    props
}

/// Statements that replace a note's graph state.
pub fn note_statements(note: &NoteMeta, project: Option<&str>) -> Vec<Statement> {
    let path = path_str(&note.path);
    let node = NodeRef::file(NodeLabel::Note, path.clone());

    let props = with_project(
        vec![
            ("name", Value::from(note.name.as_str())),
            ("title", Value::from(note.title.as_str())),
            ("tags", Value::from(note.tags.as_slice())),
            ("links", Value::from(note.links.as_slice())),
            ("embeds", Value::from(note.embeds.as_slice())),
            ("hash", Value::from(note.hash.as_str())),
            ("indexed_at", timestamp()),
        ],
        project,
    );

    let mut batch = vec![
        Statement::AdoptPlaceholder {
            label: NodeLabel::Note,
            name: note.name.clone(),
            path,
        },
        Statement::MergeNode {
            node: node.clone(),
            props,
        },
        Statement::FoldPlaceholders {
            label: NodeLabel::Note,
            name: Some(note.name.clone()),
        },
        Statement::DropOutgoing {
            node: node.clone(),
            rels: NOTE_RELS.to_vec(),
        },
    ];

    for tag in &note.tags {
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::Tagged,
            to: NodeRef::named(NodeLabel::Tag, tag.as_str()),
            props: vec![],
        });
    }
    for link in &note.links {
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::LinksTo,
            to: NodeRef::named(NodeLabel::Note, link_name(link)),
            props: vec![],
        });
    }
    for embed in &note.embeds {
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::Embeds,
            to: embed_target(embed),
            props: vec![],
        });
    }
    batch.extend(project_edge(project, &node));
    batch
}

/// Statements that replace a source file's graph state.
pub fn code_statements(code: &CodeMeta, project: Option<&str>) -> Vec<Statement> {
    let path = path_str(&code.path);
    let node = NodeRef::file(NodeLabel::Code, path.clone());

    let props = with_project(
        vec![
            ("name", Value::from(code.name.as_str())),
            ("language", Value::from(code.language.id())),
            ("hash", Value::from(code.hash.as_str())),
            ("line_count", Value::from(code.line_count)),
            ("imports", Value::from(code.imports.as_slice())),
            ("indexed_at", timestamp()),
        ],
        project,
    );

    let mut batch = vec![
        Statement::MergeNode {
            node: node.clone(),
            props,
        },
        Statement::DropOutgoing {
            node: node.clone(),
            rels: CODE_RELS.to_vec(),
        },
        Statement::DropChildren {
            node: node.clone(),
            rels: vec![Rel::Defines, Rel::Contains],
        },
    ];

    for symbol in code.functions.iter().chain(&code.classes) {
        let id = format!("{}#{}:{}", path, symbol.kind.label(), symbol.name);
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::Defines,
            to: NodeRef::child(symbol.kind.into(), id),
            props: vec![
                ("name", Value::from(symbol.name.as_str())),
                ("file", Value::from(path.as_str())),
                ("line", Value::from(symbol.line)),
            ],
        });
    }
    for import in &code.imports {
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::References,
            to: NodeRef::named(NodeLabel::Module, import.as_str()),
            props: vec![],
        });
    }
    for marker in &code.markers {
        batch.push(Statement::MergeEdge {
            from: node.clone(),
            rel: Rel::Contains,
            to: NodeRef::child(NodeLabel::Marker, format!("{}:{}", path, marker.line)),
            props: vec![
                ("kind", Value::from(marker.kind.as_str())),
                ("line", Value::from(marker.line)),
                ("text", Value::from(marker.text.as_str())),
                ("file", Value::from(path.as_str())),
            ],
        });
    }
    batch.extend(project_edge(project, &node));
    batch
}

/// Statements that upsert an attachment.
pub fn asset_statements(asset: &AssetMeta, project: Option<&str>) -> Vec<Statement> {
    let path = path_str(&asset.path);
    let node = NodeRef::file(NodeLabel::Asset, path.clone());
    let props = with_project(
        vec![
            ("name", Value::from(asset.name.as_str())),
            ("size", Value::Int(asset.size.min(i64::MAX as u64) as i64)),
        ],
        project,
    );

    let mut batch = vec![
        Statement::AdoptPlaceholder {
            label: NodeLabel::Asset,
            name: asset.name.clone(),
            path,
        },
        Statement::MergeNode {
            node: node.clone(),
            props,
        },
        Statement::FoldPlaceholders {
            label: NodeLabel::Asset,
            name: Some(asset.name.clone()),
        },
    ];
    batch.extend(project_edge(project, &node));
    batch
}

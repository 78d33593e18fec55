use crate::backend::{FailureKind, NodeBackend, RawStub, RecordFailure};
use crate::error::{HierNoteError, Result};
use crate::logical_id::Hierarchy;
use crate::node::{
    DataKind, Node, NodeData, NodeRecord, NodeStub, NodeType, NoteData, Payload, SchemaData,
    Scope, VaultRef,
};
use crate::parser::{NoteParser, NoteProps, YamlCodec};
use crate::tree::{materialize, Materialized};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Response of a single-record read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGetResp<T> {
    pub item: NodeRecord<T>,
    pub node_type: NodeType,
    pub data_kind: DataKind,
}

impl<T: Clone> NodeGetResp<T> {
    pub fn map<U>(self, f: impl Fn(T) -> U) -> NodeGetResp<U> {
        NodeGetResp {
            item: self.item.map(f),
            node_type: self.node_type,
            data_kind: self.data_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGetRootResp<T> {
    pub item: Node<T>,
    pub data_kind: DataKind,
}

/// Response of a pattern query. Records that exist but could not be read
/// are listed in `failures` rather than failing the whole query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeQueryResp<T> {
    pub items: Vec<NodeGetResp<T>>,
    pub failures: Vec<RecordFailure>,
    pub node_type: NodeType,
    pub data_kind: DataKind,
}

/// How a query string selects logical ids.
#[derive(Debug, Clone)]
pub enum QueryPattern {
    All,
    Exact(String),
    Glob(glob::Pattern),
}

impl QueryPattern {
    /// Empty or `*` selects everything; text with `*`, `?` or `[` is a glob;
    /// anything else must match an id exactly.
    pub fn parse(query: &str) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() || query == "*" || query == "**" {
            return Ok(QueryPattern::All);
        }
        if query.contains(['*', '?', '[']) {
            let pattern = glob::Pattern::new(query).map_err(|e| {
                HierNoteError::Validation(format!("invalid query pattern '{query}': {e}"))
            })?;
            return Ok(QueryPattern::Glob(pattern));
        }
        Ok(QueryPattern::Exact(query.to_string()))
    }

    pub fn matches(&self, logical_id: &str) -> bool {
        match self {
            QueryPattern::All => true,
            QueryPattern::Exact(id) => id == logical_id,
            QueryPattern::Glob(pattern) => pattern.matches(logical_id),
        }
    }
}

/// Stubs decoded from one backend snapshot.
struct Decoded<T> {
    stubs: BTreeMap<String, NodeStub<T>>,
    bodies: BTreeMap<String, String>,
    failures: Vec<RecordFailure>,
}

/// The storage API. Holds no tree between calls: every read takes a fresh
/// snapshot from the backend and materializes it.
pub struct NodeStore<B> {
    backend: B,
    hierarchy: Hierarchy,
    parser: NoteParser,
}

impl<B: NodeBackend> NodeStore<B> {
    pub fn new(backend: B, hierarchy: Hierarchy) -> Self {
        let parser = NoteParser::new(Arc::new(YamlCodec), hierarchy.clone());
        NodeStore {
            backend,
            hierarchy,
            parser,
        }
    }

    /// Replace the parser used by `ingest` (e.g. to inject a metadata codec).
    pub fn with_parser(mut self, parser: NoteParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn parser(&self) -> &NoteParser {
        &self.parser
    }

    async fn decoded<T: NodeData>(&self, scope: &Scope) -> Result<Decoded<T>> {
        let snapshot = self.backend.read_all(scope, T::KIND).await?;
        let mut decoded = Decoded {
            stubs: BTreeMap::new(),
            bodies: BTreeMap::new(),
            failures: snapshot.failures,
        };
        for (logical_id, raw) in snapshot.stubs {
            match raw.decode::<T>() {
                Ok(stub) => {
                    if let Some(body) = raw.body {
                        decoded.bodies.insert(logical_id.clone(), body);
                    }
                    decoded.stubs.insert(logical_id, stub);
                }
                Err(e) => {
                    log::warn!("Skipping {} '{logical_id}': {e}", T::KIND);
                    decoded.failures.push(RecordFailure::from_error(logical_id, &e));
                }
            }
        }
        Ok(decoded)
    }

    async fn materialized<T: NodeData>(
        &self,
        scope: &Scope,
    ) -> Result<(Materialized<T>, Vec<RecordFailure>)> {
        let mut decoded = self.decoded::<T>(scope).await?;
        let mut tree = materialize(&self.hierarchy, &decoded.stubs);
        for node in tree.nodes.values_mut().chain(tree.orphans.values_mut()) {
            node.body = decoded.bodies.remove(&node.logical_id);
        }
        if tree.has_orphans() {
            log::warn!(
                "{} {} node(s) in scope '{scope}' are disconnected from the root: {}",
                tree.orphans.len(),
                T::KIND,
                tree.orphan_heads().join(", ")
            );
        }
        for id in &tree.invalid {
            decoded.failures.push(RecordFailure::new(
                id.clone(),
                FailureKind::Validation,
                "invalid logical id",
            ));
        }
        Ok((tree, decoded.failures))
    }

    // ── Typed API ──────────────────────────────────────────────

    /// Get one node by logical id, as a full node or a bare stub.
    pub async fn get<T: NodeData>(
        &self,
        scope: &Scope,
        logical_id: &str,
        node_type: NodeType,
    ) -> Result<NodeGetResp<T>> {
        let not_found = || HierNoteError::NotFound {
            kind: T::KIND,
            logical_id: logical_id.to_string(),
        };

        let item = match node_type {
            NodeType::Stub => {
                let raw = self
                    .backend
                    .read_one(scope, logical_id, T::KIND)
                    .await?
                    .ok_or_else(not_found)?;
                NodeRecord::Stub(raw.decode::<T>()?)
            }
            NodeType::Full => {
                let (tree, failures) = self.materialized::<T>(scope).await?;
                match tree.get(logical_id) {
                    Some(node) => NodeRecord::Full(node.clone()),
                    None => {
                        if let Some(f) = failures.iter().find(|f| f.logical_id == logical_id) {
                            return Err(f.to_error(T::KIND));
                        }
                        return Err(not_found());
                    }
                }
            }
        };

        Ok(NodeGetResp {
            item,
            node_type,
            data_kind: T::KIND,
        })
    }

    /// The materialized root of the tree for this data kind.
    pub async fn get_root<T: NodeData>(&self, scope: &Scope) -> Result<NodeGetRootResp<T>> {
        let (tree, _) = self.materialized::<T>(scope).await?;
        let root = tree
            .root_node()
            .cloned()
            .ok_or(HierNoteError::EmptyStore { kind: T::KIND })?;
        Ok(NodeGetRootResp {
            item: root,
            data_kind: T::KIND,
        })
    }

    /// All records whose logical id matches `query`, in hierarchy order.
    /// No match is an empty result, not an error.
    pub async fn query<T: NodeData>(
        &self,
        scope: &Scope,
        query: &str,
        node_type: NodeType,
    ) -> Result<NodeQueryResp<T>> {
        let pattern = QueryPattern::parse(query)?;

        let (mut items, failures): (Vec<NodeRecord<T>>, Vec<RecordFailure>) = match node_type {
            NodeType::Stub => {
                let decoded = self.decoded::<T>(scope).await?;
                let items = decoded
                    .stubs
                    .into_values()
                    .filter(|s| pattern.matches(&s.logical_id))
                    .map(NodeRecord::Stub)
                    .collect();
                (items, decoded.failures)
            }
            NodeType::Full => {
                let (tree, failures) = self.materialized::<T>(scope).await?;
                let items = tree
                    .nodes
                    .into_values()
                    .chain(tree.orphans.into_values())
                    .filter(|n| pattern.matches(&n.logical_id))
                    .map(NodeRecord::Full)
                    .collect();
                (items, failures)
            }
        };
        items.sort_by(|a, b| self.hierarchy.compare(a.logical_id(), b.logical_id()));

        Ok(NodeQueryResp {
            items: items
                .into_iter()
                .map(|item| NodeGetResp {
                    item,
                    node_type,
                    data_kind: T::KIND,
                })
                .collect(),
            failures: failures
                .into_iter()
                .filter(|f| pattern.matches(&f.logical_id))
                .collect(),
            node_type,
            data_kind: T::KIND,
        })
    }

    /// Upsert the stub form of `node` (id, logical id, payload, body).
    /// Parent and children are ignored; they are always derived on read.
    pub async fn write<T: NodeData>(&self, scope: &Scope, node: &Node<T>) -> Result<()> {
        node.stub().validate(&self.hierarchy)?;
        let raw = RawStub::from_node(node)?;
        self.backend.upsert(scope, raw, T::KIND).await?;
        log::debug!("Wrote {} '{}' in scope '{scope}'", T::KIND, node.logical_id);
        Ok(())
    }

    /// Write several nodes. Every node is validated before the first write,
    /// so one bad record leaves the backend untouched.
    pub async fn write_many<T: NodeData>(&self, scope: &Scope, nodes: &[Node<T>]) -> Result<()> {
        let mut raws = Vec::with_capacity(nodes.len());
        for node in nodes {
            node.stub().validate(&self.hierarchy)?;
            raws.push(RawStub::from_node(node)?);
        }
        let count = raws.len();
        for raw in raws {
            self.backend.upsert(scope, raw, T::KIND).await?;
        }
        log::debug!("Wrote {count} {} record(s) in scope '{scope}'", T::KIND);
        Ok(())
    }

    /// Move one record to a new logical id, keeping its id, payload and body.
    /// Descendants keep their own ids; the next read places them by the new
    /// tree shape.
    pub async fn rename(&self, scope: &Scope, from: &str, to: &str, kind: DataKind) -> Result<()> {
        self.hierarchy.validate(to)?;
        if from == to {
            return Ok(());
        }
        let mut raw = self
            .backend
            .read_one(scope, from, kind)
            .await?
            .ok_or_else(|| HierNoteError::NotFound {
                kind,
                logical_id: from.to_string(),
            })?;
        if self.backend.read_one(scope, to, kind).await?.is_some() {
            return Err(HierNoteError::AlreadyExists {
                kind,
                logical_id: to.to_string(),
            });
        }

        raw.logical_id = to.to_string();
        self.backend.upsert(scope, raw, kind).await?;
        self.backend.delete(scope, from, kind).await?;
        log::debug!("Renamed {kind} '{from}' to '{to}' in scope '{scope}'");
        Ok(())
    }

    /// Look a record up by its storage-level id rather than its logical id.
    pub async fn find_by_id<T: NodeData>(
        &self,
        scope: &Scope,
        id: &str,
        node_type: NodeType,
    ) -> Result<NodeGetResp<T>> {
        let raw = self
            .backend
            .read_by_id(scope, id, T::KIND)
            .await?
            .ok_or_else(|| HierNoteError::IdNotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
        match node_type {
            NodeType::Stub => Ok(NodeGetResp {
                item: NodeRecord::Stub(raw.decode::<T>()?),
                node_type,
                data_kind: T::KIND,
            }),
            NodeType::Full => self.get::<T>(scope, &raw.logical_id, node_type).await,
        }
    }

    /// The whole tree, orphans and invalid ids included, for tooling.
    pub async fn tree<T: NodeData>(&self, scope: &Scope) -> Result<Materialized<T>> {
        Ok(self.materialized::<T>(scope).await?.0)
    }

    /// Remove one record. Later reads simply no longer see it.
    pub async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<()> {
        if !self.backend.delete(scope, logical_id, kind).await? {
            return Err(HierNoteError::NotFound {
                kind,
                logical_id: logical_id.to_string(),
            });
        }
        log::debug!("Deleted {kind} '{logical_id}' in scope '{scope}'");
        Ok(())
    }

    /// Parse raw document text and write it as the note `fname`.
    pub async fn ingest(
        &self,
        scope: &Scope,
        vault: &VaultRef,
        fname: &str,
        raw: &str,
        calculate_hash: bool,
    ) -> Result<NoteProps> {
        self.hierarchy.validate(fname)?;
        let note = self.parser.parse(raw, fname, vault, calculate_hash)?;
        self.write(scope, &note.clone().into_node()).await?;
        Ok(note)
    }

    // ── Dynamic (untyped) API for the CLI ──────────────────────

    pub async fn get_dynamic(
        &self,
        scope: &Scope,
        logical_id: &str,
        node_type: NodeType,
        kind: DataKind,
    ) -> Result<NodeGetResp<Payload>> {
        Ok(match kind {
            DataKind::Note => self
                .get::<NoteData>(scope, logical_id, node_type)
                .await?
                .map(Payload::Note),
            DataKind::Schema => self
                .get::<SchemaData>(scope, logical_id, node_type)
                .await?
                .map(Payload::Schema),
        })
    }

    pub async fn find_by_id_dynamic(
        &self,
        scope: &Scope,
        id: &str,
        node_type: NodeType,
        kind: DataKind,
    ) -> Result<NodeGetResp<Payload>> {
        Ok(match kind {
            DataKind::Note => self
                .find_by_id::<NoteData>(scope, id, node_type)
                .await?
                .map(Payload::Note),
            DataKind::Schema => self
                .find_by_id::<SchemaData>(scope, id, node_type)
                .await?
                .map(Payload::Schema),
        })
    }

    pub async fn get_root_dynamic(
        &self,
        scope: &Scope,
        kind: DataKind,
    ) -> Result<NodeGetRootResp<Payload>> {
        Ok(match kind {
            DataKind::Note => {
                let resp = self.get_root::<NoteData>(scope).await?;
                NodeGetRootResp {
                    item: resp.item.map(Payload::Note),
                    data_kind: resp.data_kind,
                }
            }
            DataKind::Schema => {
                let resp = self.get_root::<SchemaData>(scope).await?;
                NodeGetRootResp {
                    item: resp.item.map(Payload::Schema),
                    data_kind: resp.data_kind,
                }
            }
        })
    }

    pub async fn query_dynamic(
        &self,
        scope: &Scope,
        query: &str,
        node_type: NodeType,
        kind: DataKind,
    ) -> Result<NodeQueryResp<Payload>> {
        fn lift<T: Clone>(resp: NodeQueryResp<T>, f: fn(T) -> Payload) -> NodeQueryResp<Payload> {
            NodeQueryResp {
                items: resp.items.into_iter().map(|item| item.map(f)).collect(),
                failures: resp.failures,
                node_type: resp.node_type,
                data_kind: resp.data_kind,
            }
        }
        Ok(match kind {
            DataKind::Note => lift(
                self.query::<NoteData>(scope, query, node_type).await?,
                Payload::Note,
            ),
            DataKind::Schema => lift(
                self.query::<SchemaData>(scope, query, node_type).await?,
                Payload::Schema,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> NodeStore<MemoryBackend> {
        NodeStore::new(MemoryBackend::new(), Hierarchy::default())
    }

    fn note_node(logical_id: &str) -> Node<NoteData> {
        Node::from_stub(
            NodeStub {
                id: format!("id-{logical_id}"),
                logical_id: logical_id.to_string(),
                data: NoteData {
                    title: logical_id.to_uppercase(),
                    desc: String::new(),
                    created: 0,
                    updated: 0,
                    tags: Vec::new(),
                    custom: BTreeMap::new(),
                    content_hash: None,
                },
            },
            Some(format!("body of {logical_id}")),
        )
    }

    #[test]
    fn test_query_pattern_parsing() {
        assert!(matches!(QueryPattern::parse("").unwrap(), QueryPattern::All));
        assert!(matches!(QueryPattern::parse("*").unwrap(), QueryPattern::All));
        assert!(matches!(QueryPattern::parse("a.b").unwrap(), QueryPattern::Exact(_)));

        let glob = QueryPattern::parse("a.*").unwrap();
        assert!(glob.matches("a.b"));
        assert!(glob.matches("a.b.c"));
        assert!(!glob.matches("a"));
        assert!(!glob.matches("ab.c"));

        assert!(QueryPattern::parse("a.[").is_err());
    }

    #[tokio::test]
    async fn test_write_then_get_stub_and_full() {
        let store = store();
        let scope = Scope::new("s");
        for id in ["a", "a.b"] {
            store.write(&scope, &note_node(id)).await.unwrap();
        }

        let stub = store.get::<NoteData>(&scope, "a.b", NodeType::Stub).await.unwrap();
        assert_eq!(stub.node_type, NodeType::Stub);
        assert!(matches!(stub.item, NodeRecord::Stub(_)));

        let full = store.get::<NoteData>(&scope, "a.b", NodeType::Full).await.unwrap();
        let node = full.item.as_node().unwrap();
        assert_eq!(node.parent.as_ref().unwrap().logical_id, "a");
        assert_eq!(node.body.as_deref(), Some("body of a.b"));
        assert_eq!(full.data_kind, DataKind::Note);
    }

    #[tokio::test]
    async fn test_write_ignores_parent_and_children() {
        let store = store();
        let scope = Scope::new("s");
        let mut node = note_node("a");
        node.children.push(note_node("bogus").stub());
        store.write(&scope, &node).await.unwrap();

        let root = store.get_root::<NoteData>(&scope).await.unwrap();
        assert!(root.item.children.is_empty());
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_records() {
        let store = store();
        let scope = Scope::new("s");
        let err = store.write(&scope, &note_node("a.")).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Validation(_)));

        let schema = Node::from_stub(
            NodeStub {
                id: "s1".into(),
                logical_id: "journal".into(),
                data: SchemaData {
                    title: "Journal".into(),
                    desc: String::new(),
                    aliases: Vec::new(),
                    kind: None,
                    choices: BTreeMap::new(),
                },
            },
            None,
        );
        let err = store.write(&scope, &schema).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Validation(_)));
        assert!(store.tree::<SchemaData>(&scope).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_and_empty_store() {
        let store = store();
        let scope = Scope::new("s");
        let err = store.get::<NoteData>(&scope, "nope", NodeType::Stub).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));
        let err = store.get::<NoteData>(&scope, "nope", NodeType::Full).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));

        let err = store.get_root::<SchemaData>(&scope).await.unwrap_err();
        assert!(matches!(err, HierNoteError::EmptyStore { kind: DataKind::Schema }));
    }

    #[tokio::test]
    async fn test_delete_removes_from_later_trees() {
        let store = store();
        let scope = Scope::new("s");
        for id in ["a", "a.b", "a.c"] {
            store.write(&scope, &note_node(id)).await.unwrap();
        }
        store.delete(&scope, "a.b", DataKind::Note).await.unwrap();

        let root = store.get_root::<NoteData>(&scope).await.unwrap();
        let children: Vec<_> = root.item.children.iter().map(|c| c.logical_id.as_str()).collect();
        assert_eq!(children, vec!["a.c"]);

        let err = store.delete(&scope, "a.b", DataKind::Note).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_record_is_a_query_failure() {
        let backend = MemoryBackend::new();
        let scope = Scope::new("s");
        backend
            .upsert(
                &scope,
                RawStub {
                    id: "x".into(),
                    logical_id: "a.broken".into(),
                    data: serde_json::json!({ "title": ["not", "a", "string"] }),
                    body: None,
                },
                DataKind::Note,
            )
            .await
            .unwrap();
        let store = NodeStore::new(backend, Hierarchy::default());
        store.write(&scope, &note_node("a")).await.unwrap();
        store.write(&scope, &note_node("a.ok")).await.unwrap();

        let resp = store.query::<NoteData>(&scope, "a*", NodeType::Full).await.unwrap();
        let ids: Vec<_> = resp.items.iter().map(|i| i.item.logical_id()).collect();
        assert_eq!(ids, vec!["a", "a.ok"]);
        assert_eq!(resp.failures.len(), 1);
        assert_eq!(resp.failures[0].logical_id, "a.broken");

        let err = store.get::<NoteData>(&scope, "a.broken", NodeType::Full).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Parse(_)));
    }

    #[tokio::test]
    async fn test_invalid_stored_id_is_a_validation_error() {
        let backend = MemoryBackend::new();
        let scope = Scope::new("s");
        backend
            .upsert(
                &scope,
                RawStub {
                    id: "x".into(),
                    logical_id: "a..b".into(),
                    data: serde_json::json!({ "title": "bad" }),
                    body: None,
                },
                DataKind::Note,
            )
            .await
            .unwrap();
        let store = NodeStore::new(backend, Hierarchy::default());

        let err = store.get::<NoteData>(&scope, "a..b", NodeType::Full).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Validation(_)));
        let resp = store.query::<NoteData>(&scope, "*", NodeType::Full).await.unwrap();
        assert_eq!(resp.failures[0].kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_write_many_is_all_or_nothing() {
        let store = store();
        let scope = Scope::new("s");
        let batch = vec![note_node("a"), note_node("a.b"), note_node("a.c")];
        store.write_many(&scope, &batch).await.unwrap();
        let root = store.get_root::<NoteData>(&scope).await.unwrap();
        assert_eq!(root.item.children.len(), 2);

        let bad = vec![note_node("b"), note_node("b.")];
        let err = store.write_many(&scope, &bad).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Validation(_)));
        let err = store.get::<NoteData>(&scope, "b", NodeType::Stub).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rename_moves_record_and_keeps_identity() {
        let store = store();
        let scope = Scope::new("s");
        for id in ["a", "a.b", "a.c"] {
            store.write(&scope, &note_node(id)).await.unwrap();
        }
        store.rename(&scope, "a.b", "a.c.b", DataKind::Note).await.unwrap();

        let err = store.get::<NoteData>(&scope, "a.b", NodeType::Stub).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));
        let moved = store.get::<NoteData>(&scope, "a.c.b", NodeType::Full).await.unwrap();
        let node = moved.item.as_node().unwrap();
        assert_eq!(node.id, "id-a.b");
        assert_eq!(node.data.title, "A.B");
        assert_eq!(node.body.as_deref(), Some("body of a.b"));
        assert_eq!(node.parent.as_ref().unwrap().logical_id, "a.c");

        let err = store.rename(&scope, "a.c.b", "a", DataKind::Note).await.unwrap_err();
        assert!(matches!(err, HierNoteError::AlreadyExists { .. }));
        let err = store.rename(&scope, "missing", "z", DataKind::Note).await.unwrap_err();
        assert!(matches!(err, HierNoteError::NotFound { .. }));
        let err = store.rename(&scope, "a.c", "a.", DataKind::Note).await.unwrap_err();
        assert!(matches!(err, HierNoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let store = store();
        let scope = Scope::new("s");
        for id in ["a", "a.b"] {
            store.write(&scope, &note_node(id)).await.unwrap();
        }

        let stub = store.find_by_id::<NoteData>(&scope, "id-a.b", NodeType::Stub).await.unwrap();
        assert_eq!(stub.item.logical_id(), "a.b");
        let full = store.find_by_id::<NoteData>(&scope, "id-a.b", NodeType::Full).await.unwrap();
        assert_eq!(
            full.item.as_node().unwrap().parent.as_ref().unwrap().logical_id,
            "a"
        );

        let err = store.find_by_id::<NoteData>(&scope, "nope", NodeType::Stub).await.unwrap_err();
        assert!(matches!(err, HierNoteError::IdNotFound { .. }));
        let err = store.find_by_id::<SchemaData>(&scope, "id-a", NodeType::Stub).await.unwrap_err();
        assert!(matches!(err, HierNoteError::IdNotFound { kind: DataKind::Schema, .. }));
    }

    #[tokio::test]
    async fn test_ingest_parses_and_writes() {
        let store = store();
        let scope = Scope::new("s");
        let vault = VaultRef::new("main");
        let raw = "---\nid: n1\ntitle: Hello\nmyFlag: true\n---\nBody";

        let note = store.ingest(&scope, &vault, "proj.hello", raw, true).await.unwrap();
        assert!(note.content_hash.is_some());

        let got = store.get::<NoteData>(&scope, "proj.hello", NodeType::Stub).await.unwrap();
        let data = got.item.data();
        assert_eq!(data.title, "Hello");
        assert_eq!(data.custom["myFlag"], serde_yaml::Value::Bool(true));
        assert_eq!(data.content_hash, note.content_hash);

        assert!(store.ingest(&scope, &vault, "bad.", raw, false).await.is_err());
    }

    #[tokio::test]
    async fn test_dynamic_api_tags_payload() {
        let store = store();
        let scope = Scope::new("s");
        store.write(&scope, &note_node("a")).await.unwrap();

        let resp = store
            .get_dynamic(&scope, "a", NodeType::Full, DataKind::Note)
            .await
            .unwrap();
        assert!(matches!(resp.item.data(), Payload::Note(_)));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["item"]["data"]["type"], "note");
        assert_eq!(json["nodeType"], "full");

        let root = store.get_root_dynamic(&scope, DataKind::Note).await.unwrap();
        assert_eq!(root.item.logical_id, "a");

        let q = store
            .query_dynamic(&scope, "zzz*", NodeType::Stub, DataKind::Note)
            .await
            .unwrap();
        assert!(q.items.is_empty());
    }
}

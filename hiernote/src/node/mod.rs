// Record model - node stubs, materialized nodes, note and schema payloads

use crate::error::{HierNoteError, Result};
use crate::logical_id::Hierarchy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which tree a record belongs to. Logical ids are unique per kind and scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Note,
    Schema,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Note => "note",
            DataKind::Schema => "schema",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = HierNoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "note" => Ok(DataKind::Note),
            "schema" => Ok(DataKind::Schema),
            other => Err(HierNoteError::Other(format!("unknown data kind '{other}'"))),
        }
    }
}

/// Whether a read returns the bare stub or the node with parent/children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Stub,
    Full,
}

/// Opaque partition key (workspace, user, tenant). Compared by equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(key: impl Into<String>) -> Self {
        Scope(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque storage location a note was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultRef(String);

impl VaultRef {
    pub fn new(name: impl Into<String>) -> Self {
        VaultRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload carried by a node. Implemented by the note and schema data types.
pub trait NodeData: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: DataKind;

    fn title(&self) -> &str;

    fn desc(&self) -> &str;

    /// Structural checks run before a write reaches the backend.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    /// Epoch milliseconds
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// User-defined front matter keys, kept verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_yaml::Value>,
    /// Hash of the source text, when the note was ingested with hashing on
    #[serde(default, rename = "contentHash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl NodeData for NoteData {
    const KIND: DataKind = DataKind::Note;

    fn title(&self) -> &str {
        &self.title
    }

    fn desc(&self) -> &str {
        &self.desc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaKind>,
    /// Alias -> child schema
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, NodeStub<SchemaData>>,
}

/// Fields every schema record must carry.
pub const REQUIRED_SCHEMA_KEYS: [&str; 2] = ["title", "desc"];

impl NodeData for SchemaData {
    const KIND: DataKind = DataKind::Schema;

    fn title(&self) -> &str {
        &self.title
    }

    fn desc(&self) -> &str {
        &self.desc
    }

    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_SCHEMA_KEYS
            .iter()
            .copied()
            .filter(|key| match *key {
                "title" => self.title.trim().is_empty(),
                _ => self.desc.trim().is_empty(),
            })
            .collect();
        if !missing.is_empty() {
            return Err(HierNoteError::Validation(format!(
                "schema is missing required field(s): {}",
                missing.join(", ")
            )));
        }
        if let Some(alias) = self.choices.keys().find(|k| k.trim().is_empty()) {
            return Err(HierNoteError::Validation(format!(
                "schema choice alias '{alias}' must not be blank"
            )));
        }
        Ok(())
    }
}

/// Either payload kind, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Note(NoteData),
    Schema(SchemaData),
}

impl Payload {
    pub fn kind(&self) -> DataKind {
        match self {
            Payload::Note(_) => DataKind::Note,
            Payload::Schema(_) => DataKind::Schema,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Payload::Note(d) => d.title(),
            Payload::Schema(d) => d.title(),
        }
    }

    pub fn desc(&self) -> &str {
        match self {
            Payload::Note(d) => d.desc(),
            Payload::Schema(d) => d.desc(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Payload::Note(d) => d.validate(),
            Payload::Schema(d) => d.validate(),
        }
    }
}

impl From<NoteData> for Payload {
    fn from(data: NoteData) -> Self {
        Payload::Note(data)
    }
}

impl From<SchemaData> for Payload {
    fn from(data: SchemaData) -> Self {
        Payload::Schema(data)
    }
}

/// The persisted unit: identity plus payload. Parent and children are
/// derived at read time and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStub<T> {
    /// Storage-level key
    pub id: String,
    /// Hierarchical key, e.g. `project.foo.bar`
    pub logical_id: String,
    pub data: T,
}

impl<T: NodeData> NodeStub<T> {
    /// Build a stub, checking the logical id under the default hierarchy
    /// rules and the payload's own required fields.
    pub fn new(id: impl Into<String>, logical_id: impl Into<String>, data: T) -> Result<Self> {
        Self::with_hierarchy(&Hierarchy::default(), id, logical_id, data)
    }

    pub fn with_hierarchy(
        hierarchy: &Hierarchy,
        id: impl Into<String>,
        logical_id: impl Into<String>,
        data: T,
    ) -> Result<Self> {
        let stub = NodeStub {
            id: id.into(),
            logical_id: logical_id.into(),
            data,
        };
        stub.validate(hierarchy)?;
        Ok(stub)
    }

    pub fn validate(&self, hierarchy: &Hierarchy) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(HierNoteError::Validation(format!(
                "node '{}' has an empty id",
                self.logical_id
            )));
        }
        hierarchy.validate(&self.logical_id)?;
        self.data.validate()
    }
}

impl<T> NodeStub<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NodeStub<U> {
        NodeStub {
            id: self.id,
            logical_id: self.logical_id,
            data: f(self.data),
        }
    }
}

/// A stub with its derived structure: body, parent stub and direct children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node<T> {
    pub id: String,
    pub logical_id: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// None only for a tree root (or the head of an orphaned subtree)
    pub parent: Option<NodeStub<T>>,
    /// Direct descendants in ascending logical id order
    pub children: Vec<NodeStub<T>>,
}

impl<T: Clone> Node<T> {
    pub fn from_stub(stub: NodeStub<T>, body: Option<String>) -> Self {
        Node {
            id: stub.id,
            logical_id: stub.logical_id,
            data: stub.data,
            body,
            parent: None,
            children: Vec::new(),
        }
    }

    /// A copy of this node's stub. The payload is cloned, so edits to the
    /// returned value never reach the node (or the store).
    pub fn stub(&self) -> NodeStub<T> {
        NodeStub {
            id: self.id.clone(),
            logical_id: self.logical_id.clone(),
            data: self.data.clone(),
        }
    }

    pub fn into_stub(self) -> NodeStub<T> {
        NodeStub {
            id: self.id,
            logical_id: self.logical_id,
            data: self.data,
        }
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> Node<U> {
        Node {
            id: self.id,
            logical_id: self.logical_id,
            data: f(self.data),
            body: self.body,
            parent: self.parent.map(|p| p.map(&f)),
            children: self.children.into_iter().map(|c| c.map(&f)).collect(),
        }
    }
}

/// Result of a single-record read: full node or bare stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRecord<T> {
    Full(Node<T>),
    Stub(NodeStub<T>),
}

impl<T: Clone> NodeRecord<T> {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeRecord::Full(_) => NodeType::Full,
            NodeRecord::Stub(_) => NodeType::Stub,
        }
    }

    pub fn logical_id(&self) -> &str {
        match self {
            NodeRecord::Full(n) => &n.logical_id,
            NodeRecord::Stub(s) => &s.logical_id,
        }
    }

    pub fn data(&self) -> &T {
        match self {
            NodeRecord::Full(n) => &n.data,
            NodeRecord::Stub(s) => &s.data,
        }
    }

    pub fn as_node(&self) -> Option<&Node<T>> {
        match self {
            NodeRecord::Full(n) => Some(n),
            NodeRecord::Stub(_) => None,
        }
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> NodeRecord<U> {
        match self {
            NodeRecord::Full(n) => NodeRecord::Full(n.map(f)),
            NodeRecord::Stub(s) => NodeRecord::Stub(s.map(f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(title: &str) -> NoteData {
        NoteData {
            title: title.into(),
            desc: String::new(),
            created: 0,
            updated: 0,
            tags: Vec::new(),
            custom: BTreeMap::new(),
            content_hash: None,
        }
    }

    fn schema(title: &str, desc: &str) -> SchemaData {
        SchemaData {
            title: title.into(),
            desc: desc.into(),
            aliases: Vec::new(),
            kind: None,
            choices: BTreeMap::new(),
        }
    }

    #[test]
    fn test_note_stub_rejects_bad_logical_id() {
        assert!(NodeStub::new("n1", "", note("A")).is_err());
        assert!(NodeStub::new("n1", "project.", note("A")).is_err());
        assert!(NodeStub::new("n1", "project..foo", note("A")).is_err());
        assert!(NodeStub::new("n1", "project.foo", note("A")).is_ok());
    }

    #[test]
    fn test_note_does_not_require_title_or_desc() {
        assert!(NodeStub::new("n1", "a", note("")).is_ok());
    }

    #[test]
    fn test_schema_requires_title_and_desc() {
        let err = NodeStub::new("s1", "journal", schema("", "")).unwrap_err();
        assert!(err.to_string().contains("title, desc"));
        assert!(NodeStub::new("s1", "journal", schema("Journal", "")).is_err());
        assert!(NodeStub::new("s1", "journal", schema("", "daily")).is_err());
        assert!(NodeStub::new("s1", "journal", schema("Journal", "daily")).is_ok());
    }

    #[test]
    fn test_stub_copy_does_not_alias_node_payload() {
        let node = Node::from_stub(NodeStub::new("n1", "a", note("A")).unwrap(), None);
        let mut copy = node.stub();
        copy.data.title = "changed".into();
        assert_eq!(node.data.title, "A");
    }

    #[test]
    fn test_payload_is_tagged_by_type() {
        let payload = Payload::from(schema("Journal", "daily"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "schema");
        assert_eq!(payload.kind(), DataKind::Schema);

        let back: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_stub_serializes_camel_case() {
        let stub = NodeStub::new("n1", "a.b", note("B")).unwrap();
        let json = serde_json::to_value(&stub).unwrap();
        assert_eq!(json["logicalId"], "a.b");
        assert!(json.get("parent").is_none());
    }
}

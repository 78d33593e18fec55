//! Backing store interface and its implementations.
//!
//! The storage API is written against [`NodeBackend`] alone: a few calls
//! over flat [`RawStub`] records partitioned by scope and data kind. Nothing
//! here knows about parents or children.

mod files;
mod memory;
mod sqlite;

pub use files::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::error::{HierNoteError, Result};
use crate::node::{DataKind, Node, NodeStub, Scope};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A stub as the backend stores it: payload left as JSON so a record that
/// no longer matches its type can still be listed and reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStub {
    pub id: String,
    pub logical_id: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RawStub {
    pub fn from_stub<T: Serialize>(stub: &NodeStub<T>, body: Option<String>) -> Result<Self> {
        Ok(RawStub {
            id: stub.id.clone(),
            logical_id: stub.logical_id.clone(),
            data: serde_json::to_value(&stub.data)?,
            body,
        })
    }

    /// Parent and children are dropped; only identity, payload and body persist.
    pub fn from_node<T: Serialize>(node: &Node<T>) -> Result<Self> {
        Ok(RawStub {
            id: node.id.clone(),
            logical_id: node.logical_id.clone(),
            data: serde_json::to_value(&node.data)?,
            body: node.body.clone(),
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<NodeStub<T>> {
        Ok(NodeStub {
            id: self.id.clone(),
            logical_id: self.logical_id.clone(),
            data: serde_json::from_value(self.data.clone())?,
        })
    }
}

/// Why a record could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Payload or document text is malformed
    Parse,
    /// Logical id or payload breaks the record rules
    Validation,
    Io,
}

/// A record that exists in the backend but could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub logical_id: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl RecordFailure {
    pub fn new(logical_id: impl Into<String>, kind: FailureKind, reason: impl ToString) -> Self {
        RecordFailure {
            logical_id: logical_id.into(),
            kind,
            reason: reason.to_string(),
        }
    }

    pub fn parse(logical_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::new(logical_id, FailureKind::Parse, reason)
    }

    pub fn from_error(logical_id: impl Into<String>, err: &HierNoteError) -> Self {
        let kind = match err {
            HierNoteError::Validation(_) => FailureKind::Validation,
            HierNoteError::Io(_) => FailureKind::Io,
            _ => FailureKind::Parse,
        };
        Self::new(logical_id, kind, err)
    }

    /// The error a single-record read reports for this failure.
    pub fn to_error(&self, data_kind: DataKind) -> HierNoteError {
        let message = format!("{data_kind} '{}': {}", self.logical_id, self.reason);
        match self.kind {
            FailureKind::Parse => HierNoteError::Parse(message),
            FailureKind::Validation => HierNoteError::Validation(message),
            FailureKind::Io => HierNoteError::Other(message),
        }
    }
}

/// Everything a backend holds for one scope and kind at the moment of reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub stubs: BTreeMap<String, RawStub>,
    pub failures: Vec<RecordFailure>,
}

/// Flat keyed storage. Writes to the same logical id are last-write-wins in
/// arrival order; no locking beyond what an implementation needs internally.
#[async_trait]
pub trait NodeBackend: Send + Sync {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot>;

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>>;

    /// Look a record up by its storage-level `id`. The default scans the
    /// partition; backends with an index on `id` override it.
    async fn read_by_id(&self, scope: &Scope, id: &str, kind: DataKind) -> Result<Option<RawStub>> {
        let snapshot = self.read_all(scope, kind).await?;
        Ok(snapshot.stubs.into_values().find(|raw| raw.id == id))
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool>;
}

#[async_trait]
impl<B: NodeBackend + ?Sized> NodeBackend for Box<B> {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot> {
        (**self).read_all(scope, kind).await
    }

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>> {
        (**self).read_one(scope, logical_id, kind).await
    }

    async fn read_by_id(&self, scope: &Scope, id: &str, kind: DataKind) -> Result<Option<RawStub>> {
        (**self).read_by_id(scope, id, kind).await
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()> {
        (**self).upsert(scope, stub, kind).await
    }

    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool> {
        (**self).delete(scope, logical_id, kind).await
    }
}

#[async_trait]
impl<B: NodeBackend + ?Sized> NodeBackend for Arc<B> {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot> {
        (**self).read_all(scope, kind).await
    }

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>> {
        (**self).read_one(scope, logical_id, kind).await
    }

    async fn read_by_id(&self, scope: &Scope, id: &str, kind: DataKind) -> Result<Option<RawStub>> {
        (**self).read_by_id(scope, id, kind).await
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()> {
        (**self).upsert(scope, stub, kind).await
    }

    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool> {
        (**self).delete(scope, logical_id, kind).await
    }
}

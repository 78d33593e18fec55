use super::{NodeBackend, RawStub, Snapshot};
use crate::error::Result;
use crate::node::{DataKind, Scope};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

type Partition = BTreeMap<String, RawStub>;

/// In-process backend. Each (scope, kind) pair is an independent map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<(Scope, DataKind), Partition>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeBackend for MemoryBackend {
    async fn read_all(&self, scope: &Scope, kind: DataKind) -> Result<Snapshot> {
        let partitions = self.partitions.read().await;
        let stubs = partitions
            .get(&(scope.clone(), kind))
            .cloned()
            .unwrap_or_default();
        Ok(Snapshot {
            stubs,
            failures: Vec::new(),
        })
    }

    async fn read_one(
        &self,
        scope: &Scope,
        logical_id: &str,
        kind: DataKind,
    ) -> Result<Option<RawStub>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&(scope.clone(), kind))
            .and_then(|p| p.get(logical_id))
            .cloned())
    }

    async fn upsert(&self, scope: &Scope, stub: RawStub, kind: DataKind) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry((scope.clone(), kind))
            .or_default()
            .insert(stub.logical_id.clone(), stub);
        Ok(())
    }

    async fn delete(&self, scope: &Scope, logical_id: &str, kind: DataKind) -> Result<bool> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .get_mut(&(scope.clone(), kind))
            .map(|p| p.remove(logical_id).is_some())
            .unwrap_or(false))
    }
}

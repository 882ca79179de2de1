//! The external memory store the engine applies winning operations to.
//!
//! The engine never interprets records beyond what is needed to apply an
//! operation; memory identifiers stay opaque.

use async_trait::async_trait;
use concord_core::{
    AgentId, ConcordError, ConcordResult, EntityId, OperationKind, StorageError, SyncOperation,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// A memory record as last written by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: String,
    pub content: Option<String>,
    pub tags: BTreeSet<String>,
    pub importance: f64,
    /// Incremented on every applied mutation
    pub version: u64,
    pub last_writer: AgentId,
    /// Agents whose writes produced the current content
    pub sources: Vec<AgentId>,
    pub last_operation_id: EntityId,
    pub updated_at: Timestamp,
    /// Tombstone left by a delete
    pub deleted: bool,
}

/// Write side of the memory store.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Apply an operation and return the record as it stands afterwards.
    ///
    /// Reads return the current record without changing it.
    async fn apply(&self, operation: &SyncOperation) -> ConcordResult<Option<MemoryRecord>>;

    /// Current record for a memory identifier, tombstones included.
    async fn get(&self, memory_id: &str) -> ConcordResult<Option<MemoryRecord>>;
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// In-process memory store, used by the server binary and by tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, tombstones included.
    pub fn record_count(&self) -> ConcordResult<usize> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.len())
    }
}

fn poisoned() -> ConcordError {
    ConcordError::Storage(StorageError::LockPoisoned)
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn apply(&self, operation: &SyncOperation) -> ConcordResult<Option<MemoryRecord>> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        match operation.kind {
            OperationKind::Read => Ok(records.get(&operation.memory_id).cloned()),
            OperationKind::Delete => {
                let Some(record) = records.get_mut(&operation.memory_id) else {
                    return Ok(None);
                };
                record.content = None;
                record.deleted = true;
                record.version += 1;
                record.last_writer = operation.agent_id;
                record.sources = operation.sources.clone();
                record.last_operation_id = operation.operation_id;
                record.updated_at = operation.updated_at;
                Ok(Some(record.clone()))
            }
            OperationKind::Create | OperationKind::Update => {
                let version = records
                    .get(&operation.memory_id)
                    .map(|r| r.version + 1)
                    .unwrap_or(1);
                let record = MemoryRecord {
                    memory_id: operation.memory_id.clone(),
                    content: operation.content.clone(),
                    tags: operation.tags.clone(),
                    importance: operation.importance,
                    version,
                    last_writer: operation.agent_id,
                    sources: operation.sources.clone(),
                    last_operation_id: operation.operation_id,
                    updated_at: operation.updated_at,
                    deleted: false,
                };
                records.insert(operation.memory_id.clone(), record.clone());
                Ok(Some(record))
            }
        }
    }

    async fn get(&self, memory_id: &str) -> ConcordResult<Option<MemoryRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(memory_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(agent: AgentId, content: &str) -> SyncOperation {
        SyncOperation::new(agent, "mem-1", OperationKind::Update).with_content(content)
    }

    #[tokio::test]
    async fn test_apply_update_bumps_version() {
        let backend = InMemoryBackend::new();
        let first = backend
            .apply(&update(AgentId::Primary, "one"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.version, 1);
        let second = backend
            .apply(&update(AgentId::Analysis, "two"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.last_writer, AgentId::Analysis);
        assert_eq!(second.content.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let backend = InMemoryBackend::new();
        backend.apply(&update(AgentId::Primary, "one")).await.unwrap();
        let delete = SyncOperation::new(AgentId::Security, "mem-1", OperationKind::Delete);
        let record = backend.apply(&delete).await.unwrap().unwrap();
        assert!(record.deleted);
        assert_eq!(record.content, None);
        assert_eq!(record.version, 2);
        assert_eq!(backend.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_missing_record_is_noop() {
        let backend = InMemoryBackend::new();
        let delete = SyncOperation::new(AgentId::Security, "ghost", OperationKind::Delete);
        assert_eq!(backend.apply(&delete).await.unwrap(), None);
        assert_eq!(backend.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_does_not_mutate() {
        let backend = InMemoryBackend::new();
        backend.apply(&update(AgentId::Primary, "one")).await.unwrap();
        let read = SyncOperation::new(AgentId::Persona, "mem-1", OperationKind::Read);
        let record = backend.apply(&read).await.unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.last_writer, AgentId::Primary);
    }
}

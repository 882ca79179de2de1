//! Conflict detection over the table of in-flight sync operations.
//!
//! The table keeps every active operation by id plus an index from memory id
//! to the operation currently owning that memory id. A new operation either
//! claims the memory id or is told which in-flight operation it collides with.

use concord_core::{EntityId, SyncOperation, SyncStatus, Timestamp};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
struct ActiveEntry {
    operation: SyncOperation,
    /// Set when a conflicting operation won and took over the memory id
    superseded: bool,
}

/// Active-operations table with a memory id index.
#[derive(Debug, Default)]
pub struct ActiveOperations {
    operations: DashMap<EntityId, ActiveEntry>,
    by_memory: DashMap<String, EntityId>,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-flight operation currently owning `memory_id`, if any.
    pub fn find_in_flight(&self, memory_id: &str) -> Option<SyncOperation> {
        let operation_id = *self.by_memory.get(memory_id)?;
        self.live_operation(operation_id)
    }

    fn live_operation(&self, operation_id: EntityId) -> Option<SyncOperation> {
        let entry = self.operations.get(&operation_id)?;
        (entry.operation.is_in_flight() && !entry.superseded).then(|| entry.operation.clone())
    }

    /// Register `operation` as the owner of its memory id.
    ///
    /// Check and registration happen under one index entry lock, so two
    /// operations racing for the same memory id cannot both claim it.
    /// On collision the operation is not registered and the in-flight one is
    /// returned.
    pub fn claim(&self, operation: SyncOperation) -> Result<(), SyncOperation> {
        match self.by_memory.entry(operation.memory_id.clone()) {
            Entry::Occupied(mut indexed) => {
                if let Some(existing) = self.live_operation(*indexed.get()) {
                    return Err(existing);
                }
                indexed.insert(operation.operation_id);
            }
            Entry::Vacant(slot) => {
                slot.insert(operation.operation_id);
            }
        }
        self.insert(operation);
        Ok(())
    }

    fn insert(&self, operation: SyncOperation) {
        self.operations.insert(
            operation.operation_id,
            ActiveEntry {
                operation,
                superseded: false,
            },
        );
    }

    /// Hand the memory id of `existing_id` over to the operation that beat it.
    ///
    /// The index is only redirected while it still points at `existing_id`
    /// (or at nothing); an operation that claimed the memory id in between
    /// keeps it.
    pub fn hand_over(&self, existing_id: EntityId, mut winner: SyncOperation) {
        if let Some(mut entry) = self.operations.get_mut(&existing_id) {
            entry.superseded = true;
        }
        winner.set_status(SyncStatus::Processing);
        let memory_id = winner.memory_id.clone();
        let winner_id = winner.operation_id;
        self.insert(winner);
        match self.by_memory.entry(memory_id) {
            Entry::Occupied(mut indexed) if *indexed.get() == existing_id => {
                indexed.insert(winner_id);
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(winner_id);
            }
        }
    }

    /// Install `operation` as owner of its memory id, superseding whichever
    /// operation currently owns it. Returns the superseded operation id.
    pub fn take_over(&self, operation: SyncOperation) -> Option<EntityId> {
        let current = self
            .by_memory
            .get(&operation.memory_id)
            .map(|owner| *owner)
            .filter(|owner| *owner != operation.operation_id);
        match current {
            Some(owner) => self.hand_over(owner, operation),
            None => {
                let mut operation = operation;
                operation.set_status(SyncStatus::Processing);
                let memory_id = operation.memory_id.clone();
                let operation_id = operation.operation_id;
                self.insert(operation);
                self.by_memory.insert(memory_id, operation_id);
            }
        }
        current
    }

    /// Whether another operation won a conflict against `operation_id`.
    pub fn is_superseded(&self, operation_id: EntityId) -> bool {
        self.operations
            .get(&operation_id)
            .is_some_and(|entry| entry.superseded)
    }

    pub fn set_status(&self, operation_id: EntityId, status: SyncStatus) {
        if let Some(mut entry) = self.operations.get_mut(&operation_id) {
            entry.operation.set_status(status);
        }
    }

    pub fn get(&self, operation_id: EntityId) -> Option<SyncOperation> {
        self.operations
            .get(&operation_id)
            .map(|entry| entry.operation.clone())
    }

    /// Evict an operation with its final status and return it.
    pub fn finish(&self, operation_id: EntityId, status: SyncStatus) -> Option<SyncOperation> {
        let (_, mut entry) = self.operations.remove(&operation_id)?;
        entry.operation.set_status(status);
        self.by_memory
            .remove_if(&entry.operation.memory_id, |_, owner| *owner == operation_id);
        Some(entry.operation)
    }

    /// Evict operations older than `ttl` as failed and return them.
    pub fn evict_abandoned(&self, now: Timestamp, ttl: Duration) -> Vec<SyncOperation> {
        let abandoned: Vec<EntityId> = self
            .operations
            .iter()
            .filter(|entry| entry.operation.age(now) > ttl)
            .map(|entry| *entry.key())
            .collect();

        abandoned
            .into_iter()
            .filter_map(|operation_id| self.finish(operation_id, SyncStatus::Failed))
            .collect()
    }

    /// Number of operations in the table.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Snapshot of every active operation, oldest first.
    pub fn list(&self) -> Vec<SyncOperation> {
        let mut operations: Vec<SyncOperation> = self
            .operations
            .iter()
            .map(|entry| entry.operation.clone())
            .collect();
        operations.sort_by_key(|op| op.timestamp);
        operations
    }
}

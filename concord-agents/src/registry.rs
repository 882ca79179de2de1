//! Conflict registry and bounded operation history.
//!
//! Open conflicts live in an indexed table until resolved. Resolved conflicts
//! and finished operations are appended to bounded ring buffers so recent
//! outcomes stay queryable without growing without limit.

use chrono::Utc;
use concord_core::{
    AgentId, Conflict, ConflictKind, ConflictStatus, EntityId, PolicyKind, SyncOperation,
    Timestamp,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Append-only record with a fixed capacity; the oldest entry is dropped first.
#[derive(Debug)]
struct Ring<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    fn push(&self, entry: T) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entry matching `predicate`.
    fn find_latest(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().find(|e| predicate(e)).cloned()
    }

    /// Up to `limit` entries, newest first.
    fn latest(&self, limit: usize) -> Vec<T> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().rev().take(limit).cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// CONFLICT SUMMARY
// ============================================================================

/// Listing view of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ConflictSummary {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conflict_id: EntityId,
    pub memory_id: String,
    pub agents: Vec<AgentId>,
    pub strategy: PolicyKind,
    pub kind: ConflictKind,
    pub status: ConflictStatus,
    pub age_ms: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub detected_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
}

impl ConflictSummary {
    pub fn from_conflict(conflict: &Conflict, now: Timestamp) -> Self {
        Self {
            conflict_id: conflict.conflict_id,
            memory_id: conflict.memory_id.clone(),
            agents: conflict.agents(),
            strategy: conflict.strategy,
            kind: conflict.kind,
            status: conflict.status,
            age_ms: conflict.age(now).as_millis() as u64,
            detected_at: conflict.detected_at,
            review_reason: conflict.review_reason.clone(),
        }
    }
}

// ============================================================================
// CONFLICT REGISTRY
// ============================================================================

/// Open conflicts plus a bounded record of resolved ones.
#[derive(Debug)]
pub struct ConflictRegistry {
    open: DashMap<EntityId, Conflict>,
    resolved: Ring<Conflict>,
}

impl ConflictRegistry {
    pub fn new(resolved_capacity: usize) -> Self {
        Self {
            open: DashMap::new(),
            resolved: Ring::new(resolved_capacity),
        }
    }

    pub fn insert(&self, conflict: Conflict) {
        self.open.insert(conflict.conflict_id, conflict);
    }

    /// Open or resolved conflict by id.
    pub fn get(&self, conflict_id: EntityId) -> Option<Conflict> {
        if let Some(conflict) = self.open.get(&conflict_id) {
            return Some(conflict.clone());
        }
        self.resolved.find_latest(|c| c.conflict_id == conflict_id)
    }

    /// Apply `update` to an open conflict in place.
    pub fn update<R>(&self, conflict_id: EntityId, update: impl FnOnce(&mut Conflict) -> R) -> Option<R> {
        self.open
            .get_mut(&conflict_id)
            .map(|mut conflict| update(&mut conflict))
    }

    /// Move a resolved conflict out of the open table into the record.
    pub fn archive(&self, conflict_id: EntityId) -> Option<Conflict> {
        let (_, conflict) = self
            .open
            .remove_if(&conflict_id, |_, c| c.status == ConflictStatus::Resolved)?;
        self.resolved.push(conflict.clone());
        Some(conflict)
    }

    /// Open conflicts, oldest first.
    pub fn list_open(&self) -> Vec<ConflictSummary> {
        let now = Utc::now();
        let mut summaries: Vec<ConflictSummary> = self
            .open
            .iter()
            .map(|entry| ConflictSummary::from_conflict(entry.value(), now))
            .collect();
        summaries.sort_by_key(|s| s.detected_at);
        summaries
    }

    /// Recently resolved conflicts, newest first.
    pub fn recent_resolved(&self, limit: usize) -> Vec<Conflict> {
        self.resolved.latest(limit)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

// ============================================================================
// OPERATION HISTORY
// ============================================================================

/// Bounded record of finished operations, for status lookups.
#[derive(Debug)]
pub struct OperationHistory {
    finished: Ring<SyncOperation>,
}

impl OperationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            finished: Ring::new(capacity),
        }
    }

    pub fn record(&self, operation: SyncOperation) {
        self.finished.push(operation);
    }

    pub fn get(&self, operation_id: EntityId) -> Option<SyncOperation> {
        self.finished.find_latest(|op| op.operation_id == operation_id)
    }

    /// Most recent finished operations, newest first.
    pub fn recent(&self, limit: usize) -> Vec<SyncOperation> {
        self.finished.latest(limit)
    }

    pub fn len(&self) -> usize {
        self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{OperationKind, ResolutionResult, SyncStatus, Winner};

    fn conflict() -> Conflict {
        Conflict::detect(
            SyncOperation::new(AgentId::Primary, "m", OperationKind::Update).with_content("a"),
            SyncOperation::new(AgentId::Persona, "m", OperationKind::Update).with_content("b"),
        )
    }

    #[test]
    fn test_archive_requires_resolution() {
        let registry = ConflictRegistry::new(10);
        let conflict = conflict();
        let id = conflict.conflict_id;
        registry.insert(conflict);

        assert!(registry.archive(id).is_none());
        assert_eq!(registry.open_count(), 1);

        registry.update(id, |c| {
            c.resolve(ResolutionResult::automatic(
                Winner::Existing,
                PolicyKind::AgentPriority,
                "agent_priority",
            ))
        });
        assert!(registry.archive(id).is_some());
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.resolved_count(), 1);
        assert_eq!(registry.get(id).unwrap().status, ConflictStatus::Resolved);
    }

    #[test]
    fn test_list_open_summaries() {
        let registry = ConflictRegistry::new(10);
        let conflict = conflict();
        registry.insert(conflict.clone());
        let listed = registry.list_open();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].conflict_id, conflict.conflict_id);
        assert_eq!(listed[0].agents, vec![AgentId::Primary, AgentId::Persona]);
        assert_eq!(listed[0].kind, ConflictKind::Content);
        assert_eq!(listed[0].status, ConflictStatus::Pending);
    }

    #[test]
    fn test_history_is_bounded() {
        let history = OperationHistory::new(2);
        let ops: Vec<SyncOperation> = (0..3)
            .map(|i| {
                let mut op = SyncOperation::new(AgentId::Analysis, format!("m{}", i), OperationKind::Read);
                op.set_status(SyncStatus::Completed);
                op
            })
            .collect();
        for op in &ops {
            history.record(op.clone());
        }
        assert_eq!(history.len(), 2);
        assert!(history.get(ops[0].operation_id).is_none());
        assert!(history.get(ops[2].operation_id).is_some());
        let recent = history.recent(5);
        assert_eq!(recent[0].operation_id, ops[2].operation_id);
    }
}

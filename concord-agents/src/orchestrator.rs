//! Sync orchestrator: the entry point tying detection, locking, resolution
//! and application together for each request.
//!
//! # Flow per request
//!
//! ```text
//! received → validated → conflict check
//!     ├─ no conflict: lock → apply → unlock → completed
//!     └─ conflict:    resolve → existing wins: incoming conflicted
//!                             → new/merged wins: take over → lock → apply → unlock → completed
//! ```
//!
//! A lock is released on every path after it has been acquired. Contested
//! locks are retried a bounded number of times with exponential backoff and
//! then reported as `lock_unavailable`.

use crate::detector::ActiveOperations;
use crate::lock_manager::LockManager;
use crate::merge::MergeEngine;
use crate::metrics::{Gauges, MetricsSnapshot, SyncMetrics};
use crate::policy::PolicyChain;
use crate::registry::{ConflictRegistry, ConflictSummary, OperationHistory};
use chrono::Utc;
use concord_core::{
    Acquired, ConcordError, ConcordResult, Conflict, ConflictError, EngineConfig, EntityId, Lock,
    LockData, LockError, ManualStrategy, PolicyKind, ResolutionResult, SyncOperation,
    SyncRequest, SyncStatus, ValidationError, Winner,
};
use concord_storage::{LockStore, MemoryBackend, MemoryRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

// ============================================================================
// OUTCOMES & INPUTS
// ============================================================================

/// Result of a processed sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub sync_id: EntityId,
    pub status: SyncStatus,
    /// Whether the operation (or its merge) was written to the memory store
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub conflict_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub record: Option<MemoryRecord>,
    pub duration_ms: u64,
}

/// Caller input for the `manual_review` strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ManualResolution {
    /// Side to keep when no content is supplied
    #[serde(default)]
    pub winner: Option<Winner>,
    /// Final content; produces a merged record carrying both agents
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Everything currently tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SyncStatistics {
    pub active_locks: Vec<LockData>,
    pub active_operations: Vec<SyncOperation>,
    pub open_conflicts: Vec<ConflictSummary>,
    pub recent_operations: Vec<SyncOperation>,
    pub recent_resolutions: Vec<Conflict>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Coordinates concurrent writes to shared memory records.
pub struct SyncOrchestrator {
    config: Arc<EngineConfig>,
    locks: LockManager,
    active: ActiveOperations,
    chain: PolicyChain,
    merge: MergeEngine,
    conflicts: ConflictRegistry,
    history: OperationHistory,
    metrics: Arc<SyncMetrics>,
    backend: Arc<dyn MemoryBackend>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("locks", &self.locks)
            .field("chain", &self.chain)
            .field("active", &self.active.len())
            .field("open_conflicts", &self.conflicts.open_count())
            .finish()
    }
}

impl SyncOrchestrator {
    /// Build an orchestrator after validating `config`.
    pub fn new(
        config: EngineConfig,
        lock_store: Arc<dyn LockStore>,
        backend: Arc<dyn MemoryBackend>,
    ) -> ConcordResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = Arc::new(SyncMetrics::new());
        let resolver = Arc::new(config.resolver.clone());

        Ok(Self {
            locks: LockManager::new(lock_store, config.lock.ttl, Arc::clone(&metrics)),
            active: ActiveOperations::new(),
            chain: PolicyChain::standard(Arc::clone(&resolver)),
            merge: MergeEngine::new(resolver.similarity_threshold, resolver.min_length_ratio),
            conflicts: ConflictRegistry::new(config.limits.resolved_capacity),
            history: OperationHistory::new(config.limits.history_capacity),
            metrics,
            backend,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    // ------------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------------

    /// Validate and process one sync request.
    pub async fn submit(&self, request: &SyncRequest) -> ConcordResult<SyncOutcome> {
        let started = Instant::now();
        let operation = self.validate(request)?;

        let span = info_span!(
            "sync",
            sync_id = %operation.operation_id,
            memory_id = %operation.memory_id,
            agent = %operation.agent_id,
            kind = %operation.kind,
        );

        async move {
            match self.active.claim(operation.clone()) {
                Ok(()) => self.execute(operation, started, None).await,
                Err(existing) => self.resolve_conflict(operation, existing, started).await,
            }
        }
        .instrument(span)
        .await
    }

    fn validate(&self, request: &SyncRequest) -> ConcordResult<SyncOperation> {
        match SyncOperation::from_request(request) {
            Ok(operation) => {
                self.metrics.record_received(operation.agent_id);
                Ok(operation)
            }
            Err(err) => {
                self.metrics.record_rejected();
                debug!(error = %err, "sync request rejected");
                Err(err.into())
            }
        }
    }

    /// Resolve a freshly detected conflict through the policy chain.
    async fn resolve_conflict(
        &self,
        incoming: SyncOperation,
        existing: SyncOperation,
        started: Instant,
    ) -> ConcordResult<SyncOutcome> {
        self.metrics.record_conflict_detected();
        let conflict = Conflict::detect(existing.clone(), incoming.clone());
        let conflict_id = conflict.conflict_id;
        info!(
            conflict_id = %conflict_id,
            existing_sync_id = %existing.operation_id,
            existing_agent = %existing.agent_id,
            conflict_kind = %conflict.kind,
            "conflict detected"
        );
        self.conflicts.insert(conflict);

        let outcome = match self.chain.resolve(&incoming, &existing) {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = err.to_string();
                self.conflicts
                    .update(conflict_id, |c| c.escalate(reason.clone()));
                self.metrics.record_manual_review();
                let mut parked = incoming;
                parked.set_status(SyncStatus::Conflicted);
                let sync_id = parked.operation_id;
                self.history.record(parked);
                warn!(conflict_id = %conflict_id, reason = %reason, "conflict routed to manual review");
                return Err(ConflictError::Unresolved {
                    conflict_id,
                    sync_id,
                    reason,
                }
                .into());
            }
        };

        if outcome.merge_failed {
            self.metrics.record_merge_failure();
        }
        self.conclude(conflict_id, &existing, incoming, outcome.result, started)
            .await
    }

    /// Record a resolution and carry out its winner.
    async fn conclude(
        &self,
        conflict_id: EntityId,
        existing: &SyncOperation,
        incoming: SyncOperation,
        result: ResolutionResult,
        started: Instant,
    ) -> ConcordResult<SyncOutcome> {
        let winner = match result.winner {
            Winner::Existing => None,
            Winner::New => Some(incoming.clone()),
            Winner::Merged => {
                let content = result
                    .merged_content
                    .clone()
                    .ok_or(concord_core::MergeError::EmptyOutput)?;
                Some(SyncOperation::merged(existing, &incoming, content))
            }
        };

        let claimed = self
            .conflicts
            .update(conflict_id, |c| {
                if c.is_open() {
                    c.resolve(result.clone());
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if !claimed {
            return Err(ConflictError::AlreadyResolved { conflict_id }.into());
        }

        let latency = self
            .conflicts
            .archive(conflict_id)
            .and_then(|c| c.resolution_latency())
            .unwrap_or_default();
        self.metrics.record_resolution(result.policy, latency);
        info!(
            conflict_id = %conflict_id,
            policy = %result.policy,
            winner = %result.winner,
            reason = %result.reason,
            "conflict resolved"
        );

        match winner {
            None => {
                let mut rejected = incoming;
                rejected.set_status(SyncStatus::Conflicted);
                let sync_id = rejected.operation_id;
                self.history.record(rejected);
                Ok(SyncOutcome {
                    sync_id,
                    status: SyncStatus::Conflicted,
                    applied: false,
                    result: Some(result),
                    conflict_id: Some(conflict_id),
                    record: None,
                    duration_ms: elapsed_ms(started),
                })
            }
            Some(operation) => {
                self.active.hand_over(existing.operation_id, operation.clone());
                self.execute(operation, started, Some((conflict_id, result)))
                    .await
            }
        }
    }

    /// Lock, apply and unlock an operation that owns its memory id.
    async fn execute(
        &self,
        operation: SyncOperation,
        started: Instant,
        resolution: Option<(EntityId, ResolutionResult)>,
    ) -> ConcordResult<SyncOutcome> {
        let sync_id = operation.operation_id;
        let (conflict_id, result) = match resolution {
            Some((id, result)) => (Some(id), Some(result)),
            None => (None, None),
        };
        self.active.set_status(sync_id, SyncStatus::Processing);

        let lock = match self.acquire_with_retry(&operation).await {
            Ok(lock) => lock,
            Err(err) => {
                self.finish(sync_id, SyncStatus::Failed);
                self.metrics.record_failed();
                warn!(error = %err, "sync failed, memory lock unavailable");
                return Err(err);
            }
        };

        if self.active.is_superseded(sync_id) {
            self.locks.release_lock(lock).await;
            self.finish(sync_id, SyncStatus::Conflicted);
            info!("sync superseded by a conflicting operation, not applied");
            return Ok(SyncOutcome {
                sync_id,
                status: SyncStatus::Conflicted,
                applied: false,
                result,
                conflict_id,
                record: None,
                duration_ms: elapsed_ms(started),
            });
        }

        let applied = self.backend.apply(&operation).await;
        self.locks.release_lock(lock).await;

        match applied {
            Ok(record) => {
                self.finish(sync_id, SyncStatus::Completed);
                self.metrics.record_completed(started.elapsed());
                debug!("sync completed");
                Ok(SyncOutcome {
                    sync_id,
                    status: SyncStatus::Completed,
                    applied: operation.kind.is_mutation(),
                    result,
                    conflict_id,
                    record,
                    duration_ms: elapsed_ms(started),
                })
            }
            Err(err) => {
                self.finish(sync_id, SyncStatus::Failed);
                self.metrics.record_failed();
                warn!(error = %err, "sync failed while applying");
                Err(err)
            }
        }
    }

    async fn acquire_with_retry(&self, operation: &SyncOperation) -> ConcordResult<Lock<Acquired>> {
        let attempts = self.config.lock.max_attempts;
        for attempt in 0..attempts {
            if let Some(lock) = self
                .locks
                .try_acquire(&operation.memory_id, operation.agent_id, operation.operation_id)
                .await
            {
                return Ok(lock);
            }
            if attempt + 1 < attempts {
                let delay = self.config.lock.backoff_for(attempt);
                self.metrics.record_lock_retry();
                debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "memory lock busy, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        self.metrics.record_lock_failure();
        Err(LockError::Unavailable {
            memory_id: operation.memory_id.clone(),
            sync_id: operation.operation_id,
            attempts,
        }
        .into())
    }

    fn finish(&self, sync_id: EntityId, status: SyncStatus) {
        if let Some(operation) = self.active.finish(sync_id, status) {
            self.history.record(operation);
        }
    }

    // ------------------------------------------------------------------------
    // Manual resolution & administration
    // ------------------------------------------------------------------------

    /// Resolve an open conflict with a caller-chosen strategy.
    pub async fn resolve_manually(
        &self,
        conflict_id: EntityId,
        strategy: ManualStrategy,
        resolution: ManualResolution,
    ) -> ConcordResult<SyncOutcome> {
        let started = Instant::now();
        let conflict = self
            .conflicts
            .get(conflict_id)
            .ok_or(ConflictError::NotFound { conflict_id })?;
        if !conflict.is_open() {
            return Err(ConflictError::AlreadyResolved { conflict_id }.into());
        }

        let result = self.manual_result(&conflict, strategy, &resolution)?;
        info!(conflict_id = %conflict_id, strategy = %strategy, winner = %result.winner, "manual resolution");
        self.conclude(
            conflict_id,
            &conflict.existing,
            conflict.incoming.clone(),
            result,
            started,
        )
        .await
    }

    fn manual_result(
        &self,
        conflict: &Conflict,
        strategy: ManualStrategy,
        resolution: &ManualResolution,
    ) -> ConcordResult<ResolutionResult> {
        let existing = &conflict.existing;
        let incoming = &conflict.incoming;
        let pick = |incoming_wins: bool| {
            if incoming_wins {
                Winner::New
            } else {
                Winner::Existing
            }
        };

        let result = match strategy {
            ManualStrategy::LatestWins => ResolutionResult::manual(
                pick(incoming.timestamp > existing.timestamp),
                "latest_wins",
            ),
            ManualStrategy::HighestImportance => ResolutionResult::manual(
                pick(incoming.importance > existing.importance),
                "highest_importance",
            ),
            ManualStrategy::AgentPriority => {
                let priorities = &self.config.resolver.priorities;
                ResolutionResult::manual(
                    pick(priorities.priority(incoming.agent_id) < priorities.priority(existing.agent_id)),
                    "agent_priority",
                )
            }
            ManualStrategy::MergeContent => {
                let merged = self.merge.merge(existing.content_str(), incoming.content_str())?;
                ResolutionResult::manual(Winner::Merged, "merge_content").with_merged_content(merged)
            }
            ManualStrategy::ManualReview => match (&resolution.content, resolution.winner) {
                (Some(content), _) if !content.trim().is_empty() => {
                    ResolutionResult::manual(Winner::Merged, "manual_review")
                        .with_merged_content(content.trim())
                }
                (_, Some(winner)) if winner != Winner::Merged => {
                    ResolutionResult::manual(winner, "manual_review")
                }
                _ => {
                    return Err(ValidationError::RequiredFieldMissing {
                        field: "resolution.content or resolution.winner".to_string(),
                    }
                    .into())
                }
            },
        };

        let mut result = result.with_metadata("strategy", strategy.as_str());
        if let Some(reason) = &resolution.reason {
            result = result.with_metadata("note", reason.as_str());
        }
        Ok(result)
    }

    /// Apply an operation immediately, clearing any lock on its memory id and
    /// superseding whatever operation is in flight there. Recovery tool only.
    pub async fn force_sync(
        &self,
        request: &SyncRequest,
        priority: Option<i32>,
    ) -> ConcordResult<SyncOutcome> {
        let started = Instant::now();
        let mut operation = self.validate(request)?;
        if let Some(priority) = priority {
            operation = operation.with_priority_override(priority);
        }

        let span = info_span!(
            "force_sync",
            sync_id = %operation.operation_id,
            memory_id = %operation.memory_id,
            agent = %operation.agent_id,
        );

        async move {
            let cleared = self.locks.force_release(&operation.memory_id).await?;
            let superseded = self.active.take_over(operation.clone());
            warn!(
                lock_cleared = cleared,
                superseded = ?superseded,
                priority = ?operation.priority_override,
                "force sync"
            );
            self.execute(operation, started, None).await
        }
        .instrument(span)
        .await
    }

    /// Evict operations abandoned past the operation TTL. Returns how many.
    pub fn sweep_expired(&self) -> usize {
        let evicted = self
            .active
            .evict_abandoned(Utc::now(), self.config.limits.operation_ttl);
        let count = evicted.len();
        for operation in evicted {
            warn!(sync_id = %operation.operation_id, memory_id = %operation.memory_id, "abandoned sync evicted");
            self.history.record(operation);
        }
        if count > 0 {
            self.metrics.record_abandoned(count as u64);
        }
        count
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Current state of a sync operation, in flight or recently finished.
    pub fn sync_status(&self, sync_id: EntityId) -> ConcordResult<SyncOperation> {
        self.active
            .get(sync_id)
            .or_else(|| self.history.get(sync_id))
            .ok_or(ConcordError::SyncNotFound { sync_id })
    }

    pub fn conflict(&self, conflict_id: EntityId) -> ConcordResult<Conflict> {
        self.conflicts
            .get(conflict_id)
            .ok_or_else(|| ConflictError::NotFound { conflict_id }.into())
    }

    /// Conflicts awaiting resolution, oldest first.
    pub fn list_active_conflicts(&self) -> Vec<ConflictSummary> {
        self.conflicts.list_open()
    }

    pub fn active_operation_count(&self) -> usize {
        self.active.len()
    }

    /// Aggregate metrics with the current table sizes.
    pub async fn metrics(&self) -> MetricsSnapshot {
        let active_locks = match self.locks.active_locks().await {
            Ok(locks) => locks.len() as u64,
            Err(err) => {
                warn!(error = %err, "could not count active locks");
                0
            }
        };
        self.metrics.snapshot(Gauges {
            conflicts_pending: self.conflicts.open_count() as u64,
            active_operations: self.active.len() as u64,
            active_locks,
        })
    }

    /// Detailed view of locks, operations and conflicts.
    pub async fn statistics(&self, recent_limit: usize) -> ConcordResult<SyncStatistics> {
        Ok(SyncStatistics {
            active_locks: self.locks.active_locks().await?,
            active_operations: self.active.list(),
            open_conflicts: self.conflicts.list_open(),
            recent_operations: self.history.recent(recent_limit),
            recent_resolutions: self.conflicts.recent_resolved(recent_limit),
        })
    }

    /// Readiness: the lock store answers.
    pub async fn ready(&self) -> ConcordResult<()> {
        self.locks.ping().await
    }

    pub fn policy_hits(&self, policy: PolicyKind) -> u64 {
        self.metrics.policy_hits(policy)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{AgentId, ConflictStatus, OperationKind};
    use concord_storage::{InMemoryBackend, InMemoryLockStore};

    fn orchestrator() -> (SyncOrchestrator, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let engine = SyncOrchestrator::new(
            EngineConfig::default(),
            Arc::new(InMemoryLockStore::new()),
            backend.clone(),
        )
        .unwrap();
        (engine, backend)
    }

    fn request(agent: &str, memory_id: &str, content: &str) -> SyncRequest {
        SyncRequest {
            agent_id: agent.to_string(),
            memory_id: memory_id.to_string(),
            operation: "update".to_string(),
            content: Some(content.to_string()),
            ..SyncRequest::default()
        }
    }

    #[tokio::test]
    async fn test_submit_without_conflict_applies_and_releases() {
        let (engine, backend) = orchestrator();
        let outcome = engine
            .submit(&request("primary-agent", "m", "Hello."))
            .await
            .unwrap();
        assert_eq!(outcome.status, SyncStatus::Completed);
        assert!(outcome.applied);
        assert!(outcome.conflict_id.is_none());

        let record = backend.get("m").await.unwrap().unwrap();
        assert_eq!(record.content.as_deref(), Some("Hello."));
        assert!(engine.lock_manager().holder("m").await.unwrap().is_none());
        assert_eq!(engine.active_operation_count(), 0);

        let status = engine.sync_status(outcome.sync_id).unwrap();
        assert_eq!(status.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_validation_error_has_no_side_effects() {
        let (engine, _) = orchestrator();
        let err = engine
            .submit(&request("rogue-agent", "m", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let metrics = engine.metrics().await;
        assert_eq!(metrics.total_syncs, 0);
        assert_eq!(metrics.syncs_rejected, 1);
        assert_eq!(metrics.locks_acquired, 0);
    }

    #[tokio::test]
    async fn test_conflict_with_in_flight_operation_is_resolved() {
        let (engine, _) = orchestrator();
        // Park an in-flight persona write on the memory id.
        let existing = SyncOperation::new(AgentId::Persona, "m", OperationKind::Update)
            .with_content("Casual tone.");
        engine.active.claim(existing.clone()).unwrap();

        let outcome = engine
            .submit(&request("security-agent", "m", "Formal tone."))
            .await
            .unwrap();
        let result = outcome.result.clone().unwrap();
        assert_eq!(result.policy, PolicyKind::AgentPriority);
        assert_eq!(result.winner, Winner::New);
        assert!(outcome.conflict_id.is_some());
        assert_eq!(outcome.status, SyncStatus::Completed);
        assert!(engine.active.is_superseded(existing.operation_id));

        let metrics = engine.metrics().await;
        assert_eq!(metrics.conflicts_detected, 1);
        assert_eq!(metrics.conflicts_resolved, 1);
        assert_eq!(metrics.conflicts_pending, 0);
        assert_eq!(metrics.per_policy["agent_priority"], 1);
    }

    #[tokio::test]
    async fn test_existing_winner_rejects_incoming() {
        let (engine, backend) = orchestrator();
        let existing = SyncOperation::new(AgentId::Security, "m", OperationKind::Update)
            .with_tags(["security_incident"]);
        engine.active.claim(existing).unwrap();

        let outcome = engine
            .submit(&request("primary-agent", "m", "Overwrite."))
            .await
            .unwrap();
        assert_eq!(outcome.status, SyncStatus::Conflicted);
        assert!(!outcome.applied);
        assert_eq!(outcome.result.unwrap().reason, "security_protection");
        assert!(backend.get("m").await.unwrap().is_none());
        assert_eq!(
            engine.sync_status(outcome.sync_id).unwrap().status,
            SyncStatus::Conflicted
        );
    }

    #[tokio::test]
    async fn test_malformed_existing_routes_to_manual_review() {
        let (engine, _) = orchestrator();
        let existing = SyncOperation::new(AgentId::Primary, "m", OperationKind::Update)
            .with_importance(f64::NAN);
        engine.active.claim(existing).unwrap();

        let err = engine
            .submit(&request("analysis-agent", "m", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict_unresolved");
        let conflict_id = err.conflict_id().unwrap();

        let listed = engine.list_active_conflicts();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ConflictStatus::ManualReview);

        let outcome = engine
            .resolve_manually(
                conflict_id,
                ManualStrategy::ManualReview,
                ManualResolution {
                    content: Some("Operator text.".to_string()),
                    ..ManualResolution::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, SyncStatus::Completed);
        assert_eq!(outcome.record.unwrap().content.as_deref(), Some("Operator text."));
        assert!(engine.list_active_conflicts().is_empty());
        assert_eq!(
            engine.conflict(conflict_id).unwrap().status,
            ConflictStatus::Resolved
        );
    }

    /// Park a malformed persona operation so the next write needs a human.
    async fn escalated(engine: &SyncOrchestrator, incoming_agent: &str) -> EntityId {
        let existing = SyncOperation::new(AgentId::Persona, "m", OperationKind::Update)
            .with_content("The user likes tea.")
            .with_importance(f64::NAN)
            .with_timestamp(Utc::now() - chrono::Duration::seconds(1));
        engine.active.claim(existing).unwrap();
        engine
            .submit(&request(incoming_agent, "m", "The user likes coffee."))
            .await
            .unwrap_err()
            .conflict_id()
            .unwrap()
    }

    #[tokio::test]
    async fn test_manual_strategies() {
        let cases = [
            (ManualStrategy::LatestWins, Winner::New),
            (ManualStrategy::HighestImportance, Winner::Existing),
            (ManualStrategy::AgentPriority, Winner::New),
            (ManualStrategy::MergeContent, Winner::Merged),
        ];
        for (strategy, expected) in cases {
            let (engine, backend) = orchestrator();
            let conflict_id = escalated(&engine, "security-agent").await;
            let outcome = engine
                .resolve_manually(conflict_id, strategy, ManualResolution::default())
                .await
                .unwrap();
            let result = outcome.result.clone().unwrap();
            assert_eq!(result.winner, expected, "{}", strategy);
            assert_eq!(result.policy, PolicyKind::Manual);
            assert_eq!(result.metadata["strategy"], strategy.as_str());

            let record = backend.get("m").await.unwrap();
            match expected {
                Winner::Existing => {
                    assert_eq!(outcome.status, SyncStatus::Conflicted);
                    assert!(record.is_none());
                }
                Winner::New => {
                    assert_eq!(
                        record.unwrap().content.as_deref(),
                        Some("The user likes coffee.")
                    );
                }
                Winner::Merged => {
                    let record = record.unwrap();
                    assert_eq!(
                        record.content.as_deref(),
                        Some("The user likes tea. The user likes coffee.")
                    );
                    assert!(record.tags.contains(concord_core::MERGED_TAG));
                    assert_eq!(record.sources, vec![AgentId::Persona, AgentId::Security]);
                }
            }
            assert_eq!(engine.metrics().await.manual_resolutions, 1);
        }
    }

    #[tokio::test]
    async fn test_manual_review_needs_content_or_winner() {
        let (engine, _) = orchestrator();
        let conflict_id = escalated(&engine, "analysis-agent").await;
        let err = engine
            .resolve_manually(conflict_id, ManualStrategy::ManualReview, ManualResolution::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(engine.conflict(conflict_id).unwrap().is_open());

        let outcome = engine
            .resolve_manually(
                conflict_id,
                ManualStrategy::ManualReview,
                ManualResolution {
                    winner: Some(Winner::New),
                    reason: Some("operator checked".to_string()),
                    ..ManualResolution::default()
                },
            )
            .await
            .unwrap();
        let result = outcome.result.unwrap();
        assert_eq!(result.winner, Winner::New);
        assert_eq!(result.metadata["note"], "operator checked");
    }

    #[tokio::test]
    async fn test_manual_resolution_of_resolved_conflict_fails() {
        let (engine, _) = orchestrator();
        let existing = SyncOperation::new(AgentId::Persona, "m", OperationKind::Update);
        engine.active.claim(existing).unwrap();
        let outcome = engine
            .submit(&request("security-agent", "m", "x"))
            .await
            .unwrap();
        let err = engine
            .resolve_manually(
                outcome.conflict_id.unwrap(),
                ManualStrategy::LatestWins,
                ManualResolution::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConcordError::Conflict(ConflictError::AlreadyResolved { .. })
        ));
    }

    #[tokio::test]
    async fn test_force_sync_clears_foreign_lock() {
        let (engine, backend) = orchestrator();
        let squatter = concord_core::new_entity_id();
        assert!(
            engine
                .lock_manager()
                .acquire("m", AgentId::Analysis, squatter)
                .await
        );

        let outcome = engine
            .force_sync(&request("primary-agent", "m", "Recovered."), Some(1))
            .await
            .unwrap();
        assert_eq!(outcome.status, SyncStatus::Completed);
        assert_eq!(
            backend.get("m").await.unwrap().unwrap().content.as_deref(),
            Some("Recovered.")
        );
        assert!(engine.lock_manager().holder("m").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_status_unknown_id() {
        let (engine, _) = orchestrator();
        let err = engine.sync_status(concord_core::new_entity_id()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_sweep_expired_records_failure() {
        let (engine, _) = orchestrator();
        let stale = SyncOperation::new(AgentId::Analysis, "m", OperationKind::Update)
            .with_timestamp(Utc::now() - chrono::Duration::hours(1));
        let stale_id = stale.operation_id;
        engine.active.claim(stale).unwrap();

        assert_eq!(engine.sweep_expired(), 1);
        assert_eq!(engine.sync_status(stale_id).unwrap().status, SyncStatus::Failed);
        assert_eq!(engine.metrics().await.abandoned_operations, 1);
    }
}

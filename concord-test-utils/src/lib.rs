//! Concord Test Utilities
//!
//! Shared test infrastructure for the Concord workspace:
//! - Proptest generators for requests and operations
//! - Store doubles that fail or stay contested on demand
//! - Fixtures for engines and common conflict scenarios
//! - Assertions on engine error kinds

// Re-export in-memory stores from their source crate
pub use concord_storage::{InMemoryBackend, InMemoryLockStore, LockStore, MemoryBackend, MemoryRecord};

// Re-export core types for convenience
pub use concord_core::{
    AgentId, ConcordError, ConcordResult, EngineConfig, EntityId, LockConfig, OperationKind,
    StorageError, SyncOperation, SyncRequest, SyncStatus, Timestamp,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Lock store whose every call fails as if the server were down.
#[derive(Debug, Clone, Default)]
pub struct UnreachableLockStore;

impl UnreachableLockStore {
    fn down<T>() -> ConcordResult<T> {
        Err(StorageError::Unreachable {
            reason: "connection refused".to_string(),
        }
        .into())
    }
}

#[async_trait]
impl LockStore for UnreachableLockStore {
    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> ConcordResult<bool> {
        Self::down()
    }

    async fn get(&self, _key: &str) -> ConcordResult<Option<String>> {
        Self::down()
    }

    async fn delete(&self, _key: &str) -> ConcordResult<bool> {
        Self::down()
    }

    async fn delete_if_equals(&self, _key: &str, _expected: &str) -> ConcordResult<bool> {
        Self::down()
    }

    async fn scan_prefix(&self, _prefix: &str) -> ConcordResult<Vec<(String, String)>> {
        Self::down()
    }

    async fn ping(&self) -> ConcordResult<()> {
        Self::down()
    }
}

/// Lock store where every key is permanently held by someone else.
///
/// Counts acquisition attempts so retry behaviour can be asserted.
#[derive(Debug, Default)]
pub struct ContestedLockStore {
    attempts: AtomicU64,
}

impl ContestedLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockStore for ContestedLockStore {
    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> ConcordResult<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn get(&self, _key: &str) -> ConcordResult<Option<String>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> ConcordResult<bool> {
        Ok(false)
    }

    async fn delete_if_equals(&self, _key: &str, _expected: &str) -> ConcordResult<bool> {
        Ok(false)
    }

    async fn scan_prefix(&self, _prefix: &str) -> ConcordResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> ConcordResult<()> {
        Ok(())
    }
}

/// Memory backend that rejects every write.
#[derive(Debug, Clone, Default)]
pub struct FailingBackend;

#[async_trait]
impl MemoryBackend for FailingBackend {
    async fn apply(&self, operation: &SyncOperation) -> ConcordResult<Option<MemoryRecord>> {
        Err(StorageError::ApplyFailed {
            memory_id: operation.memory_id.clone(),
            reason: "disk full".to_string(),
        }
        .into())
    }

    async fn get(&self, _memory_id: &str) -> ConcordResult<Option<MemoryRecord>> {
        Ok(None)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Concord inputs.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    /// One of the four known agents.
    pub fn arb_agent() -> impl Strategy<Value = AgentId> {
        prop::sample::select(AgentId::ALL.to_vec())
    }

    /// A mutation kind: create, update or delete.
    pub fn arb_mutation() -> impl Strategy<Value = OperationKind> {
        prop_oneof![
            Just(OperationKind::Create),
            Just(OperationKind::Update),
            Just(OperationKind::Delete),
        ]
    }

    /// A tag set mixing ranked tags and free-form ones.
    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        let tag = prop_oneof![
            Just("security_incident".to_string()),
            Just("system_alert".to_string()),
            Just("user_correction".to_string()),
            Just("user_preference".to_string()),
            Just("task".to_string()),
            Just("persona".to_string()),
            "[a-z]{3,10}",
        ];
        prop::collection::vec(tag, 0..4)
    }

    /// Short sentence-shaped content.
    pub fn arb_content() -> impl Strategy<Value = String> {
        prop::collection::vec("[A-Z][a-z]{1,8}( [a-z]{1,8}){0,5}\\.", 1..4)
            .prop_map(|sentences| sentences.join(" "))
    }

    pub fn arb_importance() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    /// A well-formed request against one of `memory_ids`.
    pub fn arb_sync_request(memory_ids: Vec<String>) -> impl Strategy<Value = SyncRequest> {
        (
            arb_agent(),
            prop::sample::select(memory_ids),
            arb_mutation(),
            prop::option::of(arb_content()),
            prop::option::of(arb_importance()),
            arb_tags(),
            prop::option::of("session-[0-9]{1,3}"),
        )
            .prop_map(
                |(agent, memory_id, kind, content, importance, tags, session_id)| SyncRequest {
                    agent_id: agent.as_str().to_string(),
                    memory_id,
                    operation: kind.as_str().to_string(),
                    content,
                    importance,
                    tags: Some(tags),
                    session_id,
                },
            )
    }

    /// A pending operation on `memory_id` with a timestamp up to ten
    /// minutes in the past.
    pub fn arb_sync_operation(memory_id: &str) -> impl Strategy<Value = SyncOperation> {
        let memory_id = memory_id.to_string();
        (
            arb_agent(),
            arb_mutation(),
            arb_content(),
            arb_importance(),
            arb_tags(),
            prop::option::of("session-[0-9]"),
            0i64..600_000,
        )
            .prop_map(
                move |(agent, kind, content, importance, tags, session, age_ms)| {
                    let mut operation = SyncOperation::new(agent, memory_id.clone(), kind)
                        .with_content(content)
                        .with_importance(importance)
                        .with_tags(tags)
                        .with_timestamp(Utc::now() - chrono::Duration::milliseconds(age_ms));
                    if let Some(session) = session {
                        operation = operation.with_session(session);
                    }
                    operation
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built configurations and requests.

    use super::*;

    /// Engine config with tiny backoffs so contested tests finish fast.
    pub fn fast_retry_config() -> EngineConfig {
        EngineConfig {
            lock: LockConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
                ..LockConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    /// An update request with content.
    pub fn update_request(agent: AgentId, memory_id: &str, content: &str) -> SyncRequest {
        SyncRequest {
            agent_id: agent.as_str().to_string(),
            memory_id: memory_id.to_string(),
            operation: "update".to_string(),
            content: Some(content.to_string()),
            ..SyncRequest::default()
        }
    }

    /// `update_request` with tags attached.
    pub fn tagged_request(agent: AgentId, memory_id: &str, content: &str, tags: &[&str]) -> SyncRequest {
        SyncRequest {
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..update_request(agent, memory_id, content)
        }
    }

    /// An in-flight operation, as if another request were mid-apply.
    pub fn in_flight(agent: AgentId, memory_id: &str, content: &str) -> SyncOperation {
        SyncOperation::new(agent, memory_id, OperationKind::Update).with_content(content)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on Concord results.

    use super::*;

    /// Assert that a result failed with the given error kind.
    #[track_caller]
    pub fn assert_error_kind<T: std::fmt::Debug>(result: &ConcordResult<T>, kind: &str) {
        match result {
            Err(err) => assert_eq!(err.kind(), kind, "unexpected error: {:?}", err),
            Ok(value) => panic!("Expected {} error, got Ok: {:?}", kind, value),
        }
    }

    /// Assert that a result is a lock acquisition failure after `attempts` tries.
    #[track_caller]
    pub fn assert_lock_unavailable<T: std::fmt::Debug>(result: &ConcordResult<T>, attempts: u32) {
        match result {
            Err(ConcordError::Lock(concord_core::LockError::Unavailable { attempts: a, .. })) => {
                assert_eq!(*a, attempts, "wrong attempt count");
            }
            other => panic!("Expected lock unavailable, got: {:?}", other),
        }
    }

    /// Assert that an operation reached `status`.
    #[track_caller]
    pub fn assert_status(operation: &SyncOperation, status: SyncStatus) {
        assert_eq!(
            operation.status, status,
            "operation {} has status {}",
            operation.operation_id, operation.status
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

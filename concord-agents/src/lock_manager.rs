//! Distributed lock manager: one time-bounded exclusive lock per memory id.
//!
//! Acquisition never blocks and never retries; retrying is the caller's
//! decision. Any store failure is treated as "not acquired".

use crate::metrics::SyncMetrics;
use chrono::Utc;
use concord_core::{
    lock_key, Acquired, AgentId, ConcordResult, EntityId, Lock, LockData, LOCK_KEY_PREFIX,
};
use concord_storage::LockStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Grants and releases memory locks against a shared [`LockStore`].
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    ttl: Duration,
    metrics: Arc<SyncMetrics>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager").field("ttl", &self.ttl).finish()
    }
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, ttl: Duration, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            store,
            ttl,
            metrics,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock for `memory_id`. Returns `true` if granted.
    pub async fn acquire(&self, memory_id: &str, agent_id: AgentId, operation_id: EntityId) -> bool {
        self.try_acquire(memory_id, agent_id, operation_id)
            .await
            .is_some()
    }

    /// Try to take the lock, returning the typed lock on success.
    ///
    /// Fails closed: an unreachable store or an unrepresentable expiry yields
    /// `None`.
    pub async fn try_acquire(
        &self,
        memory_id: &str,
        agent_id: AgentId,
        operation_id: EntityId,
    ) -> Option<Lock<Acquired>> {
        let Some(data) = LockData::new(memory_id, agent_id, operation_id, Utc::now(), self.ttl)
        else {
            warn!(memory_id, ttl = ?self.ttl, "lock expiry out of range, failing closed");
            return None;
        };
        match self
            .store
            .set_if_absent(&data.key(), &data.encode_value(), self.ttl)
            .await
        {
            Ok(true) => {
                self.metrics.record_lock_acquired();
                debug!(memory_id, operation_id = %operation_id, "memory lock acquired");
                Some(Lock::new(data))
            }
            Ok(false) => {
                debug!(memory_id, operation_id = %operation_id, "memory lock held elsewhere");
                None
            }
            Err(err) => {
                warn!(memory_id, error = %err, "lock store unreachable, failing closed");
                None
            }
        }
    }

    /// Release a lock obtained from [`try_acquire`](Self::try_acquire).
    ///
    /// Only removes the key while it still carries this lock's value, so a lock
    /// that expired and was re-granted to another operation is left alone.
    pub async fn release_lock(&self, lock: Lock<Acquired>) {
        let data = lock.release();
        match self
            .store
            .delete_if_equals(&data.key(), &data.encode_value())
            .await
        {
            Ok(true) => {
                self.metrics.record_lock_released();
                debug!(memory_id = %data.memory_id, "memory lock released");
            }
            Ok(false) => {
                debug!(memory_id = %data.memory_id, "memory lock already gone or taken over");
            }
            Err(err) => {
                warn!(
                    memory_id = %data.memory_id,
                    error = %err,
                    "failed to release memory lock, ttl will reclaim it"
                );
            }
        }
    }

    /// Release the lock on `memory_id` held by `operation_id`. Idempotent.
    pub async fn release(&self, memory_id: &str, operation_id: EntityId) {
        let holder = match self.holder(memory_id).await {
            Ok(holder) => holder,
            Err(err) => {
                warn!(memory_id, error = %err, "failed to read memory lock for release");
                return;
            }
        };
        if let Some(data) = holder.filter(|data| data.operation_id == operation_id) {
            self.release_lock(Lock::new(data)).await;
        }
    }

    /// Remove whatever lock is on `memory_id`. Administrative recovery only.
    pub async fn force_release(&self, memory_id: &str) -> ConcordResult<bool> {
        let removed = self.store.delete(&lock_key(memory_id)).await?;
        if removed {
            self.metrics.record_lock_released();
            warn!(memory_id, "memory lock force released");
        }
        Ok(removed)
    }

    /// Current holder of the lock on `memory_id`.
    pub async fn holder(&self, memory_id: &str) -> ConcordResult<Option<LockData>> {
        let Some(value) = self.store.get(&lock_key(memory_id)).await? else {
            return Ok(None);
        };
        Ok(LockData::decode_value(memory_id, &value, self.ttl).ok())
    }

    /// Every live memory lock. Values that fail to decode are skipped.
    pub async fn active_locks(&self) -> ConcordResult<Vec<LockData>> {
        let entries = self.store.scan_prefix(LOCK_KEY_PREFIX).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                let memory_id = key.strip_prefix(LOCK_KEY_PREFIX)?;
                LockData::decode_value(memory_id, &value, self.ttl).ok()
            })
            .collect())
    }

    /// Readiness check of the underlying store.
    pub async fn ping(&self) -> ConcordResult<()> {
        self.store.ping().await
    }
}

//! Aggregate engine metrics.
//!
//! Counters are plain atomics so operations on different memory identifiers
//! never contend on a lock to record what they did.

use concord_core::{AgentId, PolicyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    syncs_received: AtomicU64,
    syncs_completed: AtomicU64,
    syncs_failed: AtomicU64,
    syncs_rejected: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
    manual_reviews: AtomicU64,
    manual_resolutions: AtomicU64,
    merge_failures: AtomicU64,
    locks_acquired: AtomicU64,
    locks_released: AtomicU64,
    lock_failures: AtomicU64,
    lock_retries: AtomicU64,
    abandoned_operations: AtomicU64,
    resolution_micros_total: AtomicU64,
    resolution_samples: AtomicU64,
    sync_micros_total: AtomicU64,
    sync_samples: AtomicU64,
    per_agent: [AtomicU64; 4],
    per_policy: [AtomicU64; PolicyKind::COUNT],
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, agent: AgentId) {
        self.syncs_received.fetch_add(1, Ordering::Relaxed);
        self.per_agent[agent.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.syncs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, elapsed: Duration) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
        self.sync_micros_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.sync_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.syncs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict_detected(&self) {
        self.conflicts_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a resolution and the policy that decided it.
    pub fn record_resolution(&self, policy: PolicyKind, latency: Duration) {
        self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
        self.per_policy[policy.index()].fetch_add(1, Ordering::Relaxed);
        if policy == PolicyKind::Manual {
            self.manual_resolutions.fetch_add(1, Ordering::Relaxed);
        }
        self.resolution_micros_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.resolution_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_manual_review(&self) {
        self.manual_reviews.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_failure(&self) {
        self.merge_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_acquired(&self) {
        self.locks_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_released(&self) {
        self.locks_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_failure(&self) {
        self.lock_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_retry(&self) {
        self.lock_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned_operations.fetch_add(count, Ordering::Relaxed);
    }

    /// Hits recorded for one policy.
    pub fn policy_hits(&self, policy: PolicyKind) -> u64 {
        self.per_policy[policy.index()].load(Ordering::Relaxed)
    }

    /// Consistent-enough copy of every counter.
    ///
    /// `conflicts_pending`, `active_operations` and `active_locks` are gauges
    /// owned elsewhere and passed in by the caller.
    pub fn snapshot(&self, gauges: Gauges) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let per_agent = AgentId::ALL
            .iter()
            .map(|agent| (agent.as_str().to_string(), load(&self.per_agent[agent.index()])))
            .collect();

        let per_policy = PolicyKind::CHAIN
            .iter()
            .chain(std::iter::once(&PolicyKind::Manual))
            .map(|policy| (policy.as_str().to_string(), load(&self.per_policy[policy.index()])))
            .collect();

        MetricsSnapshot {
            total_syncs: load(&self.syncs_received),
            syncs_completed: load(&self.syncs_completed),
            syncs_failed: load(&self.syncs_failed),
            syncs_rejected: load(&self.syncs_rejected),
            conflicts_detected: load(&self.conflicts_detected),
            conflicts_resolved: load(&self.conflicts_resolved),
            conflicts_pending: gauges.conflicts_pending,
            manual_reviews: load(&self.manual_reviews),
            manual_resolutions: load(&self.manual_resolutions),
            merge_failures: load(&self.merge_failures),
            locks_acquired: load(&self.locks_acquired),
            locks_released: load(&self.locks_released),
            lock_failures: load(&self.lock_failures),
            lock_retries: load(&self.lock_retries),
            abandoned_operations: load(&self.abandoned_operations),
            avg_resolution_ms: average_ms(
                load(&self.resolution_micros_total),
                load(&self.resolution_samples),
            ),
            avg_sync_ms: average_ms(load(&self.sync_micros_total), load(&self.sync_samples)),
            active_operations: gauges.active_operations,
            active_locks: gauges.active_locks,
            per_agent,
            per_policy,
        }
    }
}

fn average_ms(total_micros: u64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total_micros as f64 / samples as f64 / 1000.0
    }
}

/// Point-in-time values owned by the tables rather than the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gauges {
    pub conflicts_pending: u64,
    pub active_operations: u64,
    pub active_locks: u64,
}

/// Serializable view of [`SyncMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_syncs: u64,
    pub syncs_completed: u64,
    pub syncs_failed: u64,
    pub syncs_rejected: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub conflicts_pending: u64,
    pub manual_reviews: u64,
    pub manual_resolutions: u64,
    pub merge_failures: u64,
    pub locks_acquired: u64,
    pub locks_released: u64,
    pub lock_failures: u64,
    pub lock_retries: u64,
    pub abandoned_operations: u64,
    pub avg_resolution_ms: f64,
    pub avg_sync_ms: f64,
    pub active_operations: u64,
    pub active_locks: u64,
    pub per_agent: BTreeMap<String, u64>,
    pub per_policy: BTreeMap<String, u64>,
}

//! External key-value store used for memory locks.

use async_trait::async_trait;
use concord_core::{ConcordError, ConcordResult, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Shared key-value store holding memory locks.
///
/// # Atomicity
///
/// `set_if_absent` MUST be atomic with respect to every other caller of the
/// same store, including callers in other processes. Mutual exclusion of the
/// engine rests entirely on this guarantee. An expired key counts as absent.
///
/// Implementations report an unreachable store as
/// [`StorageError::Unreachable`]; callers treat that as a failed acquisition.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with an expiry, only if no live value exists.
    /// Returns `true` if this call set the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> ConcordResult<bool>;

    /// Current live value of `key`.
    async fn get(&self, key: &str) -> ConcordResult<Option<String>>;

    /// Delete `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> ConcordResult<bool>;

    /// Delete `key` only if its live value equals `expected`. Atomic, like
    /// `set_if_absent`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> ConcordResult<bool>;

    /// Live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> ConcordResult<Vec<(String, String)>>;

    /// Round-trip check used by readiness probes.
    async fn ping(&self) -> ConcordResult<()>;
}

// ============================================================================
// IN-MEMORY LOCK STORE
// ============================================================================

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Single-process lock store backed by a `HashMap` behind one `RwLock`.
///
/// Every mutation takes the write lock, which makes `set_if_absent` atomic
/// for all tasks sharing the store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLockStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> ConcordResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|_, stored| stored.is_live(now));
        Ok(before - entries.len())
    }

    /// Number of live entries.
    pub fn live_count(&self) -> ConcordResult<usize> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.values().filter(|stored| stored.is_live(now)).count())
    }
}

fn poisoned() -> ConcordError {
    ConcordError::Storage(StorageError::LockPoisoned)
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> ConcordResult<bool> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            ConcordError::Storage(StorageError::InvalidTtl {
                key: key.to_string(),
                ttl_ms: ttl.as_millis(),
            })
        })?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|stored| stored.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> ConcordResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone()))
    }

    async fn delete(&self, key: &str) -> ConcordResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries
            .remove(key)
            .is_some_and(|stored| stored.is_live(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> ConcordResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let matches = entries
            .get(key)
            .is_some_and(|stored| stored.is_live(now) && stored.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn scan_prefix(&self, prefix: &str) -> ConcordResult<Vec<(String, String)>> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut live: Vec<(String, String)> = entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.is_live(now))
            .map(|(key, stored)| (key.clone(), stored.value.clone()))
            .collect();
        live.sort();
        Ok(live)
    }

    async fn ping(&self) -> ConcordResult<()> {
        let _guard = self.entries.read().map_err(|_| poisoned())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent("k", "a", TTL).await.unwrap());
        assert!(!store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("k", "a", TTL).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.set_if_absent("k", "b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals_only_removes_matching_value() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("k", "a", TTL).await.unwrap();
        assert!(!store.delete_if_equals("k", "b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
        assert!(store.delete_if_equals("k", "a").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_counts_as_absent() {
        let store = InMemoryLockStore::new();
        store
            .set_if_absent("k", "a", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", TTL).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_purge_expired_removes_stale_entries() {
        let store = InMemoryLockStore::new();
        store
            .set_if_absent("stale", "a", Duration::from_millis(5))
            .await
            .unwrap();
        store.set_if_absent("live", "b", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.live_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let store = InMemoryLockStore::new();
        let err = store.set_if_absent("k", "a", Duration::MAX).await.unwrap_err();
        assert_eq!(err.kind(), "storage_error");
        assert_eq!(store.get("k").await.unwrap(), None);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_prefix_filters_and_sorts() {
        let store = InMemoryLockStore::new();
        store.set_if_absent("memory_lock:b", "2", TTL).await.unwrap();
        store.set_if_absent("memory_lock:a", "1", TTL).await.unwrap();
        store.set_if_absent("other:c", "3", TTL).await.unwrap();
        let found = store.scan_prefix("memory_lock:").await.unwrap();
        assert_eq!(
            found,
            vec![
                ("memory_lock:a".to_string(), "1".to_string()),
                ("memory_lock:b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_if_absent_has_single_winner() {
        let store = InMemoryLockStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("contended", &i.to_string(), TTL)
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

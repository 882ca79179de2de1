//! Concord Storage - Storage Seams
//!
//! Two external stores sit behind the engine:
//!
//! - [`LockStore`]: a shared key-value store with atomic set-if-absent and
//!   per-key expiry, holding one lock per memory identifier.
//! - [`MemoryBackend`]: the persistent memory store that winning operations
//!   are applied to.
//!
//! Both come with in-memory implementations for single-process deployments
//! and tests.

pub mod lock_store;
pub mod memory_backend;

pub use lock_store::{InMemoryLockStore, LockStore};
pub use memory_backend::{InMemoryBackend, MemoryBackend, MemoryRecord};

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A key is held by at most one value no matter the order of
        /// acquisitions and releases.
        #[test]
        fn prop_lock_store_single_holder(ops in prop::collection::vec((0u8..3, any::<bool>()), 1..40)) {
            let rt = runtime();
            let store = InMemoryLockStore::new();
            let mut model: std::collections::HashMap<u8, bool> = Default::default();
            let ttl = Duration::from_secs(30);

            for (key, acquire) in ops {
                let name = format!("k{}", key);
                if acquire {
                    let set = rt.block_on(store.set_if_absent(&name, "v", ttl)).unwrap();
                    let held = model.get(&key).copied().unwrap_or(false);
                    prop_assert_eq!(set, !held);
                    model.insert(key, true);
                } else {
                    rt.block_on(store.delete(&name)).unwrap();
                    model.insert(key, false);
                }
            }

            let expected = model.values().filter(|held| **held).count();
            prop_assert_eq!(store.live_count().unwrap(), expected);
        }
    }
}

//! Concord Core - Entity Types
//!
//! Pure data structures for the memory conflict resolution engine. All other
//! crates depend on this one. No I/O and no engine behavior live here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod agent;
pub mod config;
pub mod conflict;
pub mod enums;
pub mod error;
pub mod lock;
pub mod operation;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for TTL and timeout values.
pub type DurationMs = i64;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute the SHA-256 digest of content as a lowercase hex string.
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use agent::{AgentId, AgentIdParseError};
pub use config::{
    AgentWeights, EngineConfig, EngineLimits, LockConfig, PriorityTable, ResolverConfig,
    TagTable, MAX_LOCK_TTL,
};
pub use conflict::{Conflict, ResolutionResult};
pub use enums::{
    ConflictKind, ConflictStatus, Decision, EnumParseError, ManualStrategy, OperationKind,
    PolicyKind, ResolvedBy, SyncStatus, Winner,
};
pub use error::{
    ConcordError, ConcordResult, ConfigError, ConflictError, LockError, MergeError,
    StorageError, ValidationError,
};
pub use lock::{
    lock_key, Acquired, Lock, LockData, LockState, LockValueParseError, Released,
    LOCK_KEY_PREFIX,
};
pub use operation::{
    normalize_tags, SyncOperation, SyncRequest, DEFAULT_IMPORTANCE, MERGED_TAG,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = compute_content_hash(b"The sky is blue.");
        let b = compute_content_hash(b"The sky is blue.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_differs_for_different_content() {
        assert_ne!(compute_content_hash(b"a"), compute_content_hash(b"b"));
    }

    #[test]
    fn test_entity_ids_are_v7() {
        assert_eq!(new_entity_id().get_version_num(), 7);
    }
}

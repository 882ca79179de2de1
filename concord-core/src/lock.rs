//! Lock typestate for compile-time safety of the memory lock lifecycle.
//!
//! A lock is only obtainable from a successful acquisition and can only be
//! released once: `release()` consumes the `Lock<Acquired>`.
//!
//! # State Transition Diagram
//!
//! ```text
//! (unlocked) ─── acquire() ──→ Acquired ─── release() ──→ (unlocked)
//!                                  │
//!                          ttl elapses ──→ (unlocked)
//! ```
//!
//! # Stored value
//!
//! The external store keeps one key per memory identifier,
//! `memory_lock:<memory_id>`, whose value is `<agent_id>:<operation_id>:<acquired_at_ms>`.

use crate::{AgentId, EntityId, Timestamp};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

/// Key prefix of memory locks in the external store.
pub const LOCK_KEY_PREFIX: &str = "memory_lock:";

/// Store key guarding a memory identifier.
pub fn lock_key(memory_id: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, memory_id)
}

// ============================================================================
// LOCK DATA (state-independent)
// ============================================================================

/// Data describing a held memory lock. This is what gets written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LockData {
    pub memory_id: String,
    pub agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub operation_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub acquired_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: Timestamp,
}

impl LockData {
    /// Build lock data for an acquisition happening at `now`.
    ///
    /// Returns `None` when `now + ttl` is not a representable timestamp.
    pub fn new(
        memory_id: impl Into<String>,
        agent_id: AgentId,
        operation_id: EntityId,
        now: Timestamp,
        ttl: Duration,
    ) -> Option<Self> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))?;
        Some(Self {
            memory_id: memory_id.into(),
            agent_id,
            operation_id,
            acquired_at: now,
            expires_at,
        })
    }

    /// Store key for this lock.
    pub fn key(&self) -> String {
        lock_key(&self.memory_id)
    }

    /// Value written to the store.
    pub fn encode_value(&self) -> String {
        format!(
            "{}:{}:{}",
            self.agent_id.as_str(),
            self.operation_id,
            self.acquired_at.timestamp_millis()
        )
    }

    /// Rebuild lock data from a stored value.
    pub fn decode_value(
        memory_id: impl Into<String>,
        value: &str,
        ttl: Duration,
    ) -> Result<Self, LockValueParseError> {
        let malformed = || LockValueParseError(value.to_string());
        let mut parts = value.splitn(3, ':');
        let agent = parts.next().ok_or_else(malformed)?;
        let operation = parts.next().ok_or_else(malformed)?;
        let acquired = parts.next().ok_or_else(malformed)?;

        let agent_id = AgentId::parse(agent).map_err(|_| malformed())?;
        let operation_id = Uuid::parse_str(operation).map_err(|_| malformed())?;
        let millis: i64 = acquired.parse().map_err(|_| malformed())?;
        let acquired_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(malformed)?;

        Self::new(memory_id, agent_id, operation_id, acquired_at, ttl).ok_or_else(malformed)
    }

    /// Check if the lock has expired based on current time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Calculate remaining duration until expiry.
    pub fn remaining_duration(&self, now: Timestamp) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

/// Error when a stored lock value cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockValueParseError(pub String);

impl fmt::Display for LockValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid lock value: {}", self.0)
    }
}

impl std::error::Error for LockValueParseError {}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lock states.
pub trait LockState: private::Sealed + Send + Sync {}

/// Lock is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired;
impl LockState for Acquired {}

/// Lock has been released (locks in this state don't exist at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released;
impl LockState for Released {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Acquired {}
    impl Sealed for super::Released {}
}

// ============================================================================
// LOCK TYPESTATE WRAPPER
// ============================================================================

/// A memory lock with compile-time state tracking.
#[derive(Debug)]
pub struct Lock<S: LockState> {
    data: LockData,
    _state: PhantomData<S>,
}

impl<S: LockState> Lock<S> {
    /// Access the underlying lock data (read-only).
    pub fn data(&self) -> &LockData {
        &self.data
    }

    pub fn memory_id(&self) -> &str {
        &self.data.memory_id
    }

    pub fn operation_id(&self) -> EntityId {
        self.data.operation_id
    }

    pub fn agent_id(&self) -> AgentId {
        self.data.agent_id
    }
}

impl Lock<Acquired> {
    /// Wrap data for a lock the store has just granted.
    pub fn new(data: LockData) -> Self {
        Lock {
            data,
            _state: PhantomData,
        }
    }

    /// Release the lock and return the underlying data.
    pub fn release(self) -> LockData {
        self.data
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_lock_data() -> LockData {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        LockData::new(
            "mem-42",
            AgentId::Security,
            Uuid::now_v7(),
            now,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_lock_key_format() {
        assert_eq!(lock_key("mem-42"), "memory_lock:mem-42");
        assert_eq!(make_lock_data().key(), "memory_lock:mem-42");
    }

    #[test]
    fn test_encode_value_layout() {
        let data = make_lock_data();
        let value = data.encode_value();
        let parts: Vec<&str> = value.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "security-agent");
        assert_eq!(parts[1], data.operation_id.to_string());
        assert_eq!(parts[2], "1700000000123");
    }

    #[test]
    fn test_decode_value_restores_holder() {
        let data = make_lock_data();
        let decoded =
            LockData::decode_value("mem-42", &data.encode_value(), Duration::from_secs(30))
                .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_decode_value_rejects_garbage() {
        let ttl = Duration::from_secs(30);
        assert!(LockData::decode_value("m", "nonsense", ttl).is_err());
        assert!(LockData::decode_value("m", "security-agent:not-a-uuid:1", ttl).is_err());
        assert!(LockData::decode_value("m", "ghost:00000000-0000-0000-0000-000000000000:1", ttl)
            .is_err());
    }

    #[test]
    fn test_expiry_after_ttl() {
        let data = make_lock_data();
        assert!(!data.is_expired(data.acquired_at));
        assert!(data.is_expired(data.acquired_at + chrono::Duration::seconds(30)));
        assert_eq!(
            data.remaining_duration(data.acquired_at),
            Some(Duration::from_secs(30))
        );
        assert_eq!(data.remaining_duration(data.expires_at), None);
    }

    #[test]
    fn test_unrepresentable_expiry_is_rejected() {
        let now = Utc::now();
        let ttl = Duration::from_secs(10_000_000_000_000);
        assert!(LockData::new("m", AgentId::Primary, Uuid::now_v7(), now, ttl).is_none());
        assert!(LockData::new("m", AgentId::Primary, Uuid::now_v7(), now, Duration::MAX).is_none());
    }

    #[test]
    fn test_lock_release_consumes() {
        let data = make_lock_data();
        let lock = Lock::<Acquired>::new(data.clone());
        assert_eq!(lock.memory_id(), "mem-42");
        let released = lock.release();
        assert_eq!(released.operation_id, data.operation_id);
    }
}

//! Engine configuration: priority and tag tables, resolver thresholds, lock
//! retry policy.
//!
//! These are immutable once the engine is built. Defaults are the production
//! values; `validate()` must pass before a config is handed to the engine.

use crate::{AgentId, ConcordError, ConcordResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConcordError {
    ConcordError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// PRIORITY & WEIGHT TABLES
// ============================================================================

/// Static trust priority per agent. Lower is more authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PriorityTable {
    pub security: i32,
    pub primary: i32,
    pub analysis: i32,
    pub persona: i32,
}

impl PriorityTable {
    pub fn priority(&self, agent: AgentId) -> i32 {
        match agent {
            AgentId::Security => self.security,
            AgentId::Primary => self.primary,
            AgentId::Analysis => self.analysis,
            AgentId::Persona => self.persona,
        }
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            security: 1,
            primary: 2,
            analysis: 3,
            persona: 4,
        }
    }
}

/// Importance multiplier per agent for the weighted importance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentWeights {
    pub security: f64,
    pub primary: f64,
    pub analysis: f64,
    pub persona: f64,
}

impl AgentWeights {
    pub fn weight(&self, agent: AgentId) -> f64 {
        match agent {
            AgentId::Security => self.security,
            AgentId::Primary => self.primary,
            AgentId::Analysis => self.analysis,
            AgentId::Persona => self.persona,
        }
    }
}

impl Default for AgentWeights {
    fn default() -> Self {
        Self {
            security: 1.3,
            primary: 1.1,
            analysis: 1.0,
            persona: 0.9,
        }
    }
}

// ============================================================================
// TAG TABLE
// ============================================================================

/// Precedence ranks of semantic tags plus the security and emergency classes.
///
/// Tag lookups are case-insensitive; tables are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TagTable {
    /// Lower rank = more important.
    pub ranks: BTreeMap<String, u32>,
    pub security_tags: BTreeSet<String>,
    pub emergency_tags: BTreeSet<String>,
}

impl TagTable {
    /// Rank of a single tag, if it is ranked at all.
    pub fn rank(&self, tag: &str) -> Option<u32> {
        self.ranks.get(&tag.to_lowercase()).copied()
    }

    /// Best (lowest) rank among a set of tags. `None` means no ranked tag.
    pub fn best_rank<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> Option<u32> {
        tags.into_iter().filter_map(|t| self.rank(t)).min()
    }

    pub fn has_security_tag<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter()
            .any(|t| self.security_tags.contains(&t.to_lowercase()))
    }

    pub fn has_emergency_tag<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter()
            .any(|t| self.emergency_tags.contains(&t.to_lowercase()))
    }
}

impl Default for TagTable {
    fn default() -> Self {
        let ranks = [
            ("emergency_override", 0),
            ("system_alert", 1),
            ("memory_corruption", 1),
            ("security_incident", 2),
            ("security_alert", 2),
            ("threat_detected", 2),
            ("user_correction", 3),
            ("user_preference", 4),
            ("critical", 4),
            ("task", 5),
            ("fact", 5),
            ("analysis", 6),
            ("conversation", 6),
            ("persona", 7),
            ("style", 7),
        ]
        .into_iter()
        .map(|(tag, rank)| (tag.to_string(), rank))
        .collect();

        let security_tags = ["security_incident", "security_alert", "threat_detected", "security"]
            .into_iter()
            .map(String::from)
            .collect();

        let emergency_tags = ["system_alert", "memory_corruption", "emergency_override"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            ranks,
            security_tags,
            emergency_tags,
        }
    }
}

// ============================================================================
// RESOLVER CONFIG
// ============================================================================

/// Everything the policy chain and merge engine read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResolverConfig {
    pub priorities: PriorityTable,
    pub weights: AgentWeights,
    pub tags: TagTable,
    /// Window after the existing operation in which a newer one wins outright
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub recency_window: Duration,
    /// Weighted importance difference that must be exceeded to decide
    pub importance_margin: f64,
    /// Token-set Jaccard similarity that must be exceeded to merge
    pub similarity_threshold: f64,
    /// Shorter content must be at least this fraction of the longer one
    pub min_length_ratio: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            priorities: PriorityTable::default(),
            weights: AgentWeights::default(),
            tags: TagTable::default(),
            recency_window: Duration::from_secs(300),
            importance_margin: 0.2,
            similarity_threshold: 0.6,
            min_length_ratio: 0.3,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> ConcordResult<()> {
        for agent in AgentId::ALL {
            let weight = self.weights.weight(agent);
            if !weight.is_finite() || weight <= 0.0 {
                return Err(invalid(
                    &format!("weights.{}", agent),
                    weight,
                    "agent weights must be positive and finite",
                ));
            }
        }

        if self.recency_window.is_zero() {
            return Err(invalid(
                "recency_window",
                "0",
                "recency_window must be greater than 0",
            ));
        }

        if !self.importance_margin.is_finite() || self.importance_margin < 0.0 {
            return Err(invalid(
                "importance_margin",
                self.importance_margin,
                "importance_margin must be non-negative",
            ));
        }

        for (field, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("min_length_ratio", self.min_length_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, value, "must be between 0.0 and 1.0"));
            }
        }

        Ok(())
    }
}

// ============================================================================
// LOCK CONFIG
// ============================================================================

/// Longest lock TTL accepted by `LockConfig::validate`.
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lock TTL and bounded retry policy for contested acquisitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LockConfig {
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub ttl: Duration,
    /// Total acquisition attempts, first one included
    pub max_attempts: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub initial_backoff: Duration,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl LockConfig {
    /// Delay before retry number `retry` (0-based), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = f64::from(self.backoff_multiplier).powi(retry as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn validate(&self) -> ConcordResult<()> {
        if self.ttl.is_zero() {
            return Err(invalid("lock.ttl", "0", "lock ttl must be greater than 0"));
        }
        if self.ttl > MAX_LOCK_TTL {
            return Err(invalid(
                "lock.ttl",
                format!("{:?}", self.ttl),
                "lock ttl must not exceed one day",
            ));
        }
        if self.max_attempts == 0 {
            return Err(invalid(
                "lock.max_attempts",
                self.max_attempts,
                "at least one attempt is required",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(invalid(
                "lock.backoff_multiplier",
                self.backoff_multiplier,
                "backoff_multiplier must be at least 1.0",
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(invalid(
                "lock.max_backoff",
                format!("{:?}", self.max_backoff),
                "max_backoff must not be below initial_backoff",
            ));
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Master configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub lock: LockConfig,
    pub limits: EngineLimits,
}

/// Bounds on in-memory bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EngineLimits {
    /// In-flight operations older than this are considered abandoned
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub operation_ttl: Duration,
    /// Finished operations kept for status lookups
    pub history_capacity: usize,
    /// Resolved conflicts kept for inspection
    pub resolved_capacity: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            operation_ttl: Duration::from_secs(300),
            history_capacity: 1000,
            resolved_capacity: 500,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - resolver weights, window and thresholds
    /// - lock ttl and retry policy
    /// - operation ttl is positive and history bounds are non-zero
    pub fn validate(&self) -> ConcordResult<()> {
        self.resolver.validate()?;
        self.lock.validate()?;

        if self.limits.operation_ttl.is_zero() {
            return Err(invalid(
                "limits.operation_ttl",
                "0",
                "operation_ttl must be greater than 0",
            ));
        }
        if self.limits.history_capacity == 0 {
            return Err(invalid(
                "limits.history_capacity",
                0,
                "history_capacity must be greater than 0",
            ));
        }
        if self.limits.resolved_capacity == 0 {
            return Err(invalid(
                "limits.resolved_capacity",
                0,
                "resolved_capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_priorities() {
        let table = PriorityTable::default();
        assert_eq!(table.priority(AgentId::Security), 1);
        assert_eq!(table.priority(AgentId::Primary), 2);
        assert_eq!(table.priority(AgentId::Analysis), 3);
        assert_eq!(table.priority(AgentId::Persona), 4);
    }

    #[test]
    fn test_tag_table_lookups_are_case_insensitive() {
        let tags = TagTable::default();
        let set = vec!["System_Alert".to_string(), "task".to_string()];
        assert_eq!(tags.best_rank(&set), Some(1));
        assert!(tags.has_emergency_tag(&set));
        assert!(!tags.has_security_tag(&set));
        assert_eq!(tags.best_rank(&vec!["unranked".to_string()]), None);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let lock = LockConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            ..LockConfig::default()
        };
        assert_eq!(lock.backoff_for(0), Duration::from_millis(10));
        assert_eq!(lock.backoff_for(1), Duration::from_millis(20));
        assert_eq!(lock.backoff_for(2), Duration::from_millis(40));
        assert_eq!(lock.backoff_for(3), Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = EngineConfig::default();
        config.lock.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lock.max_attempts"));
    }

    #[test]
    fn test_validate_bounds_lock_ttl() {
        let mut config = EngineConfig::default();
        config.lock.ttl = MAX_LOCK_TTL;
        assert!(config.validate().is_ok());

        config.lock.ttl = Duration::from_secs(10_000_000_000_000);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("lock.ttl"));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = EngineConfig::default();
        config.resolver.similarity_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn test_validate_rejects_negative_weight() {
        let mut config = EngineConfig::default();
        config.resolver.weights.persona = -0.1;
        assert!(config.validate().is_err());
    }
}

//! Enum types for sync operations, conflicts and resolutions.
//!
//! Every enum has a snake_case wire form shared by serde, `Display` and
//! `FromStr`, so the API, logs and metrics labels all agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}

/// Implements `Display` and `FromStr` on top of `as_str` / `parse`.
macro_rules! impl_wire_str {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = EnumParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace('-', "_")
}

// ============================================================================
// OPERATION KIND
// ============================================================================

/// Kind of mutation a sync operation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Read,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            "read" => Ok(OperationKind::Read),
            _ => Err(EnumParseError {
                kind: "operation",
                value: s.to_string(),
            }),
        }
    }

    /// Whether applying the operation changes the stored record.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationKind::Read)
    }
}

impl_wire_str!(OperationKind);

// ============================================================================
// SYNC STATUS
// ============================================================================

/// Lifecycle of a sync operation.
///
/// ```text
/// pending ──→ processing ──→ completed
///    │             └──────→ failed
///    └──→ conflicted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Conflicted,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Conflicted => "conflicted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "processing" => Ok(SyncStatus::Processing),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "conflicted" => Ok(SyncStatus::Conflicted),
            _ => Err(EnumParseError {
                kind: "sync status",
                value: s.to_string(),
            }),
        }
    }

    /// Pending and processing operations are in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }
}

impl_wire_str!(SyncStatus);

// ============================================================================
// CONFLICT STATUS & KIND
// ============================================================================

/// Status of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Detected, awaiting automatic resolution
    #[default]
    Pending,
    /// The policy chain could not decide; a caller must resolve it
    ManualReview,
    /// Resolved automatically or manually
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::ManualReview => "manual_review",
            ConflictStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "pending" => Ok(ConflictStatus::Pending),
            "manual_review" => Ok(ConflictStatus::ManualReview),
            "resolved" => Ok(ConflictStatus::Resolved),
            _ => Err(EnumParseError {
                kind: "conflict status",
                value: s.to_string(),
            }),
        }
    }

    /// Whether a manual resolution may still be applied.
    pub fn is_open(&self) -> bool {
        !matches!(self, ConflictStatus::Resolved)
    }
}

impl_wire_str!(ConflictStatus);

/// What the competing operations disagree about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Different content for the same record
    Content,
    /// Same content, different tags, importance or session
    Metadata,
    /// At least one side deletes the record
    Deletion,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Content => "content",
            ConflictKind::Metadata => "metadata",
            ConflictKind::Deletion => "deletion",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "content" => Ok(ConflictKind::Content),
            "metadata" => Ok(ConflictKind::Metadata),
            "deletion" => Ok(ConflictKind::Deletion),
            _ => Err(EnumParseError {
                kind: "conflict kind",
                value: s.to_string(),
            }),
        }
    }
}

impl_wire_str!(ConflictKind);

// ============================================================================
// DECISIONS
// ============================================================================

/// Verdict of a single policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Existing,
    New,
    Merge,
    /// Defer to the next policy in the chain
    Continue,
}

impl Decision {
    /// Winner implied by a final decision. `Continue` is not final.
    pub fn winner(&self) -> Option<Winner> {
        match self {
            Decision::Existing => Some(Winner::Existing),
            Decision::New => Some(Winner::New),
            Decision::Merge => Some(Winner::Merged),
            Decision::Continue => None,
        }
    }
}

/// Outcome of a resolved conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Existing,
    New,
    Merged,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::Existing => "existing",
            Winner::New => "new",
            Winner::Merged => "merged",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "existing" => Ok(Winner::Existing),
            "new" => Ok(Winner::New),
            "merged" | "merge" => Ok(Winner::Merged),
            _ => Err(EnumParseError {
                kind: "winner",
                value: s.to_string(),
            }),
        }
    }
}

impl_wire_str!(Winner);

/// The policies of the resolution chain, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    SecurityOverride,
    EmergencyOverride,
    AgentPriority,
    TagHierarchy,
    RecencyBias,
    Timestamp,
    WeightedImportance,
    SessionContinuity,
    ContentMerge,
    StabilityFallback,
    /// Not part of the chain; used for results produced by a caller
    Manual,
}

impl PolicyKind {
    /// Chain policies in evaluation order.
    pub const CHAIN: [PolicyKind; 10] = [
        PolicyKind::SecurityOverride,
        PolicyKind::EmergencyOverride,
        PolicyKind::AgentPriority,
        PolicyKind::TagHierarchy,
        PolicyKind::RecencyBias,
        PolicyKind::Timestamp,
        PolicyKind::WeightedImportance,
        PolicyKind::SessionContinuity,
        PolicyKind::ContentMerge,
        PolicyKind::StabilityFallback,
    ];

    /// Number of distinct policy kinds, manual included.
    pub const COUNT: usize = 11;

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::SecurityOverride => "security_override",
            PolicyKind::EmergencyOverride => "emergency_override",
            PolicyKind::AgentPriority => "agent_priority",
            PolicyKind::TagHierarchy => "tag_hierarchy",
            PolicyKind::RecencyBias => "recency_bias",
            PolicyKind::Timestamp => "timestamp",
            PolicyKind::WeightedImportance => "weighted_importance",
            PolicyKind::SessionContinuity => "session_continuity",
            PolicyKind::ContentMerge => "content_merge",
            PolicyKind::StabilityFallback => "stability_fallback",
            PolicyKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        let normalized = normalize(s);
        PolicyKind::CHAIN
            .iter()
            .chain(std::iter::once(&PolicyKind::Manual))
            .find(|kind| kind.as_str() == normalized)
            .copied()
            .ok_or_else(|| EnumParseError {
                kind: "policy",
                value: s.to_string(),
            })
    }

    /// Stable dense index, used for per-policy counters.
    pub fn index(&self) -> usize {
        match self {
            PolicyKind::SecurityOverride => 0,
            PolicyKind::EmergencyOverride => 1,
            PolicyKind::AgentPriority => 2,
            PolicyKind::TagHierarchy => 3,
            PolicyKind::RecencyBias => 4,
            PolicyKind::Timestamp => 5,
            PolicyKind::WeightedImportance => 6,
            PolicyKind::SessionContinuity => 7,
            PolicyKind::ContentMerge => 8,
            PolicyKind::StabilityFallback => 9,
            PolicyKind::Manual => 10,
        }
    }
}

impl_wire_str!(PolicyKind);

/// Who produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    #[default]
    Automatic,
    Manual,
}

// ============================================================================
// MANUAL STRATEGIES
// ============================================================================

/// Strategy a caller picks when resolving a conflict by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ManualStrategy {
    /// Strictly newer timestamp wins, ties keep the existing operation
    LatestWins,
    /// Higher raw importance wins, ties keep the existing operation
    HighestImportance,
    /// Lower agent priority number wins, ties keep the existing operation
    AgentPriority,
    /// Merge both contents regardless of similarity
    MergeContent,
    /// The caller supplies the winner and/or the final content
    ManualReview,
}

impl ManualStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualStrategy::LatestWins => "latest_wins",
            ManualStrategy::HighestImportance => "highest_importance",
            ManualStrategy::AgentPriority => "agent_priority",
            ManualStrategy::MergeContent => "merge_content",
            ManualStrategy::ManualReview => "manual_review",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnumParseError> {
        match normalize(s).as_str() {
            "latest_wins" => Ok(ManualStrategy::LatestWins),
            "highest_importance" => Ok(ManualStrategy::HighestImportance),
            "agent_priority" => Ok(ManualStrategy::AgentPriority),
            "merge_content" => Ok(ManualStrategy::MergeContent),
            "manual_review" => Ok(ManualStrategy::ManualReview),
            _ => Err(EnumParseError {
                kind: "manual strategy",
                value: s.to_string(),
            }),
        }
    }
}

impl_wire_str!(ManualStrategy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_parse() {
        assert_eq!("CREATE".parse::<OperationKind>(), Ok(OperationKind::Create));
        assert_eq!("delete".parse::<OperationKind>(), Ok(OperationKind::Delete));
        assert!("upsert".parse::<OperationKind>().is_err());
        assert!(!OperationKind::Read.is_mutation());
        assert!(OperationKind::Update.is_mutation());
    }

    #[test]
    fn test_sync_status_in_flight() {
        assert!(SyncStatus::Pending.is_in_flight());
        assert!(SyncStatus::Processing.is_in_flight());
        for status in [SyncStatus::Completed, SyncStatus::Failed, SyncStatus::Conflicted] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_conflict_status_wire_names() {
        assert_eq!(ConflictStatus::ManualReview.to_string(), "manual_review");
        assert_eq!(
            "manual-review".parse::<ConflictStatus>(),
            Ok(ConflictStatus::ManualReview)
        );
        assert!(ConflictStatus::ManualReview.is_open());
        assert!(!ConflictStatus::Resolved.is_open());
    }

    #[test]
    fn test_decision_winner_mapping() {
        assert_eq!(Decision::Existing.winner(), Some(Winner::Existing));
        assert_eq!(Decision::New.winner(), Some(Winner::New));
        assert_eq!(Decision::Merge.winner(), Some(Winner::Merged));
        assert_eq!(Decision::Continue.winner(), None);
    }

    #[test]
    fn test_policy_chain_order_matches_indices() {
        for (position, kind) in PolicyKind::CHAIN.iter().enumerate() {
            assert_eq!(kind.index(), position);
            assert_eq!(PolicyKind::parse(kind.as_str()), Ok(*kind));
        }
        assert_eq!(PolicyKind::Manual.index(), PolicyKind::COUNT - 1);
    }

    #[test]
    fn test_manual_strategy_serde() {
        let json = serde_json::to_string(&ManualStrategy::MergeContent).unwrap();
        assert_eq!(json, "\"merge_content\"");
        let parsed: ManualStrategy = serde_json::from_str("\"latest_wins\"").unwrap();
        assert_eq!(parsed, ManualStrategy::LatestWins);
    }

    #[test]
    fn test_parse_error_message() {
        let err = ManualStrategy::parse("coin_flip").unwrap_err();
        assert_eq!(err.to_string(), "Invalid manual strategy: coin_flip");
    }
}

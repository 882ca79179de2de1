//! Conflicts between competing sync operations and their resolutions.

use crate::{
    new_entity_id, AgentId, ConflictKind, ConflictStatus, EntityId, OperationKind, PolicyKind,
    ResolvedBy, SyncOperation, Timestamp, Winner,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

/// Outcome of resolving a conflict. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub winner: Winner,
    /// Policy that rendered the decision
    pub policy: PolicyKind,
    pub reason: String,
    /// Policy-specific details, e.g. the priorities compared
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: Map<String, Value>,
    /// Content of the merged record when `winner` is `merged`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
    pub resolved_by: ResolvedBy,
}

impl ResolutionResult {
    /// Result rendered by the automatic policy chain.
    pub fn automatic(winner: Winner, policy: PolicyKind, reason: impl Into<String>) -> Self {
        Self {
            winner,
            policy,
            reason: reason.into(),
            metadata: Map::new(),
            merged_content: None,
            resolved_by: ResolvedBy::Automatic,
        }
    }

    /// Result supplied by a caller.
    pub fn manual(winner: Winner, reason: impl Into<String>) -> Self {
        Self {
            resolved_by: ResolvedBy::Manual,
            ..Self::automatic(winner, PolicyKind::Manual, reason)
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_merged_content(mut self, content: impl Into<String>) -> Self {
        self.merged_content = Some(content.into());
        self
    }
}

// ============================================================================
// CONFLICT
// ============================================================================

/// Two operations contending for one memory identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conflict_id: EntityId,
    pub memory_id: String,
    pub kind: ConflictKind,
    /// Operation that was in flight when the conflict was detected
    pub existing: SyncOperation,
    /// Operation whose arrival caused the conflict
    pub incoming: SyncOperation,
    pub status: ConflictStatus,
    /// Strategy expected to decide, refined to the deciding policy on resolution
    pub strategy: PolicyKind,
    pub resolution: Option<ResolutionResult>,
    /// Why the chain could not decide, when routed to manual review
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub detected_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub resolved_at: Option<Timestamp>,
}

impl Conflict {
    /// Record a newly detected conflict.
    pub fn detect(existing: SyncOperation, incoming: SyncOperation) -> Self {
        let kind = classify(&existing, &incoming);
        let strategy = candidate_strategy(&existing, &incoming);
        Self {
            conflict_id: new_entity_id(),
            memory_id: incoming.memory_id.clone(),
            kind,
            existing,
            incoming,
            status: ConflictStatus::Pending,
            strategy,
            resolution: None,
            review_reason: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Agents participating in the conflict, existing side first.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents = vec![self.existing.agent_id];
        if self.incoming.agent_id != self.existing.agent_id {
            agents.push(self.incoming.agent_id);
        }
        agents
    }

    /// Attach the resolution and close the conflict.
    pub fn resolve(&mut self, result: ResolutionResult) {
        self.strategy = result.policy;
        self.resolution = Some(result);
        self.status = ConflictStatus::Resolved;
        self.resolved_at = Some(Utc::now());
    }

    /// Route the conflict to a caller because the chain could not decide.
    pub fn escalate(&mut self, reason: impl Into<String>) {
        self.status = ConflictStatus::ManualReview;
        self.review_reason = Some(reason.into());
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Age of the conflict relative to `now`.
    pub fn age(&self, now: Timestamp) -> std::time::Duration {
        (now - self.detected_at).to_std().unwrap_or_default()
    }

    /// Time from detection to resolution, if resolved.
    pub fn resolution_latency(&self) -> Option<std::time::Duration> {
        self.resolved_at
            .and_then(|resolved| (resolved - self.detected_at).to_std().ok())
    }
}

/// Classify what the two operations disagree about.
pub fn classify(existing: &SyncOperation, incoming: &SyncOperation) -> ConflictKind {
    if existing.kind == OperationKind::Delete || incoming.kind == OperationKind::Delete {
        ConflictKind::Deletion
    } else if existing.content_hash() != incoming.content_hash() {
        ConflictKind::Content
    } else {
        ConflictKind::Metadata
    }
}

/// Best guess at which policy will decide, shown while a conflict is pending.
fn candidate_strategy(existing: &SyncOperation, incoming: &SyncOperation) -> PolicyKind {
    if existing.agent_id != incoming.agent_id {
        PolicyKind::AgentPriority
    } else if existing.timestamp != incoming.timestamp {
        PolicyKind::RecencyBias
    } else {
        PolicyKind::StabilityFallback
    }
}

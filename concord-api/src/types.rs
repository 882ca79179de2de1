//! Request and response bodies of the REST API.
//!
//! Engine types (`SyncRequest`, `SyncOperation`, `Conflict`, ...) are reused
//! as-is; the types here add the `success` envelope and the admin-only
//! inputs.

use concord_agents::{ConflictSummary, ManualResolution, MetricsSnapshot, SyncOutcome, SyncStatistics};
use concord_core::{
    Conflict, EntityId, ManualStrategy, ResolutionResult, SyncOperation, SyncRequest, SyncStatus,
};
use concord_storage::MemoryRecord;
use serde::{Deserialize, Serialize};

// ============================================================================
// SYNC
// ============================================================================

/// Response to a submitted or forced sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub sync_id: EntityId,
    pub status: SyncStatus,
    /// False when the operation lost its conflict or was superseded
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResolutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub conflict_id: Option<EntityId>,
    /// Record as stored after the write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub record: Option<MemoryRecord>,
    pub duration_ms: u64,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        Self {
            success: true,
            sync_id: outcome.sync_id,
            status: outcome.status,
            applied: outcome.applied,
            result: outcome.result,
            conflict_id: outcome.conflict_id,
            record: outcome.record,
            duration_ms: outcome.duration_ms,
        }
    }
}

/// Current state of one sync operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncStatusResponse {
    pub success: bool,
    pub operation: SyncOperation,
}

/// Administrative write that clears the lock and bypasses conflict routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ForceSyncRequest {
    #[serde(flatten)]
    pub request: SyncRequest,
    /// Priority used by the agent priority policy for this operation
    #[serde(default)]
    pub priority: Option<i32>,
}

// ============================================================================
// CONFLICTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConflictListResponse {
    pub success: bool,
    pub conflicts: Vec<ConflictSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConflictResponse {
    pub success: bool,
    pub conflict: Conflict,
}

/// Manual resolution of an open conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ManualResolveRequest {
    pub strategy: ManualStrategy,
    /// Required for `manual_review`: final content and/or winner
    #[serde(default)]
    pub resolution: ManualResolution,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetricsResponse {
    pub success: bool,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatisticsResponse {
    pub success: bool,
    pub statistics: SyncStatistics,
}

/// Query parameters for GET /api/v1/statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct StatisticsQuery {
    /// Recent operations and resolutions to include (default 20)
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_force_sync_request_flattens_sync_fields() {
        let body = json!({
            "agentId": "persona-agent",
            "memoryId": "style",
            "operation": "update",
            "content": "Be brief.",
            "priority": 0
        });
        let request: ForceSyncRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.request.agent_id, "persona-agent");
        assert_eq!(request.request.memory_id, "style");
        assert_eq!(request.priority, Some(0));
    }

    #[test]
    fn test_manual_resolve_request_defaults_resolution() {
        let request: ManualResolveRequest =
            serde_json::from_value(json!({ "strategy": "latest_wins" })).unwrap();
        assert_eq!(request.strategy, ManualStrategy::LatestWins);
        assert_eq!(request.resolution, ManualResolution::default());
    }

    #[test]
    fn test_manual_resolve_request_rejects_unknown_strategy() {
        let result: Result<ManualResolveRequest, _> =
            serde_json::from_value(json!({ "strategy": "coin_flip" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_response_uses_camel_case() {
        let response = SyncResponse {
            success: true,
            sync_id: concord_core::new_entity_id(),
            status: SyncStatus::Completed,
            applied: true,
            result: None,
            conflict_id: None,
            record: None,
            duration_ms: 3,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("syncId").is_some());
        assert!(value.get("durationMs").is_some());
        assert!(value.get("conflictId").is_none());
    }
}

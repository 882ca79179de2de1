//! OpenAPI Specification for the Concord API
//!
//! Generated with utoipa from the route annotations and the engine types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode, ErrorResponse};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{conflict, health, stats, sync};
use crate::types::*;

use concord_agents::{ConflictSummary, ManualResolution, MetricsSnapshot, SyncStatistics};
use concord_core::{
    AgentId, Conflict, ConflictKind, ConflictStatus, LockData, ManualStrategy, OperationKind,
    PolicyKind, ResolutionResult, ResolvedBy, SyncOperation, SyncRequest, SyncStatus, Winner,
};

/// OpenAPI document for the Concord API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Concord API",
        version = "0.4.0",
        description = "Multi-agent memory conflict resolution: serialized writes, policy-chain conflict resolution and content merging for shared agent memory",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Sync", description = "Submit, inspect and force memory writes"),
        (name = "Conflicts", description = "Open conflicts and manual resolution"),
        (name = "Observability", description = "Engine metrics and statistics"),
        (name = "Health", description = "Liveness and readiness probes"),
    ),
    paths(
        sync::submit_sync,
        sync::get_sync_status,
        sync::force_sync,
        conflict::list_conflicts,
        conflict::get_conflict,
        conflict::resolve_conflict,
        stats::get_metrics,
        stats::get_statistics,
        crate::telemetry::metrics::metrics_handler,
        health::ping,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        // Errors
        ApiError, ErrorCode, ErrorResponse,
        // Requests & responses
        SyncRequest, SyncResponse, SyncStatusResponse, ForceSyncRequest,
        ConflictListResponse, ConflictResponse, ManualResolveRequest, ManualResolution,
        MetricsResponse, StatisticsResponse,
        // Engine types
        SyncOperation, Conflict, ConflictSummary, ResolutionResult, LockData,
        MetricsSnapshot, SyncStatistics,
        AgentId, OperationKind, SyncStatus, ConflictStatus, ConflictKind, Winner,
        PolicyKind, ResolvedBy, ManualStrategy,
        // Health
        HealthResponse, HealthStatus, HealthDetails, ComponentHealth,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Render the document as pretty JSON.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_engine_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/sync",
            "/api/v1/sync/{id}",
            "/api/v1/sync/force",
            "/api/v1/conflicts",
            "/api/v1/conflicts/{id}/resolve",
            "/api/v1/metrics",
            "/metrics",
            "/health/ready",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_openapi_info() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "Concord API");
        assert!(doc.info.license.is_some());
    }

    #[test]
    fn test_openapi_json_includes_schemas() {
        let json = ApiDoc::to_json().unwrap();
        assert!(json.contains("\"SyncRequest\""));
        assert!(json.contains("\"ManualStrategy\""));
        assert!(json.contains("\"ErrorResponse\""));
    }
}

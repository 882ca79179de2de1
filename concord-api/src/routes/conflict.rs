//! Conflict REST API Routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::sync::json_body;
use crate::{
    error::{ApiResult, ErrorResponse},
    state::AppState,
    types::{ConflictListResponse, ConflictResponse, ManualResolveRequest, SyncResponse},
};

/// GET /api/v1/conflicts - Conflicts awaiting resolution, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/conflicts",
    tag = "Conflicts",
    responses(
        (status = 200, description = "Open conflicts", body = ConflictListResponse),
    ),
)]
pub async fn list_conflicts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conflicts = state.engine.list_active_conflicts();
    let total = conflicts.len();
    Json(ConflictListResponse {
        success: true,
        conflicts,
        total,
    })
}

/// GET /api/v1/conflicts/{id} - Full conflict record
#[utoipa::path(
    get,
    path = "/api/v1/conflicts/{id}",
    tag = "Conflicts",
    params(
        ("id" = Uuid, Path, description = "Conflict ID")
    ),
    responses(
        (status = 200, description = "Conflict", body = ConflictResponse),
        (status = 404, description = "Conflict not found", body = ErrorResponse),
    ),
)]
pub async fn get_conflict(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let conflict = state.engine.conflict(Uuid::parse_str(&id)?)?;
    Ok(Json(ConflictResponse {
        success: true,
        conflict,
    }))
}

/// POST /api/v1/conflicts/{id}/resolve - Resolve a conflict manually
#[utoipa::path(
    post,
    path = "/api/v1/conflicts/{id}/resolve",
    tag = "Conflicts",
    params(
        ("id" = Uuid, Path, description = "Conflict ID")
    ),
    request_body = ManualResolveRequest,
    responses(
        (status = 200, description = "Conflict resolved", body = SyncResponse),
        (status = 400, description = "Invalid strategy or missing resolution", body = ErrorResponse),
        (status = 404, description = "Conflict not found", body = ErrorResponse),
        (status = 409, description = "Conflict already resolved", body = ErrorResponse),
    ),
)]
pub async fn resolve_conflict(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ManualResolveRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let conflict_id = Uuid::parse_str(&id)?;
    let ManualResolveRequest {
        strategy,
        resolution,
    } = json_body(payload)?;
    let outcome = state
        .engine
        .resolve_manually(conflict_id, strategy, resolution)
        .await?;
    Ok(Json(SyncResponse::from(outcome)))
}

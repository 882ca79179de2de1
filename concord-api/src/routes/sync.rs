//! Sync REST API Routes
//!
//! Submission, status lookup and forced recovery of sync operations.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use concord_core::SyncRequest;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ErrorResponse},
    state::AppState,
    types::{ForceSyncRequest, SyncResponse, SyncStatusResponse},
};

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_input(rejection.body_text()))
}

/// POST /api/v1/sync - Submit a sync operation
#[utoipa::path(
    post,
    path = "/api/v1/sync",
    tag = "Sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Operation processed", body = SyncResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Lock unavailable or conflict awaiting manual review", body = ErrorResponse),
        (status = 503, description = "Lock store unreachable", body = ErrorResponse),
    ),
)]
pub async fn submit_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = json_body(payload)?;
    let outcome = state.engine.submit(&request).await?;
    Ok(Json(SyncResponse::from(outcome)))
}

/// GET /api/v1/sync/{id} - Current state of a sync operation
#[utoipa::path(
    get,
    path = "/api/v1/sync/{id}",
    tag = "Sync",
    params(
        ("id" = Uuid, Path, description = "Sync operation ID")
    ),
    responses(
        (status = 200, description = "Operation state", body = SyncStatusResponse),
        (status = 400, description = "Malformed ID", body = ErrorResponse),
        (status = 404, description = "Unknown or expired sync ID", body = ErrorResponse),
    ),
)]
pub async fn get_sync_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let sync_id = Uuid::parse_str(&id)?;
    let operation = state.engine.sync_status(sync_id)?;
    Ok(Json(SyncStatusResponse {
        success: true,
        operation,
    }))
}

/// POST /api/v1/sync/force - Clear the memory lock and apply immediately
#[utoipa::path(
    post,
    path = "/api/v1/sync/force",
    tag = "Sync",
    request_body = ForceSyncRequest,
    responses(
        (status = 200, description = "Operation applied", body = SyncResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 503, description = "Lock store unreachable", body = ErrorResponse),
    ),
)]
pub async fn force_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForceSyncRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let ForceSyncRequest { request, priority } = json_body(payload)?;
    let outcome = state.engine.force_sync(&request, priority).await?;
    Ok(Json(SyncResponse::from(outcome)))
}

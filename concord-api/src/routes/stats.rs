//! Engine metrics and statistics routes.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::{ApiResult, ErrorResponse},
    state::AppState,
    types::{MetricsResponse, StatisticsQuery, StatisticsResponse},
};

const DEFAULT_RECENT_LIMIT: usize = 20;

/// GET /api/v1/metrics - Aggregate engine metrics
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Metrics snapshot", body = MetricsResponse),
    ),
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(MetricsResponse {
        success: true,
        metrics: state.engine.metrics().await,
    })
}

/// GET /api/v1/statistics - Locks, in-flight operations and recent outcomes
#[utoipa::path(
    get,
    path = "/api/v1/statistics",
    tag = "Observability",
    params(StatisticsQuery),
    responses(
        (status = 200, description = "Engine statistics", body = StatisticsResponse),
        (status = 503, description = "Lock store unreachable", body = ErrorResponse),
    ),
)]
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(state.engine.config().limits.history_capacity);
    let statistics = state.engine.statistics(limit).await?;
    Ok(Json(StatisticsResponse {
        success: true,
        statistics,
    }))
}

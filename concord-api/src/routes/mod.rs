//! Route assembly for the Concord REST API.

use axum::{
    http::{header, request::Parts, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod conflict;
pub mod health;
pub mod stats;
pub mod sync;

// ============================================================================
// OPENAPI ENDPOINTS
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let allowed = config.clone();
        let origins = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|o| allowed.is_origin_allowed(o))
                .unwrap_or(false)
        });

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the complete API router.
///
/// - Engine routes under /api/v1/*
/// - Health checks under /health/*
/// - Prometheus exposition at /metrics
/// - OpenAPI document at /openapi.json and Swagger UI at /swagger-ui
pub fn create_api_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let api_routes = Router::new()
        .route("/sync", post(sync::submit_sync))
        .route("/sync/force", post(sync::force_sync))
        .route("/sync/:id", get(sync::get_sync_status))
        .route("/conflicts", get(conflict::list_conflicts))
        .route("/conflicts/:id", get(conflict::get_conflict))
        .route("/conflicts/:id/resolve", post(conflict::resolve_conflict))
        .route("/metrics", get(stats::get_metrics))
        .route("/statistics", get(stats::get_statistics));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    #[cfg(feature = "swagger-ui")]
    {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router = router.merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", crate::openapi::ApiDoc::openapi()),
        );
    }

    // Execution order: CORS -> Trace -> Observability -> Handler
    router
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_in_both_modes() {
        let _ = build_cors_layer(&ApiConfig::default());
        let _ = build_cors_layer(&ApiConfig {
            cors_origins: vec!["https://concord.dev".to_string(), "*.concord.dev".to_string()],
            cors_allow_credentials: true,
            ..ApiConfig::default()
        });
    }
}

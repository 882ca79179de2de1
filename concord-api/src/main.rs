//! Concord API server.
//!
//! Runs the sync engine against the in-process lock store and memory backend,
//! sweeping abandoned operations and expired locks on a fixed interval.

use std::sync::Arc;

use axum::Router;
use concord_agents::SyncOrchestrator;
use concord_api::telemetry::{init_tracing, TelemetryConfig};
use concord_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use concord_storage::{InMemoryBackend, InMemoryLockStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ApiConfig::from_env()?;
    let locks = Arc::new(InMemoryLockStore::new());
    let engine = Arc::new(SyncOrchestrator::new(
        config.engine.clone(),
        locks.clone(),
        Arc::new(InMemoryBackend::new()),
    )?);

    let sweeper = tokio::spawn(sweep_abandoned(
        Arc::clone(&engine),
        locks,
        config.sweep_interval,
    ));

    let app: Router = create_api_router(Arc::new(AppState::new(engine)), &config);

    let addr = config.socket_addr();
    tracing::info!(%addr, "Starting Concord API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    sweeper.abort();
    Ok(())
}

async fn sweep_abandoned(
    engine: Arc<SyncOrchestrator>,
    locks: Arc<InMemoryLockStore>,
    period: std::time::Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let evicted = engine.sweep_expired();
        if evicted > 0 {
            tracing::warn!(evicted, "swept abandoned sync operations");
        }
        match locks.purge_expired() {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged expired memory locks"),
            Err(e) => tracing::error!(error = %e, "failed to purge expired memory locks"),
        }
    }
}

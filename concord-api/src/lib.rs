//! Concord API - REST Layer for the Sync Engine
//!
//! Exposes the sync engine over HTTP/JSON:
//! - Sync submission, status lookup and forced recovery
//! - Conflict listing and manual resolution
//! - Engine metrics, statistics and Prometheus exposition
//! - Health probes and the OpenAPI document

pub mod config;
pub mod error;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode, ErrorResponse};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;

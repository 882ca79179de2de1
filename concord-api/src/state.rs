//! Shared application state.

use concord_agents::SyncOrchestrator;
use std::sync::Arc;
use std::time::Instant;

/// State shared by every route handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<SyncOrchestrator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<SyncOrchestrator>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }
}

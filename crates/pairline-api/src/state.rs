//! Shared application state passed to every handler.

use std::sync::Arc;
use std::time::Instant;

use pairline_core::config::AppConfig;
use pairline_realtime::server::RealtimeEngine;

/// Application state available to all handlers via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// WebSocket realtime engine
    pub realtime: Arc<RealtimeEngine>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, realtime: RealtimeEngine) -> Self {
        Self {
            config: Arc::new(config),
            realtime: Arc::new(realtime),
            started_at: Instant::now(),
        }
    }
}

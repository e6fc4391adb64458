//! Health check handlers.

use axum::Json;
use axum::extract::State;
use tracing::warn;

use crate::dto::response::{ApiResponse, DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let connections = &state.realtime.connections;
    let store_ok = match connections.store().health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(error = %e, "Presence store health check failed");
            false
        }
    };

    Json(ApiResponse::ok(DetailedHealthResponse {
        status: if store_ok { "ok" } else { "degraded" }.to_string(),
        store_provider: state.config.store.provider.clone(),
        store: if store_ok { "connected" } else { "unreachable" }.to_string(),
        bridge_provider: state.config.bridge.provider.clone(),
        ws_connections: connections.connection_count(),
        online_users: connections.user_count(),
        active_rooms: connections.room_count(),
        pending_timeouts: connections.pending_timeouts(),
        metrics: state.realtime.metrics.snapshot(),
    }))
}

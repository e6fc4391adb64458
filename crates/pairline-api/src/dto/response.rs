//! Response DTOs.

use serde::{Deserialize, Serialize};

use pairline_realtime::metrics::MetricsSnapshot;

/// Standard API success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// Overall status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Presence store provider.
    pub store_provider: String,
    /// Presence store status.
    pub store: String,
    /// Bridge provider.
    pub bridge_provider: String,
    /// Open WebSocket connections.
    pub ws_connections: usize,
    /// Authenticated users.
    pub online_users: usize,
    /// Rooms joined on this process.
    pub active_rooms: usize,
    /// Pending match timeouts.
    pub pending_timeouts: usize,
    /// Engine counters.
    pub metrics: MetricsSnapshot,
}

//! Real-time WebSocket engine configuration.

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound buffer size per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Seconds without any inbound frame before a connection is closed.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// How often the liveness monitor checks each connection.
    #[serde(default = "default_liveness_interval")]
    pub liveness_check_interval_seconds: u64,
    /// Largest accepted inbound frame.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Longest accepted chat message, in characters.
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
    /// Maximum simultaneous WebSocket connections per user.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            liveness_check_interval_seconds: default_liveness_interval(),
            max_message_bytes: default_max_message_bytes(),
            max_chat_length: default_max_chat_length(),
            max_connections_per_user: default_max_connections_per_user(),
        }
    }
}

fn default_channel_buffer() -> usize {
    256
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_liveness_interval() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    65_536
}

fn default_max_chat_length() -> usize {
    1000
}

fn default_max_connections_per_user() -> usize {
    3
}

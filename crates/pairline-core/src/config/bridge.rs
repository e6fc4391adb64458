//! Cross-process notification bridge configuration.

use serde::{Deserialize, Serialize};

/// Pub/sub bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge provider: `"memory"` (single process) or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Pub/sub channel name.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Local fan-out buffer for received events.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Redis connection URL (redis provider only).
    #[serde(default = "super::store::default_redis_url")]
    pub redis_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            channel: default_channel(),
            buffer_size: default_buffer_size(),
            redis_url: super::store::default_redis_url(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_channel() -> String {
    "pubsub:presence".to_string()
}

fn default_buffer_size() -> usize {
    1024
}

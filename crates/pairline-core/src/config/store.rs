//! Presence store configuration.

use serde::{Deserialize, Serialize};

/// Top-level presence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store provider: `"memory"` (single process) or `"redis"` (multi-process).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Seconds a presence record survives without a refresh.
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_seconds: u64,
    /// Redis-specific settings.
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            presence_ttl_seconds: default_presence_ttl(),
            redis: RedisStoreConfig::default(),
        }
    }
}

/// Redis presence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all Pairline keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_presence_ttl() -> u64 {
    30
}

pub(crate) fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "pairline:".to_string()
}

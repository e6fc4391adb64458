//! Cross-process notification bridge: transports and the local consumer.

pub mod event_bridge;
pub mod memory_pubsub;
#[cfg(feature = "redis-bridge")]
pub mod redis_pubsub;

use std::sync::Arc;

use tracing::info;

use pairline_core::config::BridgeConfig;
use pairline_core::error::AppError;
use pairline_core::result::AppResult;
use pairline_core::traits::NotificationBridge;

pub use event_bridge::EventBridge;
pub use memory_pubsub::MemoryBridge;
#[cfg(feature = "redis-bridge")]
pub use redis_pubsub::RedisBridge;

/// Build the bridge transport selected by `config.provider`.
pub async fn connect(config: &BridgeConfig) -> AppResult<Arc<dyn NotificationBridge>> {
    match config.provider.as_str() {
        "memory" => {
            info!("Initializing in-memory notification bridge");
            Ok(Arc::new(MemoryBridge::new(config.buffer_size)))
        }
        #[cfg(feature = "redis-bridge")]
        "redis" => {
            info!(channel = %config.channel, "Initializing Redis notification bridge");
            Ok(Arc::new(RedisBridge::connect(config).await?))
        }
        other => Err(AppError::configuration(format!(
            "Unknown bridge provider: '{other}'. Supported: memory, redis"
        ))),
    }
}

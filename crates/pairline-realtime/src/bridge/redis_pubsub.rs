//! Redis pub/sub bridge for multi-process deployments.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pairline_core::config::BridgeConfig;
use pairline_core::error::{AppError, ErrorKind};
use pairline_core::events::BridgeEvent;
use pairline_core::result::AppResult;
use pairline_core::traits::NotificationBridge;

/// Redis pub/sub bridge for cross-process match/end notifications.
///
/// Publishes on a multiplexed connection and listens on a dedicated
/// subscription connection, fanning decoded events out to local receivers.
#[derive(Debug)]
pub struct RedisBridge {
    publisher: ConnectionManager,
    channel: String,
    tx: broadcast::Sender<BridgeEvent>,
    listener: JoinHandle<()>,
}

impl RedisBridge {
    /// Connects both the publisher and the subscriber.
    pub async fn connect(config: &BridgeConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(bridge_err("Failed to create Redis bridge client"))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(bridge_err("Failed to connect Redis bridge publisher"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(bridge_err("Failed to open Redis bridge subscription"))?;
        pubsub
            .subscribe(config.channel.as_str())
            .await
            .map_err(bridge_err("Failed to subscribe to Redis bridge channel"))?;

        let (tx, _) = broadcast::channel(config.buffer_size.max(1));
        let listener = tokio::spawn(listen(pubsub, tx.clone(), config.channel.clone()));

        info!(channel = %config.channel, "Redis bridge connected");
        Ok(Self {
            publisher,
            channel: config.channel.clone(),
            tx,
            listener,
        })
    }
}

fn bridge_err(message: &'static str) -> impl FnOnce(redis::RedisError) -> AppError {
    move |e| AppError::with_source(ErrorKind::Store, message, e)
}

async fn listen(pubsub: PubSub, tx: broadcast::Sender<BridgeEvent>, channel: String) {
    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Unreadable bridge payload");
                continue;
            }
        };
        match payload.parse::<BridgeEvent>() {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!(channel = %channel, payload = %payload, error = %e, "Ignoring bridge message"),
        }
    }
    warn!(channel = %channel, "Redis bridge subscription ended");
}

#[async_trait]
impl NotificationBridge for RedisBridge {
    async fn publish(&self, event: &BridgeEvent) -> AppResult<()> {
        let mut conn = self.publisher.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(event.encode())
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Store, "Redis PUBLISH failed", e))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Drop for RedisBridge {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

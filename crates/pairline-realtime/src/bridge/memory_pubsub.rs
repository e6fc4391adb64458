//! In-memory notification bridge for single-process deployments and tests.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use pairline_core::events::BridgeEvent;
use pairline_core::result::AppResult;
use pairline_core::traits::NotificationBridge;

/// In-memory pub/sub implementation.
///
/// Clones share one channel, so several engines in one process behave like
/// several processes on one Redis channel.
#[derive(Debug, Clone)]
pub struct MemoryBridge {
    tx: broadcast::Sender<BridgeEvent>,
}

impl MemoryBridge {
    /// Create a new in-memory bridge
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }
}

#[async_trait]
impl NotificationBridge for MemoryBridge {
    async fn publish(&self, event: &BridgeEvent) -> AppResult<()> {
        // No subscribers is not an error.
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        trace!(event = %event, receivers, "Bridge event published");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

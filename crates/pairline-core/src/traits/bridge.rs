//! Cross-process notification bridge trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events::BridgeEvent;
use crate::result::AppResult;

/// Append-only publish/subscribe channel shared by all server processes.
///
/// Publishers also receive their own events; consumers must handle
/// duplicates idempotently.
#[async_trait]
pub trait NotificationBridge: Send + Sync + std::fmt::Debug + 'static {
    /// Publish an event to every process.
    async fn publish(&self, event: &BridgeEvent) -> AppResult<()>;

    /// Receive every event published after this call.
    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent>;
}

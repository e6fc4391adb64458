//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use pairline_core::config::{MatchingConfig, RealtimeConfig};
use pairline_core::error::AppError;
use pairline_core::traits::{NotificationBridge, PresenceStore};

use crate::connection::liveness::LivenessMonitor;
use crate::connection::manager::ConnectionManager;
use crate::metrics::RealtimeMetrics;

/// Central real-time engine that coordinates all WebSocket subsystems.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Cross-process notification bridge.
    pub bridge: Arc<dyn NotificationBridge>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates the engine and starts its background tasks (bridge consumer
    /// and liveness monitor). Must be called inside a Tokio runtime.
    pub fn new(
        config: RealtimeConfig,
        matching: MatchingConfig,
        store: Arc<dyn PresenceStore>,
        bridge: Arc<dyn NotificationBridge>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let metrics = Arc::new(RealtimeMetrics::new());
        let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_seconds);
        let check_interval = Duration::from_secs(config.liveness_check_interval_seconds.max(1));
        let connections = Arc::new(ConnectionManager::new(
            config,
            matching,
            store,
            bridge.clone(),
            metrics.clone(),
        ));

        connections
            .events()
            .clone()
            .spawn(bridge.as_ref(), shutdown_tx.subscribe());
        LivenessMonitor::new(connections.pool().clone(), heartbeat_timeout, check_interval)
            .spawn(shutdown_tx.subscribe());

        info!("Real-time engine initialized");

        Self {
            connections,
            bridge,
            metrics,
            shutdown_tx,
        }
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the real-time engine.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Shutting down real-time engine");

        // Signal all tasks to stop
        let _ = self.shutdown_tx.send(());

        // Close all connections
        self.connections.close_all();

        info!("Real-time engine shut down");
        Ok(())
    }
}

//! Idle-connection sweeper.
//!
//! Clients refresh liveness with `heartbeat` (any inbound frame counts). A
//! connection silent for longer than the heartbeat timeout is closed; its
//! socket task then runs the normal disconnect cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

use super::pool::ConnectionPool;

/// Periodically closes connections that stopped sending frames.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    pool: Arc<ConnectionPool>,
    timeout: chrono::Duration,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(pool: Arc<ConnectionPool>, timeout: Duration, interval: Duration) -> Self {
        Self {
            pool,
            timeout: chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365)),
            interval,
        }
    }

    /// Run the sweep loop until shutdown.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            debug!("Liveness monitor stopped");
        })
    }

    /// Close every idle connection; returns how many were closed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut closed = 0;
        for conn in self.pool.all_connections() {
            if !conn.is_alive() {
                continue;
            }
            let idle = conn.idle_for(now).await;
            if idle > self.timeout {
                warn!(
                    conn_id = %conn.id,
                    idle_ms = idle.num_milliseconds(),
                    "Connection heartbeat timeout, closing"
                );
                conn.close();
                closed += 1;
            }
        }
        closed
    }
}

//! Bounded wait for filtered searches.
//!
//! A requester queued with a `male`/`female` preference gets `match:timeout`
//! if it is still waiting once the wait elapses. Each connection has at most
//! one pending timer; arming again or cancelling supersedes the previous one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pairline_core::traits::PresenceStore;
use pairline_core::types::{GenderPreference, PresenceStatus, UserId};

use crate::connection::handle::{ConnectionHandle, ConnectionId};
use crate::message::types::OutboundMessage;
use crate::metrics::RealtimeMetrics;

#[derive(Debug)]
struct Pending {
    generation: u64,
    token: CancellationToken,
}

/// Everything a fired timer needs to decide and notify.
#[derive(Debug, Clone)]
pub struct TimeoutTarget {
    pub handle: Arc<ConnectionHandle>,
    pub user_id: UserId,
    pub filter: GenderPreference,
}

/// Per-connection match timeout timers.
#[derive(Debug, Clone)]
pub struct MatchTimeoutScheduler {
    pending: Arc<DashMap<ConnectionId, Pending>>,
    generation: Arc<AtomicU64>,
    store: Arc<dyn PresenceStore>,
    metrics: Arc<RealtimeMetrics>,
}

impl MatchTimeoutScheduler {
    pub fn new(store: Arc<dyn PresenceStore>, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            store,
            metrics,
        }
    }

    /// Start (or restart) the timer for a connection.
    pub fn arm(&self, target: TimeoutTarget, delay: Duration) {
        let conn_id = target.handle.id;
        self.cancel(&conn_id);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        self.pending.insert(
            conn_id,
            Pending {
                generation,
                token: token.clone(),
            },
        );

        let pending = self.pending.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            pending.remove_if(&conn_id, |_, p| p.generation == generation);
            fire(target, store.as_ref(), &metrics).await;
        });
    }

    /// Cancel the pending timer for a connection, if any.
    pub fn cancel(&self, conn_id: &ConnectionId) -> bool {
        match self.pending.remove(conn_id) {
            Some((_, pending)) => {
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Client-facing text of a timeout notification.
pub fn timeout_message(filter: GenderPreference) -> String {
    format!("No {filter} users available right now. Try \"Random\" or wait.")
}

async fn fire(target: TimeoutTarget, store: &dyn PresenceStore, metrics: &RealtimeMetrics) {
    if !target.handle.is_alive() {
        return;
    }
    match store.read_presence(&target.user_id).await {
        Ok(Some(presence))
            if presence.status == PresenceStatus::Available && !presence.is_in_room() =>
        {
            info!(
                conn_id = %target.handle.id,
                user_id = %target.user_id,
                filter = %target.filter,
                "Match search timed out"
            );
            metrics.match_timed_out();
            target.handle.send(OutboundMessage::MatchTimeout {
                filter: target.filter,
                message: timeout_message(target.filter),
            });
        }
        Ok(_) => {
            debug!(user_id = %target.user_id, "Timer fired but user no longer waiting");
        }
        Err(e) => {
            warn!(user_id = %target.user_id, error = %e, "Timer could not read presence");
        }
    }
}

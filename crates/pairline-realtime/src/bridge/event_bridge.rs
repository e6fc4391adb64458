//! Cross-process event consumer.
//!
//! Applies `matched` / `ended` notifications published by any process
//! (including this one) to the connections held locally. Handling is
//! idempotent: a match is only routed while the user's presence record still
//! points at that room, a connection already bound to it is skipped, and an
//! ended room is only announced to connections still bound to it.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pairline_core::events::{BridgeEvent, EndReason};
use pairline_core::traits::NotificationBridge;
use pairline_core::types::{RoomId, UserId};

use crate::connection::handle::RoomBinding;
use crate::connection::pool::ConnectionPool;
use crate::matching::engine::MatchingEngine;
use crate::matching::timeout::MatchTimeoutScheduler;
use crate::message::types::OutboundMessage;
use crate::room::chat::{CHAT_ENDED, ChatService, USER_DISCONNECTED};
use crate::room::registry::RoomRegistry;

/// Routes bridge events to local connections.
#[derive(Debug)]
pub struct EventBridge {
    pool: Arc<ConnectionPool>,
    registry: Arc<RoomRegistry>,
    engine: MatchingEngine,
    timeouts: MatchTimeoutScheduler,
}

impl EventBridge {
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: Arc<RoomRegistry>,
        engine: MatchingEngine,
        timeouts: MatchTimeoutScheduler,
    ) -> Self {
        Self {
            pool,
            registry,
            engine,
            timeouts,
        }
    }

    /// Consume events from `bridge` until shutdown.
    pub fn spawn(
        self: Arc<Self>,
        bridge: &dyn NotificationBridge,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut events = bridge.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            self.handle_event(&event).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Bridge consumer lagged, events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Bridge consumer stopped");
        })
    }

    /// Apply one event; returns how many local connections were notified.
    pub async fn handle_event(&self, event: &BridgeEvent) -> usize {
        match event {
            BridgeEvent::Matched {
                room_id,
                user_a,
                user_b,
            } => {
                self.deliver_match(room_id, user_a, user_b).await
                    + self.deliver_match(room_id, user_b, user_a).await
            }
            BridgeEvent::Ended {
                room_id,
                ended_by,
                reason,
            } => self.deliver_end(room_id, ended_by.as_ref(), *reason).await,
        }
    }

    async fn deliver_match(&self, room_id: &RoomId, user: &UserId, peer: &UserId) -> usize {
        let connections = self.pool.user_connections(user);
        if connections.is_empty() {
            return 0;
        }

        // The store is authoritative: a late or duplicate event for a room
        // the user has already left must not rebind its connections.
        match self.engine.presence(user).await {
            Ok(Some(presence)) if presence.current_room_id.as_ref() == Some(room_id) => {}
            Ok(_) => {
                debug!(room_id = %room_id, user_id = %user, "Match event no longer current, ignored");
                return 0;
            }
            Err(e) => {
                warn!(room_id = %room_id, user_id = %user, error = %e, "Could not verify match event, ignored");
                return 0;
            }
        }

        let peer_username = self.engine.display_name(peer).await;
        let mut notified = 0;
        for conn in connections {
            let binding = RoomBinding {
                room_id: room_id.clone(),
                peer_id: Some(peer.clone()),
            };
            if !conn.bind_room(binding).await {
                continue;
            }
            self.timeouts.cancel(&conn.id);
            conn.send(OutboundMessage::MatchFound {
                peer_id: peer.clone(),
                peer_username: peer_username.clone(),
                room_id: room_id.clone(),
            });
            notified += 1;
        }
        if notified > 0 {
            info!(room_id = %room_id, user_id = %user, notified, "Delivered match");
        }
        notified
    }

    async fn deliver_end(
        &self,
        room_id: &RoomId,
        ended_by: Option<&UserId>,
        reason: EndReason,
    ) -> usize {
        let notice = match reason {
            EndReason::Ended => CHAT_ENDED,
            EndReason::Disconnected => USER_DISCONNECTED,
        };

        let mut notified = 0;
        for conn in self.pool.all_connections() {
            if conn.clear_room_if(room_id).await.is_none() {
                continue;
            }
            self.registry.leave_room(room_id, &conn.id);
            self.timeouts.cancel(&conn.id);

            // The other side learns the peer is gone before the room notice.
            if conn.user_id().await.as_ref() != ended_by {
                conn.send(OutboundMessage::RtcPeerLeft);
            }
            conn.send(ChatService::system(room_id, notice));
            notified += 1;
        }
        if notified > 0 {
            info!(room_id = %room_id, reason = reason.as_str(), notified, "Delivered room end");
        }
        notified
    }
}

//! Individual WebSocket connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pairline_core::types::{Gender, RoomId, UserId};

use crate::message::types::OutboundMessage;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// Identity bound to a connection by `auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: Option<String>,
    pub gender: Gender,
}

impl Identity {
    /// Name shown to a peer.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// The room a connection has been matched into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBinding {
    pub room_id: RoomId,
    /// Unknown when the binding was restored on reconnect.
    pub peer_id: Option<UserId>,
}

/// A handle to a single WebSocket connection.
///
/// Holds the sender channel for pushing messages to the client, the
/// identity established by `auth`, and the room binding established by a
/// match.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Sender for outbound messages
    sender: mpsc::Sender<OutboundMessage>,
    identity: RwLock<Option<Identity>>,
    room: RwLock<Option<RoomBinding>>,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Last inbound frame
    last_activity: RwLock<DateTime<Utc>>,
    alive: AtomicBool,
    /// Cancelled when the server wants the socket closed.
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new, unauthenticated connection handle
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender,
            identity: RwLock::new(None),
            room: RwLock::new(None),
            connected_at: now,
            last_activity: RwLock::new(now),
            alive: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue an outbound message for this connection
    pub fn send(&self, msg: OutboundMessage) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(msg) {
            Ok(_) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    event = msg.event_name(),
                    "Connection send buffer full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Ask the socket task to close this connection.
    pub fn close(&self) {
        self.mark_dead();
        self.shutdown.cancel();
    }

    /// Token cancelled by [`close`](Self::close).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Update last activity timestamp
    pub async fn touch(&self) {
        let mut la = self.last_activity.write().await;
        *la = Utc::now();
    }

    /// Time since the last inbound frame.
    pub async fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - *self.last_activity.read().await
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }

    pub async fn user_id(&self) -> Option<UserId> {
        self.identity.read().await.as_ref().map(|i| i.user_id.clone())
    }

    pub async fn set_identity(&self, identity: Identity) {
        *self.identity.write().await = Some(identity);
    }

    pub async fn room(&self) -> Option<RoomBinding> {
        self.room.read().await.clone()
    }

    pub async fn room_id(&self) -> Option<RoomId> {
        self.room.read().await.as_ref().map(|b| b.room_id.clone())
    }

    /// Bind to a room, replacing any other binding. Returns `false` if
    /// already bound to that room.
    pub async fn bind_room(&self, binding: RoomBinding) -> bool {
        let mut room = self.room.write().await;
        if room.as_ref().map(|b| &b.room_id) == Some(&binding.room_id) {
            return false;
        }
        *room = Some(binding);
        true
    }

    /// Clear the binding if it refers to `room_id`.
    pub async fn clear_room_if(&self, room_id: &RoomId) -> Option<RoomBinding> {
        let mut room = self.room.write().await;
        if room.as_ref().map(|b| &b.room_id) == Some(room_id) {
            room.take()
        } else {
            None
        }
    }

    pub async fn take_room(&self) -> Option<RoomBinding> {
        self.room.write().await.take()
    }
}

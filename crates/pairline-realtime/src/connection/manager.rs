//! Connection manager: handles connection lifecycle and routes every
//! inbound protocol event to the matching, room, relay and chat services.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pairline_core::config::{MatchingConfig, RealtimeConfig};
use pairline_core::error::AppError;
use pairline_core::events::{BridgeEvent, EndReason};
use pairline_core::traits::{NotificationBridge, PresenceStore};
use pairline_core::types::{
    Gender, GenderPreference, MatchAttempt, MatchOutcome, PresenceUpdate, RoomId, StatusUpdate,
    UserId,
};

use crate::bridge::event_bridge::EventBridge;
use crate::matching::engine::MatchingEngine;
use crate::matching::timeout::{MatchTimeoutScheduler, TimeoutTarget};
use crate::message::types::{AuthPayload, InboundMessage, OutboundMessage, ProtocolError};
use crate::message::validator::validate_inbound;
use crate::metrics::RealtimeMetrics;
use crate::room::chat::{ChatService, USER_DISCONNECTED};
use crate::room::registry::{JoinOutcome, RoomRegistry};
use crate::signaling::relay::SignalingRelay;

use super::handle::{ConnectionHandle, ConnectionId, Identity, RoomBinding};
use super::pool::ConnectionPool;

const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
const VALIDATION: &str = "VALIDATION";
const NOT_IN_ROOM: &str = "NOT_IN_ROOM";
const NOT_AUTHENTICATED: &str = "not-authenticated";

/// Manages all active WebSocket connections.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Connection pool.
    pool: Arc<ConnectionPool>,
    /// Rooms joined on this process.
    registry: Arc<RoomRegistry>,
    relay: SignalingRelay,
    engine: MatchingEngine,
    timeouts: MatchTimeoutScheduler,
    chat: ChatService,
    /// Local delivery of match/end notifications.
    events: Arc<EventBridge>,
    store: Arc<dyn PresenceStore>,
    bridge: Arc<dyn NotificationBridge>,
    metrics: Arc<RealtimeMetrics>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        matching: MatchingConfig,
        store: Arc<dyn PresenceStore>,
        bridge: Arc<dyn NotificationBridge>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let pool = Arc::new(ConnectionPool::new());
        let registry = Arc::new(RoomRegistry::new());
        let relay = SignalingRelay::new(registry.clone(), pool.clone(), metrics.clone());
        let engine = MatchingEngine::new(store.clone(), matching);
        let timeouts = MatchTimeoutScheduler::new(store.clone(), metrics.clone());
        let events = Arc::new(EventBridge::new(
            pool.clone(),
            registry.clone(),
            engine.clone(),
            timeouts.clone(),
        ));

        Self {
            pool,
            registry,
            relay,
            engine,
            timeouts,
            chat: ChatService::new(config.max_chat_length),
            events,
            store,
            bridge,
            metrics,
            config,
        }
    }

    /// Registers a new, unauthenticated connection.
    ///
    /// Returns the connection handle and a receiver for outbound messages.
    pub fn register(&self) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(tx));

        self.pool.add(handle.clone());
        self.metrics.connection_opened();
        debug!(conn_id = %handle.id, "WebSocket connection registered");

        (handle, rx)
    }

    /// Unregisters a connection and runs disconnect cleanup.
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub async fn unregister(&self, conn_id: &ConnectionId) {
        let Some(handle) = self.pool.get(conn_id) else {
            return;
        };
        let identity = handle.identity().await;
        let user_id = identity.as_ref().map(|i| &i.user_id);
        let Some(handle) = self.pool.remove(conn_id, user_id) else {
            return;
        };

        handle.mark_dead();
        self.timeouts.cancel(conn_id);
        self.metrics.connection_closed();

        let Some(identity) = identity else {
            debug!(conn_id = %conn_id, "Unauthenticated connection closed");
            return;
        };
        let user_id = identity.user_id;
        let last_connection = self.pool.user_connections(&user_id).is_empty();

        if let Some(binding) = handle.take_room().await {
            self.leave_on_disconnect(&handle, &user_id, binding, last_connection)
                .await;
        }
        // Rooms whose binding was already cleared by the peer leaving.
        let stray = self.registry.leave_all(conn_id);
        if !stray.is_empty() {
            debug!(conn_id = %conn_id, rooms = stray.len(), "Left stale room memberships");
        }

        if last_connection {
            if let Err(e) = self.store.mark_offline(&user_id).await {
                error!(user_id = %user_id, error = %e, "Failed to mark user offline");
            }
        }

        info!(
            conn_id = %conn_id,
            user_id = %user_id,
            last_connection,
            "WebSocket connection unregistered"
        );
    }

    async fn leave_on_disconnect(
        &self,
        handle: &ConnectionHandle,
        user_id: &UserId,
        binding: RoomBinding,
        last_connection: bool,
    ) {
        let room_id = binding.room_id;
        let outcome = self.registry.leave_room(&room_id, &handle.id);
        if !last_connection {
            // The user is still present on another connection.
            return;
        }

        let mut peer_id = binding.peer_id;
        let mut targets: HashMap<ConnectionId, Arc<ConnectionHandle>> = HashMap::new();
        for conn_id in &outcome.remaining {
            let Some(conn) = self.pool.get(conn_id) else {
                continue;
            };
            match conn.user_id().await {
                Some(other) if &other != user_id => {
                    peer_id.get_or_insert(other);
                    targets.insert(conn.id, conn);
                }
                _ => {}
            }
        }
        if peer_id.is_none() {
            peer_id = self.stored_peer(user_id, &room_id).await;
        }

        let mut peer_is_local = false;
        if let Some(peer_id) = &peer_id {
            for conn in self.pool.user_connections(peer_id) {
                peer_is_local = true;
                if conn.room_id().await.as_ref() == Some(&room_id) {
                    targets.insert(conn.id, conn);
                }
            }
        }

        for conn in targets.values() {
            conn.clear_room_if(&room_id).await;
            conn.send(OutboundMessage::RtcPeerLeft);
            conn.send(ChatService::system(&room_id, USER_DISCONNECTED));
        }
        self.metrics.message_sent_count(2 * targets.len() as u64);

        if let Some(peer_id) = &peer_id {
            if let Err(e) = self.store.release_room(peer_id, &room_id).await {
                error!(user_id = %peer_id, room_id = %room_id, error = %e, "Failed to release peer");
            }
        }
        if !peer_is_local {
            self.publish(BridgeEvent::Ended {
                room_id: room_id.clone(),
                ended_by: Some(user_id.clone()),
                reason: EndReason::Disconnected,
            })
            .await;
        }
        self.metrics.room_ended();

        info!(
            user_id = %user_id,
            room_id = %room_id,
            notified = targets.len(),
            "User disconnected mid-room"
        );
    }

    /// The other member of `room_id` as recorded by the match commit.
    async fn stored_peer(&self, user_id: &UserId, room_id: &RoomId) -> Option<UserId> {
        match self.store.read_presence(user_id).await {
            Ok(presence) => presence.and_then(|p| p.peer_in(room_id).cloned()),
            Err(e) => {
                warn!(user_id = %user_id, room_id = %room_id, error = %e, "Could not read room peer");
                None
            }
        }
    }

    /// Processes an inbound text frame from a client.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw_message: &str) {
        let Some(handle) = self.pool.get(conn_id) else {
            warn!(conn_id = %conn_id, "Message from unknown connection");
            return;
        };

        handle.touch().await;
        self.metrics.message_received();

        if let Err(e) = validate_inbound(raw_message, self.config.max_message_bytes) {
            handle.send(OutboundMessage::error(INVALID_MESSAGE, e.message));
            return;
        }

        let msg = match InboundMessage::parse(raw_message) {
            Ok(msg) => msg,
            Err(err) => {
                self.reject(&handle, err);
                return;
            }
        };

        match msg {
            InboundMessage::Auth(auth) => self.authenticate(&handle, auth).await,
            InboundMessage::Heartbeat => self.heartbeat(&handle).await,
            InboundMessage::MatchRequest { preference } => {
                self.request_match(&handle, preference).await;
            }
            InboundMessage::MatchCancel => self.cancel_match(&handle).await,
            InboundMessage::RoomJoin { room_id } => self.join_room(&handle, room_id).await,
            InboundMessage::Signal { kind, payload } => {
                self.relay.relay(&handle.id, kind, payload);
            }
            InboundMessage::RtcLeave { room_id } => self.leave_room(&handle, &room_id).await,
            InboundMessage::EndRoom { room_id } => self.end_room(&handle, &room_id).await,
            InboundMessage::ChatSend { room_id, text } => {
                self.send_chat(&handle, &room_id, &text).await;
            }
        }
    }

    fn reject(&self, handle: &ConnectionHandle, err: ProtocolError) {
        match &err {
            ProtocolError::MissingField { event: "auth", .. } => {
                handle.send(OutboundMessage::AuthError("missing-user-id".to_string()));
            }
            _ if err.is_relay() => {
                warn!(conn_id = %handle.id, reason = %err, "Dropping malformed signaling message");
                self.metrics.signal_dropped();
            }
            ProtocolError::MissingField { .. } => {
                handle.send(OutboundMessage::error(VALIDATION, err.to_string()));
            }
            ProtocolError::Malformed(_) | ProtocolError::UnknownEvent(_) => {
                debug!(conn_id = %handle.id, reason = %err, "Rejected inbound frame");
                handle.send(OutboundMessage::error(INVALID_MESSAGE, err.to_string()));
            }
        }
    }

    fn store_failure(&self, handle: &ConnectionHandle, action: &str, err: &AppError) {
        error!(conn_id = %handle.id, error = %err, "Presence store failure during {action}");
        handle.send(OutboundMessage::error(
            err.code(),
            format!("Failed to {action}, please retry"),
        ));
    }

    async fn authenticate(&self, handle: &Arc<ConnectionHandle>, auth: AuthPayload) {
        if let Some(existing) = handle.identity().await {
            if existing.user_id != auth.user_id {
                handle.send(OutboundMessage::AuthError("already-authenticated".to_string()));
                return;
            }
        }

        let gender = Gender::parse_lossy(auth.gender.as_deref());
        let user_id = auth.user_id;
        handle
            .set_identity(Identity {
                user_id: user_id.clone(),
                username: auth.username.clone(),
                gender,
            })
            .await;

        let evicted = self
            .pool
            .bind_user(&user_id, handle, self.config.max_connections_per_user);
        for old in evicted {
            info!(
                conn_id = %old.id,
                user_id = %user_id,
                max = self.config.max_connections_per_user,
                "User at max connections, closing oldest"
            );
            old.close();
        }

        let update = PresenceUpdate {
            status: StatusUpdate::AvailableUnlessMatched,
            connection_id: Some(handle.id.to_string()),
            username: auth.username,
            gender: Some(gender),
            gender_preference: None,
            last_seen_at: Some(Utc::now().timestamp_millis()),
        };
        if let Err(e) = self.store.upsert_presence(&user_id, update).await {
            self.store_failure(handle, "register presence", &e);
            return;
        }

        // A reconnect inside a live room keeps its binding.
        match self.store.read_presence(&user_id).await {
            Ok(Some(presence)) => {
                if let Some(room_id) = presence.current_room_id {
                    debug!(user_id = %user_id, room_id = %room_id, "Restored room binding");
                    handle
                        .bind_room(RoomBinding {
                            room_id,
                            peer_id: presence.peer_id,
                        })
                        .await;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not read presence after auth");
            }
        }

        info!(conn_id = %handle.id, user_id = %user_id, gender = %gender, "Authenticated");
        handle.send(OutboundMessage::AuthOk);
    }

    async fn heartbeat(&self, handle: &ConnectionHandle) {
        let Some(identity) = handle.identity().await else {
            return;
        };
        let now = Utc::now().timestamp_millis();
        match self.store.touch(&identity.user_id, now).await {
            Ok(true) => {}
            Ok(false) => {
                // The record expired; recreate it.
                let update = PresenceUpdate {
                    status: StatusUpdate::AvailableUnlessMatched,
                    connection_id: Some(handle.id.to_string()),
                    username: identity.username.clone(),
                    gender: Some(identity.gender),
                    gender_preference: None,
                    last_seen_at: Some(now),
                };
                if let Err(e) = self.store.upsert_presence(&identity.user_id, update).await {
                    self.store_failure(handle, "refresh presence", &e);
                }
            }
            Err(e) => self.store_failure(handle, "refresh presence", &e),
        }
    }

    async fn request_match(&self, handle: &Arc<ConnectionHandle>, preference: GenderPreference) {
        let Some(identity) = handle.identity().await else {
            handle.send(OutboundMessage::MatchError(NOT_AUTHENTICATED.to_string()));
            return;
        };
        self.timeouts.cancel(&handle.id);

        let attempt = self
            .engine
            .request_match(&identity.user_id, identity.gender, preference)
            .await;

        match attempt {
            Err(e) => {
                error!(user_id = %identity.user_id, error = %e, "Match attempt failed");
                handle.send(OutboundMessage::MatchError("internal-error".to_string()));
            }
            Ok(MatchAttempt::AlreadyInRoom) => {
                handle.send(OutboundMessage::MatchError("already-in-room".to_string()));
            }
            Ok(MatchAttempt::Completed(MatchOutcome::Matched { peer_id, room_id })) => {
                self.metrics.match_made();
                let event = BridgeEvent::Matched {
                    room_id,
                    user_a: identity.user_id,
                    user_b: peer_id,
                };
                let notified = self.events.handle_event(&event).await;
                self.metrics.message_sent_count(notified as u64);
                self.publish(event).await;
            }
            Ok(MatchAttempt::Completed(MatchOutcome::NotMatched { reason })) => {
                self.metrics.match_queued();
                debug!(user_id = %identity.user_id, reason = %reason, "Queued");
                handle.send(OutboundMessage::MatchQueued { filter: preference });
                if preference.is_filtered() {
                    self.timeouts.arm(
                        TimeoutTarget {
                            handle: handle.clone(),
                            user_id: identity.user_id,
                            filter: preference,
                        },
                        self.engine.config().match_timeout(),
                    );
                }
            }
        }
    }

    async fn cancel_match(&self, handle: &ConnectionHandle) {
        let Some(identity) = handle.identity().await else {
            handle.send(OutboundMessage::MatchError(NOT_AUTHENTICATED.to_string()));
            return;
        };
        self.timeouts.cancel(&handle.id);
        if let Err(e) = self
            .store
            .remove_from_pool(identity.gender, &identity.user_id)
            .await
        {
            self.store_failure(handle, "cancel match", &e);
            return;
        }
        debug!(user_id = %identity.user_id, "Match request cancelled");
    }

    async fn join_room(&self, handle: &ConnectionHandle, room_id: RoomId) {
        let Some(user_id) = handle.user_id().await else {
            handle.send(OutboundMessage::error(NOT_IN_ROOM, "Authenticate first"));
            return;
        };

        let presence = match self.store.read_presence(&user_id).await {
            Ok(presence) => presence,
            Err(e) => {
                self.store_failure(handle, "join room", &e);
                return;
            }
        };
        let Some(presence) = presence.filter(|p| p.current_room_id.as_ref() == Some(&room_id))
        else {
            warn!(conn_id = %handle.id, user_id = %user_id, room_id = %room_id, "Join for a room the user is not matched into");
            handle.send(OutboundMessage::error(
                NOT_IN_ROOM,
                format!("Not a member of room {room_id}"),
            ));
            return;
        };

        handle
            .bind_room(RoomBinding {
                room_id: room_id.clone(),
                peer_id: presence.peer_id,
            })
            .await;

        if let JoinOutcome::Joined {
            ready: Some(offerer),
            ..
        } = self.registry.join_room(&room_id, handle.id, &user_id)
        {
            self.schedule_ready(room_id, offerer);
        }
    }

    /// Emit `rtc:ready` to the room's members once the grace delay elapses.
    fn schedule_ready(&self, room_id: RoomId, offerer: UserId) {
        let registry = self.registry.clone();
        let pool = self.pool.clone();
        let metrics = self.metrics.clone();
        let delay = self.engine.config().ready_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(room) = registry.room(&room_id) else {
                debug!(room_id = %room_id, "Room gone before ready");
                return;
            };
            let mut sent = 0u64;
            for conn_id in room.connections() {
                if let Some(conn) = pool.get(&conn_id) {
                    let ready = OutboundMessage::RtcReady {
                        room_id: room_id.clone(),
                        offerer: offerer.clone(),
                    };
                    if conn.send(ready) {
                        sent += 1;
                    }
                }
            }
            metrics.message_sent_count(sent);
        });
    }

    async fn leave_room(&self, handle: &ConnectionHandle, room_id: &RoomId) {
        let outcome = self.registry.leave_room(room_id, &handle.id);
        if !outcome.left {
            return;
        }
        let user_id = handle.user_id().await;
        for conn_id in &outcome.remaining {
            let Some(conn) = self.pool.get(conn_id) else {
                continue;
            };
            if conn.user_id().await != user_id {
                conn.send(OutboundMessage::RtcPeerLeft);
            }
        }
        debug!(conn_id = %handle.id, room_id = %room_id, "Left room");
    }

    async fn end_room(&self, handle: &ConnectionHandle, room_id: &RoomId) {
        let Some(user_id) = handle.user_id().await else {
            handle.send(OutboundMessage::error(NOT_IN_ROOM, "Authenticate first"));
            return;
        };
        let Some(binding) = handle.room().await.filter(|b| &b.room_id == room_id) else {
            handle.send(OutboundMessage::error(
                NOT_IN_ROOM,
                format!("Not a member of room {room_id}"),
            ));
            return;
        };

        let mut peer_id = binding.peer_id.or_else(|| {
            self.registry
                .room(room_id)
                .and_then(|s| s.users().into_iter().find(|u| u != &user_id))
        });
        if peer_id.is_none() {
            peer_id = self.stored_peer(&user_id, room_id).await;
        }

        let event = BridgeEvent::Ended {
            room_id: room_id.clone(),
            ended_by: Some(user_id.clone()),
            reason: EndReason::Ended,
        };
        let notified = self.events.handle_event(&event).await;
        self.registry.remove_room(room_id);
        self.metrics.message_sent_count(notified as u64);

        for user in std::iter::once(&user_id).chain(peer_id.as_ref()) {
            if let Err(e) = self.store.release_room(user, room_id).await {
                error!(user_id = %user, room_id = %room_id, error = %e, "Failed to release room");
            }
        }

        self.publish(event).await;
        self.metrics.room_ended();
        info!(user_id = %user_id, room_id = %room_id, "Room ended");
    }

    async fn send_chat(&self, handle: &ConnectionHandle, room_id: &RoomId, text: &str) {
        let Some(user_id) = handle.user_id().await else {
            handle.send(OutboundMessage::error(NOT_IN_ROOM, "Authenticate first"));
            return;
        };
        let Some(binding) = handle.room().await.filter(|b| &b.room_id == room_id) else {
            handle.send(OutboundMessage::error(
                NOT_IN_ROOM,
                format!("Not a member of room {room_id}"),
            ));
            return;
        };

        let message = match self.chat.compose(room_id, &user_id, text) {
            Ok(message) => message,
            Err(e) => {
                handle.send(OutboundMessage::error(e.code(), e.message));
                return;
            }
        };

        let mut targets: HashMap<ConnectionId, Arc<ConnectionHandle>> = HashMap::new();
        if let Some(room) = self.registry.room(room_id) {
            for conn_id in room.connections() {
                if let Some(conn) = self.pool.get(&conn_id) {
                    targets.insert(conn_id, conn);
                }
            }
        }
        for user in std::iter::once(&user_id).chain(binding.peer_id.as_ref()) {
            for conn in self.pool.user_connections(user) {
                if conn.room_id().await.as_ref() == Some(room_id) {
                    targets.insert(conn.id, conn);
                }
            }
        }

        let mut sent = 0u64;
        for conn in targets.values() {
            if conn.send(message.clone()) {
                sent += 1;
            }
        }
        self.metrics.message_sent_count(sent);
    }

    async fn publish(&self, event: BridgeEvent) {
        if let Err(e) = self.bridge.publish(&event).await {
            warn!(event = %event, error = %e, "Failed to publish bridge event");
        }
    }

    /// Asks every socket to close; each runs its own disconnect cleanup.
    pub fn close_all(&self) {
        let all = self.pool.all_connections();
        for conn in &all {
            conn.close();
        }
        info!(count = all.len(), "All connections closed");
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Returns the number of unique authenticated users.
    pub fn user_count(&self) -> usize {
        self.pool.user_count()
    }

    /// Returns the number of rooms joined on this process.
    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Consumer for bridge events published by any process.
    pub fn events(&self) -> &Arc<EventBridge> {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.pending_count()
    }
}

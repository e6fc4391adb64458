//! Signaling relay: forwards offer/answer/candidate frames to the other
//! member of a room, never back to the sender and never outside the room.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::handle::ConnectionId;
use crate::connection::pool::ConnectionPool;
use crate::message::types::{OutboundMessage, RelayPayload, SignalKind};
use crate::metrics::RealtimeMetrics;
use crate::room::registry::RoomRegistry;

/// What happened to a relayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to this many connections.
    Forwarded(usize),
    /// The sender has not joined the room; dropped.
    NotMember,
    /// Nobody else is in the room yet; dropped.
    NoPeer,
}

/// Forwards signaling messages within a room.
#[derive(Debug)]
pub struct SignalingRelay {
    registry: Arc<RoomRegistry>,
    pool: Arc<ConnectionPool>,
    metrics: Arc<RealtimeMetrics>,
}

impl SignalingRelay {
    pub fn new(
        registry: Arc<RoomRegistry>,
        pool: Arc<ConnectionPool>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            registry,
            pool,
            metrics,
        }
    }

    /// Forward `payload.body` verbatim to every other member of the room.
    pub fn relay(&self, from: &ConnectionId, kind: SignalKind, payload: RelayPayload) -> RelayOutcome {
        let room_id = &payload.room_id;
        if !self.registry.is_member(room_id, from) {
            warn!(
                conn_id = %from,
                room_id = %room_id,
                event = kind.event(),
                "Dropping signal from non-member"
            );
            self.metrics.signal_dropped();
            return RelayOutcome::NotMember;
        }

        let mut delivered = 0;
        for target in self.registry.other_members(room_id, from) {
            let Some(handle) = self.pool.get(&target) else {
                continue;
            };
            if handle.send(OutboundMessage::signal(kind, payload.body.clone())) {
                delivered += 1;
            }
        }

        if delivered == 0 {
            debug!(conn_id = %from, room_id = %room_id, event = kind.event(), "No peer to relay to");
            self.metrics.signal_dropped();
            return RelayOutcome::NoPeer;
        }

        self.metrics.signal_relayed();
        self.metrics.message_sent_count(delivered as u64);
        RelayOutcome::Forwarded(delivered)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use pairline_core::types::{RoomId, UserId};

    use super::*;
    use crate::connection::handle::ConnectionHandle;

    struct Fixture {
        relay: SignalingRelay,
        registry: Arc<RoomRegistry>,
        pool: Arc<ConnectionPool>,
        metrics: Arc<RealtimeMetrics>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(RoomRegistry::new());
        let pool = Arc::new(ConnectionPool::new());
        let metrics = Arc::new(RealtimeMetrics::new());
        Fixture {
            relay: SignalingRelay::new(registry.clone(), pool.clone(), metrics.clone()),
            registry,
            pool,
            metrics,
        }
    }

    fn connect(pool: &ConnectionPool) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(tx));
        pool.add(handle.clone());
        (handle, rx)
    }

    fn offer(room: &str) -> RelayPayload {
        RelayPayload {
            room_id: RoomId::from(room),
            body: json!({"roomId": room, "sdp": {"type": "offer", "sdp": "v=0"}}),
        }
    }

    #[tokio::test]
    async fn test_forwards_to_other_member_only() {
        let f = fixture();
        let room = RoomId::from("r1");
        let (a, mut a_rx) = connect(&f.pool);
        let (b, mut b_rx) = connect(&f.pool);
        let (_c, mut c_rx) = connect(&f.pool);
        f.registry.join_room(&room, a.id, &UserId::from("a"));
        f.registry.join_room(&room, b.id, &UserId::from("b"));

        let payload = offer("r1");
        assert_eq!(
            f.relay.relay(&a.id, SignalKind::Offer, payload.clone()),
            RelayOutcome::Forwarded(1)
        );
        assert_eq!(b_rx.recv().await, Some(OutboundMessage::RtcOffer(payload.body)));
        assert!(a_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());
        assert_eq!(f.metrics.snapshot().signals_relayed, 1);
    }

    #[tokio::test]
    async fn test_drops_from_non_member() {
        let f = fixture();
        let room = RoomId::from("r1");
        let (a, _a_rx) = connect(&f.pool);
        let (b, mut b_rx) = connect(&f.pool);
        f.registry.join_room(&room, b.id, &UserId::from("b"));

        assert_eq!(
            f.relay.relay(&a.id, SignalKind::Candidate, offer("r1")),
            RelayOutcome::NotMember
        );
        assert!(b_rx.try_recv().is_err());
        assert_eq!(f.metrics.snapshot().signals_dropped, 1);
    }

    #[tokio::test]
    async fn test_alone_in_room_is_no_peer() {
        let f = fixture();
        let (a, _a_rx) = connect(&f.pool);
        f.registry.join_room(&RoomId::from("r1"), a.id, &UserId::from("a"));
        assert_eq!(
            f.relay.relay(&a.id, SignalKind::Answer, offer("r1")),
            RelayOutcome::NoPeer
        );
    }

    #[tokio::test]
    async fn test_late_signal_for_defunct_room_is_dropped() {
        let f = fixture();
        let room = RoomId::from("old");
        let (a, _a_rx) = connect(&f.pool);
        let (b, mut b_rx) = connect(&f.pool);
        f.registry.join_room(&room, a.id, &UserId::from("a"));
        f.registry.join_room(&room, b.id, &UserId::from("b"));
        f.registry.remove_room(&room);

        assert_eq!(
            f.relay.relay(&a.id, SignalKind::Offer, offer("old")),
            RelayOutcome::NotMember
        );
        assert!(b_rx.try_recv().is_err());
    }
}

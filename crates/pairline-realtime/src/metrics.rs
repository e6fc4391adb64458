//! Realtime engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide counters for the realtime engine.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    matches_made: AtomicU64,
    matches_queued: AtomicU64,
    match_timeouts: AtomicU64,
    signals_relayed: AtomicU64,
    signals_dropped: AtomicU64,
    rooms_ended: AtomicU64,
}

impl RealtimeMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturating: a close without a matching open must not wrap.
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent_count(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn match_made(&self) {
        self.matches_made.fetch_add(1, Ordering::Relaxed);
    }

    pub fn match_queued(&self) {
        self.matches_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn match_timed_out(&self) {
        self.match_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signal_relayed(&self) {
        self.signals_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signal_dropped(&self) {
        self.signals_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_ended(&self) {
        self.rooms_ended.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            matches_made: self.matches_made.load(Ordering::Relaxed),
            matches_queued: self.matches_queued.load(Ordering::Relaxed),
            match_timeouts: self.match_timeouts.load(Ordering::Relaxed),
            signals_relayed: self.signals_relayed.load(Ordering::Relaxed),
            signals_dropped: self.signals_dropped.load(Ordering::Relaxed),
            rooms_ended: self.rooms_ended.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub matches_made: u64,
    pub matches_queued: u64,
    pub match_timeouts: u64,
    pub signals_relayed: u64,
    pub signals_dropped: u64,
    pub rooms_ended: u64,
}

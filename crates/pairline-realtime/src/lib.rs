//! # pairline-realtime
//!
//! Real-time WebSocket engine for Pairline. Provides:
//!
//! - Connection management with identity binding and a per-user connection cap
//! - The JSON `{event, data}` wire protocol
//! - Matchmaking on top of the atomic presence-store match, with the bounded
//!   match-timeout notification for filtered searches
//! - A process-local room registry with deterministic offerer election
//! - Signaling relay for offer/answer/ICE candidates and in-room chat
//! - Cross-process match/end notifications via an in-memory or Redis bridge
//! - Liveness monitoring and process metrics

pub mod bridge;
pub mod connection;
pub mod matching;
pub mod message;
pub mod metrics;
pub mod room;
pub mod server;
pub mod signaling;

pub use connection::manager::ConnectionManager;
pub use matching::engine::MatchingEngine;
pub use room::registry::RoomRegistry;
pub use server::RealtimeEngine;
pub use signaling::relay::SignalingRelay;

//! WebSocket connection management: lifecycle, pool, handles, liveness.

pub mod handle;
pub mod liveness;
pub mod manager;
pub mod pool;

pub use handle::{ConnectionHandle, ConnectionId, Identity, RoomBinding};
pub use liveness::LivenessMonitor;
pub use manager::ConnectionManager;

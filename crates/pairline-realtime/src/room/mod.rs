//! Rooms: membership registry and in-room chat.

pub mod chat;
pub mod registry;

pub use chat::ChatService;
pub use registry::{JoinOutcome, LeaveOutcome, RoomRegistry, RoomState};

//! Pluggable backend traits.

pub mod bridge;
pub mod presence_store;

pub use bridge::NotificationBridge;
pub use presence_store::PresenceStore;

//! WebRTC signaling relay.

pub mod relay;

pub use relay::{RelayOutcome, SignalingRelay};

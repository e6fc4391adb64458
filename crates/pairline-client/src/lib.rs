//! # pairline-client
//!
//! Client-side building blocks for Pairline peers:
//!
//! - [`negotiation`]: the perfect-negotiation state machine, driving any
//!   WebRTC stack through the [`PeerConnection`] trait with no rendering or
//!   media dependency
//! - [`backoff`]: full-jitter exponential backoff for resubmitting match
//!   requests

pub mod backoff;
pub mod negotiation;

pub use backoff::RequeueBackoff;
pub use negotiation::{NegotiationError, NegotiationSession, PeerConnection};

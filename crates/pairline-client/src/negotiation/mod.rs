//! Perfect negotiation: collision-safe offer/answer exchange between a
//! polite and an impolite peer.

pub mod peer;
pub mod session;

pub use peer::{
    IceCandidate, IceConnectionState, PeerConnection, PeerError, SdpKind, SessionDescription,
    SignalingState,
};
pub use session::{NegotiationError, NegotiationPhase, NegotiationSession};

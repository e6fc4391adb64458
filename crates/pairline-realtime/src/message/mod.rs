//! WebSocket wire protocol.

pub mod types;
pub mod validator;

pub use types::{InboundMessage, OutboundMessage, ProtocolError, RelayPayload, SignalKind};

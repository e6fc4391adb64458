//! Inbound and outbound WebSocket message type definitions.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//! Inbound frames are decoded in two steps (envelope, then per-event
//! payload) so a missing field can be reported against the event it
//! belongs to instead of as a generic parse failure.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use pairline_core::types::{GenderPreference, RoomId, UserId};

/// Reasons an inbound frame could not be turned into an [`InboundMessage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON, not an object, or no `event`.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The event name is not part of the protocol.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    /// A required payload field is absent or blank.
    #[error("{event} requires '{field}'")]
    MissingField {
        /// Event the field belongs to.
        event: &'static str,
        /// Wire name of the field.
        field: &'static str,
    },
}

impl ProtocolError {
    /// Whether the error belongs to a relayed `rtc:*` event.
    pub fn is_relay(&self) -> bool {
        matches!(self, Self::MissingField { event, .. } if event.starts_with("rtc:"))
    }
}

/// Which signaling message is being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    /// Wire event name.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Offer => "rtc:offer",
            Self::Answer => "rtc:answer",
            Self::Candidate => "rtc:candidate",
        }
    }

    /// Payload field that must be present besides `roomId`.
    fn required_field(&self) -> &'static str {
        match self {
            Self::Offer | Self::Answer => "sdp",
            Self::Candidate => "candidate",
        }
    }
}

/// A signaling payload: the room plus the original `data` object, forwarded
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPayload {
    pub room_id: RoomId,
    pub body: Value,
}

/// Identity claimed by an `auth` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub user_id: UserId,
    pub username: Option<String>,
    pub gender: Option<String>,
}

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Auth(AuthPayload),
    Heartbeat,
    MatchRequest { preference: GenderPreference },
    MatchCancel,
    RoomJoin { room_id: RoomId },
    Signal { kind: SignalKind, payload: RelayPayload },
    RtcLeave { room_id: RoomId },
    EndRoom { room_id: RoomId },
    ChatSend { room_id: RoomId, text: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    user_id: Option<String>,
    username: Option<String>,
    gender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MatchData {
    pref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomData {
    room_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatData {
    room_id: Option<String>,
    text: Option<String>,
}

/// Decode `data` into a payload struct; `null`/absent means all-defaults.
fn payload<T: DeserializeOwned + Default>(event: &str, data: Value) -> Result<T, ProtocolError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data)
        .map_err(|e| ProtocolError::Malformed(format!("invalid {event} payload: {e}")))
}

fn required(
    value: Option<String>,
    event: &'static str,
    field: &'static str,
) -> Result<String, ProtocolError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ProtocolError::MissingField { event, field })
}

fn room_of(data: Value, event: &'static str) -> Result<RoomId, ProtocolError> {
    let room: RoomData = payload(event, data)?;
    required(room.room_id, event, "roomId").map(RoomId::from)
}

fn signal(kind: SignalKind, data: Value) -> Result<InboundMessage, ProtocolError> {
    let event = kind.event();
    let room_id = data
        .get("roomId")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .ok_or(ProtocolError::MissingField {
            event,
            field: "roomId",
        })?;
    let field = kind.required_field();
    if data.get(field).is_none_or(Value::is_null) {
        return Err(ProtocolError::MissingField { event, field });
    }
    Ok(InboundMessage::Signal {
        kind,
        payload: RelayPayload {
            room_id: RoomId::from(room_id),
            body: data,
        },
    })
}

impl InboundMessage {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let Envelope { event, data } = envelope;

        match event.as_str() {
            "auth" => {
                let auth: AuthData = payload("auth", data)?;
                Ok(Self::Auth(AuthPayload {
                    user_id: UserId::from(required(auth.user_id, "auth", "userId")?),
                    username: auth.username.filter(|u| !u.trim().is_empty()),
                    gender: auth.gender,
                }))
            }
            "heartbeat" => Ok(Self::Heartbeat),
            "match:request" => {
                let request: MatchData = payload("match:request", data)?;
                Ok(Self::MatchRequest {
                    preference: GenderPreference::parse_lossy(request.pref.as_deref()),
                })
            }
            "match:cancel" => Ok(Self::MatchCancel),
            "room:join" => Ok(Self::RoomJoin {
                room_id: room_of(data, "room:join")?,
            }),
            "rtc:offer" => signal(SignalKind::Offer, data),
            "rtc:answer" => signal(SignalKind::Answer, data),
            "rtc:candidate" => signal(SignalKind::Candidate, data),
            "rtc:leave" => Ok(Self::RtcLeave {
                room_id: room_of(data, "rtc:leave")?,
            }),
            "end:room" => Ok(Self::EndRoom {
                room_id: room_of(data, "end:room")?,
            }),
            "chat:send" => {
                let chat: ChatData = payload("chat:send", data)?;
                Ok(Self::ChatSend {
                    room_id: RoomId::from(required(chat.room_id, "chat:send", "roomId")?),
                    text: required(chat.text, "chat:send", "text")?,
                })
            }
            "" => Err(ProtocolError::Malformed("missing event name".to_string())),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Authentication accepted.
    #[serde(rename = "auth:ok")]
    AuthOk,
    /// Authentication rejected.
    #[serde(rename = "auth:error")]
    AuthError(String),
    /// A peer was found.
    #[serde(rename = "match:found")]
    MatchFound {
        peer_id: UserId,
        peer_username: String,
        room_id: RoomId,
    },
    /// No immediate peer; the requester stays enrolled.
    #[serde(rename = "match:queued")]
    MatchQueued { filter: GenderPreference },
    /// A filtered search is still unmatched after the bounded wait.
    #[serde(rename = "match:timeout")]
    MatchTimeout {
        filter: GenderPreference,
        message: String,
    },
    /// `not-authenticated`, `already-in-room` or `internal-error`.
    #[serde(rename = "match:error")]
    MatchError(String),
    /// Both members joined; negotiation may start.
    #[serde(rename = "rtc:ready")]
    RtcReady { room_id: RoomId, offerer: UserId },
    #[serde(rename = "rtc:offer")]
    RtcOffer(Value),
    #[serde(rename = "rtc:answer")]
    RtcAnswer(Value),
    #[serde(rename = "rtc:candidate")]
    RtcCandidate(Value),
    /// The other member left or disconnected.
    #[serde(rename = "rtc:peer-left")]
    RtcPeerLeft,
    /// A chat line within a room.
    #[serde(rename = "chat:message")]
    ChatMessage {
        id: Uuid,
        room_id: RoomId,
        text: String,
        from: UserId,
        ts: i64,
    },
    /// System notice ("Chat ended", "User disconnected").
    #[serde(rename = "chat:system")]
    ChatSystem { text: String, room_id: RoomId },
    /// Generic error.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl OutboundMessage {
    /// Build a relayed signaling message.
    pub fn signal(kind: SignalKind, body: Value) -> Self {
        match kind {
            SignalKind::Offer => Self::RtcOffer(body),
            SignalKind::Answer => Self::RtcAnswer(body),
            SignalKind::Candidate => Self::RtcCandidate(body),
        }
    }

    /// Build a generic error.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::AuthOk => "auth:ok",
            Self::AuthError(_) => "auth:error",
            Self::MatchFound { .. } => "match:found",
            Self::MatchQueued { .. } => "match:queued",
            Self::MatchTimeout { .. } => "match:timeout",
            Self::MatchError(_) => "match:error",
            Self::RtcReady { .. } => "rtc:ready",
            Self::RtcOffer(_) => "rtc:offer",
            Self::RtcAnswer(_) => "rtc:answer",
            Self::RtcCandidate(_) => "rtc:candidate",
            Self::RtcPeerLeft => "rtc:peer-left",
            Self::ChatMessage { .. } => "chat:message",
            Self::ChatSystem { .. } => "chat:system",
            Self::Error { .. } => "error",
        }
    }
}

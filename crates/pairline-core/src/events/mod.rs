//! Events carried over the cross-process notification bridge.
//!
//! Encoded as a small `|`-delimited tuple so any process (or a human with
//! `redis-cli MONITOR`) can read them:
//!
//! - `matched|roomId|userA|userB`
//! - `ended|roomId|userId|reason`, where `userId` is the member who ended or
//!   left the room and `reason` is `ended` or `disconnected`. The short form
//!   `ended|roomId` is also accepted.

use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::types::{RoomId, UserId};

/// Why a room ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// A member sent `end:room`.
    Ended,
    /// A member's last connection closed.
    Disconnected,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ended => "ended",
            Self::Disconnected => "disconnected",
        }
    }
}

impl FromStr for EndReason {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ended" => Ok(Self::Ended),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(AppError::validation(format!("Unknown end reason '{other}'"))),
        }
    }
}

/// A match or room-end that happened on some process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Two users were paired into a room.
    Matched {
        /// Room id.
        room_id: RoomId,
        /// Requester.
        user_a: UserId,
        /// Selected peer.
        user_b: UserId,
    },
    /// A room was ended (explicitly or by disconnect).
    Ended {
        /// Room id.
        room_id: RoomId,
        /// Member whose action ended the room; every other member is told
        /// its peer left.
        ended_by: Option<UserId>,
        reason: EndReason,
    },
}

impl BridgeEvent {
    /// Wire encoding.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Room the event concerns.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Matched { room_id, .. } | Self::Ended { room_id, .. } => room_id,
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched {
                room_id,
                user_a,
                user_b,
            } => write!(f, "matched|{room_id}|{user_a}|{user_b}"),
            Self::Ended {
                room_id,
                ended_by: None,
                reason: EndReason::Ended,
            } => write!(f, "ended|{room_id}"),
            Self::Ended {
                room_id,
                ended_by,
                reason,
            } => {
                let by = ended_by.as_ref().map(UserId::as_str).unwrap_or_default();
                write!(f, "ended|{room_id}|{by}|{}", reason.as_str())
            }
        }
    }
}

impl FromStr for BridgeEvent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        match parts.as_slice() {
            ["matched", room, a, b] if !room.is_empty() && !a.is_empty() && !b.is_empty() => {
                Ok(Self::Matched {
                    room_id: RoomId::from(*room),
                    user_a: UserId::from(*a),
                    user_b: UserId::from(*b),
                })
            }
            ["ended", room] if !room.is_empty() => Ok(Self::Ended {
                room_id: RoomId::from(*room),
                ended_by: None,
                reason: EndReason::Ended,
            }),
            ["ended", room, by, reason] if !room.is_empty() => Ok(Self::Ended {
                room_id: RoomId::from(*room),
                ended_by: (!by.is_empty()).then(|| UserId::from(*by)),
                reason: reason.parse()?,
            }),
            _ => Err(AppError::validation(format!(
                "Malformed bridge event: '{s}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_encoding() {
        let event = BridgeEvent::Matched {
            room_id: RoomId::from("r1"),
            user_a: UserId::from("a"),
            user_b: UserId::from("b"),
        };
        assert_eq!(event.encode(), "matched|r1|a|b");
        assert_eq!("matched|r1|a|b".parse::<BridgeEvent>().unwrap(), event);
    }

    #[test]
    fn test_ended_decoding() {
        let event: BridgeEvent = "ended|r9".parse().unwrap();
        assert_eq!(event.room_id().as_str(), "r9");
        assert_eq!(event.encode(), "ended|r9");
    }

    #[test]
    fn test_disconnect_carries_leaver() {
        let event = BridgeEvent::Ended {
            room_id: RoomId::from("r2"),
            ended_by: Some(UserId::from("d")),
            reason: EndReason::Disconnected,
        };
        assert_eq!(event.encode(), "ended|r2|d|disconnected");
        assert_eq!("ended|r2|d|disconnected".parse::<BridgeEvent>().unwrap(), event);
    }

    #[test]
    fn test_malformed_events_rejected() {
        for raw in ["", "matched|r1|a", "ended|", "matched||a|b", "started|r1", "ended|r1|x", "ended|r1|a|gone"] {
            assert!(raw.parse::<BridgeEvent>().is_err(), "accepted {raw:?}");
        }
    }
}

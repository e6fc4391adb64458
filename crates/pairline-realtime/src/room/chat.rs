//! In-room text chat and system notices.

use chrono::Utc;
use uuid::Uuid;

use pairline_core::result::AppResult;
use pairline_core::types::{RoomId, UserId};

use crate::message::types::OutboundMessage;
use crate::message::validator::validate_chat_text;

/// Notice sent to both sides when a room is ended.
pub const CHAT_ENDED: &str = "Chat ended";

/// Notice sent to the remaining side when its peer disconnects.
pub const USER_DISCONNECTED: &str = "User disconnected";

/// Builds chat frames; delivery is up to the caller.
#[derive(Debug, Clone)]
pub struct ChatService {
    max_chars: usize,
}

impl ChatService {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Validate a line and stamp it with a fresh id and timestamp.
    pub fn compose(&self, room_id: &RoomId, from: &UserId, text: &str) -> AppResult<OutboundMessage> {
        let text = validate_chat_text(text, self.max_chars)?;
        Ok(OutboundMessage::ChatMessage {
            id: Uuid::new_v4(),
            room_id: room_id.clone(),
            text,
            from: from.clone(),
            ts: Utc::now().timestamp_millis(),
        })
    }

    pub fn system(room_id: &RoomId, text: &str) -> OutboundMessage {
        OutboundMessage::ChatSystem {
            text: text.to_string(),
            room_id: room_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_assigns_unique_ids() {
        let chat = ChatService::new(100);
        let room = RoomId::from("r1");
        let from = UserId::from("u1");
        let first = chat.compose(&room, &from, " hello ").unwrap();
        let second = chat.compose(&room, &from, "hello").unwrap();

        match (first, second) {
            (
                OutboundMessage::ChatMessage { id: a, text, .. },
                OutboundMessage::ChatMessage { id: b, .. },
            ) => {
                assert_ne!(a, b);
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn test_compose_rejects_blank() {
        let chat = ChatService::new(100);
        assert!(chat
            .compose(&RoomId::from("r1"), &UserId::from("u1"), "   ")
            .is_err());
    }
}

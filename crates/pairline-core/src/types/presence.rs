//! Presence records and the partial updates applied to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::gender::{Gender, GenderPreference};
use super::id::{RoomId, UserId};

/// Matchmaking status of a connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Online and eligible to be matched.
    Available,
    /// Paired into a room.
    Matched,
    /// Disconnected.
    Offline,
}

impl PresenceStatus {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Matched => "matched",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "matched" => Ok(Self::Matched),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown presence status '{other}'")),
        }
    }
}

/// One presence record per authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    /// Stable user identity.
    pub user_id: UserId,
    /// Connection currently holding this identity.
    pub connection_id: Option<String>,
    /// Display name supplied at authentication.
    pub username: Option<String>,
    /// Matchmaking status.
    pub status: PresenceStatus,
    /// Self-reported gender.
    pub gender: Gender,
    /// Preference recorded by the latest match request.
    pub gender_preference: GenderPreference,
    /// Room the user is matched into, if any.
    pub current_room_id: Option<RoomId>,
    /// The other member of `current_room_id`, written by the match commit.
    pub peer_id: Option<UserId>,
    /// Last liveness refresh, epoch milliseconds.
    pub last_seen_at: i64,
}

impl UserPresence {
    /// Whether the record points at a room.
    pub fn is_in_room(&self) -> bool {
        self.current_room_id.is_some()
    }

    /// Drop the room and peer.
    pub fn clear_room(&mut self) {
        self.current_room_id = None;
        self.peer_id = None;
    }

    /// The peer of `room_id`, if the record is still matched into it.
    pub fn peer_in(&self, room_id: &RoomId) -> Option<&UserId> {
        if self.current_room_id.as_ref() == Some(room_id) {
            self.peer_id.as_ref()
        } else {
            None
        }
    }

    /// Whether the liveness timestamp is older than `threshold_ms` at `now_ms`.
    pub fn is_stale(&self, now_ms: i64, threshold_ms: i64) -> bool {
        now_ms - self.last_seen_at > threshold_ms
    }

    /// Name to show to a peer, falling back to the user id.
    pub fn display_name(&self) -> String {
        self.username
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// How an upsert treats the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusUpdate {
    /// Leave the stored status untouched.
    #[default]
    Keep,
    /// Overwrite with the given status.
    Set(PresenceStatus),
    /// Set `available` and clear the room, unless the record is `matched`.
    ///
    /// Used on authentication so that a reconnect keeps its room.
    AvailableUnlessMatched,
}

/// Partial presence update; `None` fields are left as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// Status handling.
    pub status: StatusUpdate,
    /// New connection id.
    pub connection_id: Option<String>,
    /// New display name.
    pub username: Option<String>,
    /// New gender.
    pub gender: Option<Gender>,
    /// New preference.
    pub gender_preference: Option<GenderPreference>,
    /// New liveness timestamp (epoch ms).
    pub last_seen_at: Option<i64>,
}

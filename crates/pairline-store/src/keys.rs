//! Presence store key schema.
//!
//! Centralising key construction prevents typos and makes it easy to find
//! every key the application uses. Keys are relative; the Redis client adds
//! the configured prefix. The Lua scripts receive the (prefixed) namespaces
//! below as arguments instead of hard-coding them.

use pairline_core::types::{PoolBucket, UserId};

/// Namespace of per-user presence hashes.
pub const USER_NAMESPACE: &str = "user:";

/// Namespace of availability pool sets.
pub const POOL_NAMESPACE: &str = "available:";

/// Suffix of the time-ordered companion of each pool set.
pub const BY_TIME_SUFFIX: &str = ":by_time";

/// Hash field names of a presence record.
pub mod field {
    /// `available` / `matched` / `offline`.
    pub const STATUS: &str = "status";
    /// Connection holding the identity.
    pub const CONNECTION_ID: &str = "connectionId";
    /// Display name.
    pub const USERNAME: &str = "username";
    /// Gender.
    pub const GENDER: &str = "gender";
    /// Gender preference.
    pub const GENDER_PREFERENCE: &str = "genderPreference";
    /// Room id, empty when none.
    pub const CURRENT_ROOM_ID: &str = "currentRoomId";
    /// Other member of the room, empty when none.
    pub const PEER_ID: &str = "peerId";
    /// Liveness timestamp, epoch ms.
    pub const LAST_SEEN_AT: &str = "lastSeenAt";
}

/// Presence hash for a user.
pub fn user(user_id: &UserId) -> String {
    format!("{USER_NAMESPACE}{user_id}")
}

/// Membership set of a pool.
pub fn pool(bucket: PoolBucket) -> String {
    format!("{POOL_NAMESPACE}{}", bucket.as_str())
}

/// Time-ordered sorted set of a pool (score = entry time).
pub fn pool_by_time(bucket: PoolBucket) -> String {
    format!("{POOL_NAMESPACE}{}{BY_TIME_SUFFIX}", bucket.as_str())
}

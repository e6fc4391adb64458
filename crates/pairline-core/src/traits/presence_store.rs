//! Presence store trait: per-user records plus gender-partitioned pools.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{
    Gender, MatchAttempt, MatchRequest, PoolBucket, PresenceUpdate, RoomId, UserId, UserPresence,
};

/// Shared store of presence records and availability pools.
///
/// Implementations must make every pool mutation immediately visible to
/// subsequent matching attempts, and must run [`PresenceStore::try_match`]
/// as a single atomic unit relative to every other call. Two
/// implementations are provided:
/// - Redis-based (Lua scripts, safe across processes)
/// - In-memory (a `tokio::sync::Mutex` critical section, single process)
#[async_trait]
pub trait PresenceStore: Send + Sync + std::fmt::Debug + 'static {
    /// Merge `update` into the user's record (creating it if absent) and
    /// refresh its TTL.
    async fn upsert_presence(&self, user_id: &UserId, update: PresenceUpdate) -> AppResult<()>;

    /// Refresh `lastSeenAt` and the TTL. Returns `false` if no record exists.
    async fn touch(&self, user_id: &UserId, now_ms: i64) -> AppResult<bool>;

    /// Mark the user offline, clear its room, and remove it from every pool.
    async fn mark_offline(&self, user_id: &UserId) -> AppResult<()>;

    /// Read a record; expired records read as `None`.
    async fn read_presence(&self, user_id: &UserId) -> AppResult<Option<UserPresence>>;

    /// Add a user to the pool for `gender`, ranked by `timestamp_ms`.
    async fn add_to_pool(&self, gender: Gender, user_id: &UserId, timestamp_ms: i64)
    -> AppResult<()>;

    /// Remove a user from the pool for `gender`.
    async fn remove_from_pool(&self, gender: Gender, user_id: &UserId) -> AppResult<()>;

    /// Members of one pool, oldest first.
    async fn pool_members(&self, bucket: PoolBucket) -> AppResult<Vec<UserId>>;

    /// Atomically enrol the requester and try to pair it with a candidate.
    async fn try_match(&self, request: &MatchRequest) -> AppResult<MatchAttempt>;

    /// If the user is still in `room_id`, return it to `available` with no
    /// room (without re-pooling it). Returns whether anything changed.
    async fn release_room(&self, user_id: &UserId, room_id: &RoomId) -> AppResult<bool>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

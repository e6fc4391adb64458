//! Redis presence store implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use pairline_core::error::{AppError, ErrorKind};
use pairline_core::result::AppResult;
use pairline_core::traits::PresenceStore;
use pairline_core::types::{
    Gender, MatchAttempt, MatchRequest, PoolBucket, PresenceUpdate, RoomId, StatusUpdate, UserId,
    UserPresence,
};

use super::client::RedisClient;
use super::scripts::{Scripts, parse_match_reply, parse_presence};
use crate::keys::{self, field};

/// Redis-backed presence store.
#[derive(Debug, Clone)]
pub struct RedisPresenceStore {
    /// Redis client.
    client: RedisClient,
    /// Compiled Lua scripts.
    scripts: Scripts,
    /// Record lifetime without a refresh.
    ttl_seconds: u64,
}

impl RedisPresenceStore {
    /// Create a new Redis presence store.
    pub fn new(client: RedisClient, ttl_seconds: u64) -> Self {
        Self {
            client,
            scripts: Scripts::load(),
            ttl_seconds,
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Store, format!("Redis error: {e}"), e)
    }

    fn user_key(&self, user_id: &UserId) -> String {
        self.client.prefixed_key(&keys::user(user_id))
    }

    fn user_namespace(&self) -> String {
        self.client.prefixed_key(keys::USER_NAMESPACE)
    }

    fn pool_namespace(&self) -> String {
        self.client.prefixed_key(keys::POOL_NAMESPACE)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn upsert_presence(&self, user_id: &UserId, update: PresenceUpdate) -> AppResult<()> {
        let (mode, status) = match update.status {
            StatusUpdate::Keep => ("keep", ""),
            StatusUpdate::Set(status) => ("set", status.as_str()),
            StatusUpdate::AvailableUnlessMatched => ("available_unless_matched", ""),
        };
        let now_ms = update
            .last_seen_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(connection_id) = update.connection_id {
            pairs.push((field::CONNECTION_ID, connection_id));
        }
        if let Some(username) = update.username {
            pairs.push((field::USERNAME, username));
        }
        if let Some(gender) = update.gender {
            pairs.push((field::GENDER, gender.as_str().to_string()));
        }
        if let Some(preference) = update.gender_preference {
            pairs.push((field::GENDER_PREFERENCE, preference.as_str().to_string()));
        }
        if let Some(seen) = update.last_seen_at {
            pairs.push((field::LAST_SEEN_AT, seen.to_string()));
        }

        let mut invocation = self.scripts.upsert.prepare_invoke();
        invocation
            .key(self.user_key(user_id))
            .arg(self.ttl_seconds)
            .arg(mode)
            .arg(status)
            .arg(now_ms);
        for (name, value) in pairs {
            invocation.arg(name).arg(value);
        }

        let mut conn = self.client.conn_mut();
        let _: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn touch(&self, user_id: &UserId, now_ms: i64) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let touched: i64 = self
            .scripts
            .touch
            .key(self.user_key(user_id))
            .arg(now_ms)
            .arg(self.ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(touched == 1)
    }

    async fn mark_offline(&self, user_id: &UserId) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: i64 = self
            .scripts
            .mark_offline
            .key(self.user_key(user_id))
            .arg(user_id.as_str())
            .arg(self.pool_namespace())
            .arg(keys::BY_TIME_SUFFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        debug!(user_id = %user_id, "Presence marked offline");
        Ok(())
    }

    async fn read_presence(&self, user_id: &UserId) -> AppResult<Option<UserPresence>> {
        let mut conn = self.client.conn_mut();
        let fields: HashMap<String, String> = conn
            .hgetall(self.user_key(user_id))
            .await
            .map_err(Self::map_err)?;
        Ok(parse_presence(user_id, fields))
    }

    async fn add_to_pool(
        &self,
        gender: Gender,
        user_id: &UserId,
        timestamp_ms: i64,
    ) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: i64 = self
            .scripts
            .enrol
            .arg(self.pool_namespace())
            .arg(keys::BY_TIME_SUFFIX)
            .arg(user_id.as_str())
            .arg(gender.pool().as_str())
            .arg(timestamp_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn remove_from_pool(&self, gender: Gender, user_id: &UserId) -> AppResult<()> {
        let bucket = gender.pool();
        let mut conn = self.client.conn_mut();
        let _: () = redis::pipe()
            .atomic()
            .srem(self.client.prefixed_key(&keys::pool(bucket)), user_id.as_str())
            .ignore()
            .zrem(
                self.client.prefixed_key(&keys::pool_by_time(bucket)),
                user_id.as_str(),
            )
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn pool_members(&self, bucket: PoolBucket) -> AppResult<Vec<UserId>> {
        let mut conn = self.client.conn_mut();
        let members: Vec<String> = conn
            .zrange(self.client.prefixed_key(&keys::pool_by_time(bucket)), 0, -1)
            .await
            .map_err(Self::map_err)?;
        Ok(members.into_iter().map(UserId::from).collect())
    }

    async fn try_match(&self, request: &MatchRequest) -> AppResult<MatchAttempt> {
        let mut conn = self.client.conn_mut();
        let reply: Vec<String> = self
            .scripts
            .match_pair
            .arg(self.user_namespace())
            .arg(self.pool_namespace())
            .arg(keys::BY_TIME_SUFFIX)
            .arg(request.requester.as_str())
            .arg(request.now_ms)
            .arg(request.stale_threshold_ms)
            .arg(request.preference.as_str())
            .arg(request.gender.as_str())
            .arg(request.room_id.as_str())
            .arg(self.ttl_seconds)
            .arg(request.scan_limit)
            .arg(if request.fallback_to_general_pool { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        let attempt = parse_match_reply(&reply)?;
        debug!(requester = %request.requester, attempt = ?attempt, "Match script evaluated");
        Ok(attempt)
    }

    async fn release_room(&self, user_id: &UserId, room_id: &RoomId) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let released: i64 = self
            .scripts
            .release
            .key(self.user_key(user_id))
            .arg(room_id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(released == 1)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use pairline_core::config::RedisStoreConfig;
    use pairline_core::types::{GenderPreference, MatchOutcome, NoMatchReason, PresenceStatus};

    use super::*;

    const STALE_MS: i64 = 30_000;

    /// A store whose keys live under a prefix unique to one test.
    async fn store(name: &str) -> RedisPresenceStore {
        let url = std::env::var("PAIRLINE__STORE__REDIS__URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
        let config = RedisStoreConfig {
            url,
            key_prefix: format!("pairline-test:{name}:{}:", Utc::now().timestamp_micros()),
        };
        let client = RedisClient::connect(&config).await.expect("redis connection");
        RedisPresenceStore::new(client, 3_600)
    }

    fn request(user: &str, gender: Gender, preference: GenderPreference, now_ms: i64) -> MatchRequest {
        MatchRequest {
            requester: UserId::from(user),
            gender,
            preference,
            now_ms,
            stale_threshold_ms: STALE_MS,
            room_id: RoomId::generate(),
            scan_limit: 50,
            fallback_to_general_pool: false,
        }
    }

    async fn join(store: &RedisPresenceStore, user: &str, gender: Gender, pref: GenderPreference, now_ms: i64) {
        let attempt = store
            .try_match(&request(user, gender, pref, now_ms))
            .await
            .unwrap();
        assert_eq!(
            attempt,
            MatchAttempt::Completed(MatchOutcome::NotMatched {
                reason: NoMatchReason::NoPeer
            })
        );
    }

    fn peer_of(attempt: MatchAttempt) -> UserId {
        match attempt {
            MatchAttempt::Completed(MatchOutcome::Matched { peer_id, .. }) => peer_id,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    fn reason_of(attempt: MatchAttempt) -> NoMatchReason {
        match attempt {
            MatchAttempt::Completed(MatchOutcome::NotMatched { reason }) => reason,
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_match_commits_both_sides() {
        let store = store("commit").await;
        join(&store, "a", Gender::Male, GenderPreference::Female, 1_000).await;

        let req = request("b", Gender::Female, GenderPreference::Random, 2_000);
        assert_eq!(peer_of(store.try_match(&req).await.unwrap()), UserId::from("a"));

        for (user, peer) in [("a", "b"), ("b", "a")] {
            let record = store.read_presence(&UserId::from(user)).await.unwrap().unwrap();
            assert_eq!(record.status, PresenceStatus::Matched);
            assert_eq!(record.peer_in(&req.room_id), Some(&UserId::from(peer)));
        }
        for bucket in PoolBucket::ALL {
            assert!(store.pool_members(bucket).await.unwrap().is_empty());
        }
        assert_eq!(
            store
                .try_match(&request("a", Gender::Male, GenderPreference::Random, 3_000))
                .await
                .unwrap(),
            MatchAttempt::AlreadyInRoom
        );
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_concurrent_requests_never_double_match() {
        let store = store("concurrent").await;
        join(&store, "target", Gender::Female, GenderPreference::Random, 1_000).await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .try_match(&request(
                            &format!("m{i}"),
                            Gender::Male,
                            GenderPreference::Female,
                            2_000,
                        ))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut matched = 0;
        for result in futures::future::join_all(handles).await {
            if let MatchAttempt::Completed(MatchOutcome::Matched { peer_id, .. }) = result.unwrap() {
                assert_eq!(peer_id, UserId::from("target"));
                matched += 1;
            }
        }
        assert_eq!(matched, 1);
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_stale_candidate_is_skipped() {
        let store = store("stale").await;
        join(&store, "a", Gender::Female, GenderPreference::Random, 0).await;

        let attempt = store
            .try_match(&request("b", Gender::Male, GenderPreference::Female, STALE_MS + 1))
            .await
            .unwrap();
        assert_eq!(reason_of(attempt), NoMatchReason::StalePeer);
        let a = store.read_presence(&UserId::from("a")).await.unwrap().unwrap();
        assert_eq!(a.status, PresenceStatus::Available);
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_preference_mismatch_outranks_stale() {
        let store = store("precedence").await;
        join(&store, "old", Gender::Female, GenderPreference::Random, 0).await;
        join(&store, "picky", Gender::Male, GenderPreference::Male, STALE_MS).await;

        let attempt = store
            .try_match(&request("b", Gender::Female, GenderPreference::Random, STALE_MS + 1))
            .await
            .unwrap();
        assert_eq!(reason_of(attempt), NoMatchReason::PrefMismatch);
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_reentry_keeps_original_pool_time() {
        let store = store("reentry").await;
        join(&store, "a", Gender::Female, GenderPreference::Male, 1_000).await;
        join(&store, "b", Gender::Female, GenderPreference::Male, 2_000).await;
        reason_of(
            store
                .try_match(&request("a", Gender::Female, GenderPreference::Male, 3_000))
                .await
                .unwrap(),
        );

        let attempt = store
            .try_match(&request("m", Gender::Male, GenderPreference::Female, 3_500))
            .await
            .unwrap();
        assert_eq!(peer_of(attempt), UserId::from("a"));
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_release_room_requires_matching_room() {
        let store = store("release").await;
        join(&store, "a", Gender::Male, GenderPreference::Random, 1_000).await;
        let req = request("b", Gender::Female, GenderPreference::Random, 1_500);
        peer_of(store.try_match(&req).await.unwrap());

        let a = UserId::from("a");
        assert!(!store.release_room(&a, &RoomId::from("other")).await.unwrap());
        assert!(store.release_room(&a, &req.room_id).await.unwrap());
        assert!(!store.release_room(&a, &req.room_id).await.unwrap());

        let record = store.read_presence(&a).await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Available);
        assert!(record.current_room_id.is_none());
        assert!(record.peer_id.is_none());
        assert!(store.pool_members(PoolBucket::Male).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs a live Redis server (PAIRLINE__STORE__REDIS__URL)"]
    async fn test_redis_upsert_and_offline() {
        let store = store("upsert").await;
        join(&store, "a", Gender::Male, GenderPreference::Random, 1_000).await;
        peer_of(
            store
                .try_match(&request("b", Gender::Female, GenderPreference::Random, 1_500))
                .await
                .unwrap(),
        );

        let a = UserId::from("a");
        store
            .upsert_presence(
                &a,
                PresenceUpdate {
                    status: StatusUpdate::AvailableUnlessMatched,
                    username: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let record = store.read_presence(&a).await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Matched);
        assert_eq!(record.username.as_deref(), Some("alice"));

        store.mark_offline(&a).await.unwrap();
        let record = store.read_presence(&a).await.unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Offline);
        assert!(record.current_room_id.is_none());
        assert!(store.touch(&a, 9_000).await.unwrap());
        assert!(!store.touch(&UserId::from("ghost"), 9_000).await.unwrap());
    }
}

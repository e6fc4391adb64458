//! Presence store manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use pairline_core::config::StoreConfig;
use pairline_core::error::AppError;
use pairline_core::result::AppResult;
use pairline_core::traits::PresenceStore;
use pairline_core::types::{
    Gender, MatchAttempt, MatchRequest, PoolBucket, PresenceUpdate, RoomId, UserId, UserPresence,
};

/// Presence store manager that wraps the configured provider.
///
/// The provider is selected at construction time based on configuration.
/// Processes that must see the same presence state (for example two
/// realtime engines in one test) share a manager by cloning it.
#[derive(Debug, Clone)]
pub struct PresenceStoreManager {
    inner: Arc<dyn PresenceStore>,
    provider_name: &'static str,
}

impl PresenceStoreManager {
    /// Create a new presence store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let (inner, provider_name): (Arc<dyn PresenceStore>, &'static str) =
            match config.provider.as_str() {
                #[cfg(feature = "redis-backend")]
                "redis" => {
                    info!("Initializing Redis presence store");
                    let client = crate::redis::RedisClient::connect(&config.redis).await?;
                    let store =
                        crate::redis::RedisPresenceStore::new(client, config.presence_ttl_seconds);
                    (Arc::new(store), "redis")
                }
                #[cfg(feature = "memory")]
                "memory" => {
                    info!("Initializing in-memory presence store");
                    let store = crate::memory::MemoryPresenceStore::new(config.presence_ttl_seconds);
                    (Arc::new(store), "memory")
                }
                other => {
                    return Err(AppError::configuration(format!(
                        "Unknown presence store provider: '{other}'. Supported: memory, redis"
                    )));
                }
            };

        Ok(Self {
            inner,
            provider_name,
        })
    }

    /// Create a manager from an existing store (for testing).
    pub fn from_store(store: Arc<dyn PresenceStore>) -> Self {
        Self {
            inner: store,
            provider_name: "custom",
        }
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider_name
    }
}

#[async_trait]
impl PresenceStore for PresenceStoreManager {
    async fn upsert_presence(&self, user_id: &UserId, update: PresenceUpdate) -> AppResult<()> {
        self.inner.upsert_presence(user_id, update).await
    }

    async fn touch(&self, user_id: &UserId, now_ms: i64) -> AppResult<bool> {
        self.inner.touch(user_id, now_ms).await
    }

    async fn mark_offline(&self, user_id: &UserId) -> AppResult<()> {
        self.inner.mark_offline(user_id).await
    }

    async fn read_presence(&self, user_id: &UserId) -> AppResult<Option<UserPresence>> {
        self.inner.read_presence(user_id).await
    }

    async fn add_to_pool(
        &self,
        gender: Gender,
        user_id: &UserId,
        timestamp_ms: i64,
    ) -> AppResult<()> {
        self.inner.add_to_pool(gender, user_id, timestamp_ms).await
    }

    async fn remove_from_pool(&self, gender: Gender, user_id: &UserId) -> AppResult<()> {
        self.inner.remove_from_pool(gender, user_id).await
    }

    async fn pool_members(&self, bucket: PoolBucket) -> AppResult<Vec<UserId>> {
        self.inner.pool_members(bucket).await
    }

    async fn try_match(&self, request: &MatchRequest) -> AppResult<MatchAttempt> {
        self.inner.try_match(request).await
    }

    async fn release_room(&self, user_id: &UserId, room_id: &RoomId) -> AppResult<bool> {
        self.inner.release_room(user_id, room_id).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

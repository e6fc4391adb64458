//! Matching engine: turns a match request into one atomic store call.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use pairline_core::config::MatchingConfig;
use pairline_core::result::AppResult;
use pairline_core::traits::PresenceStore;
use pairline_core::types::{
    Gender, GenderPreference, MatchAttempt, MatchOutcome, MatchRequest, RoomId, UserId,
    UserPresence,
};

/// Runs matching attempts against the shared presence store.
///
/// All exclusion happens inside [`PresenceStore::try_match`]; this type only
/// assembles the request (clock, threshold, fresh room id) and logs the
/// outcome.
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    store: Arc<dyn PresenceStore>,
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn PresenceStore>, config: MatchingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Attempt to pair `requester` with a compatible peer.
    pub async fn request_match(
        &self,
        requester: &UserId,
        gender: Gender,
        preference: GenderPreference,
    ) -> AppResult<MatchAttempt> {
        let request = MatchRequest {
            requester: requester.clone(),
            gender,
            preference,
            now_ms: Utc::now().timestamp_millis(),
            stale_threshold_ms: self.config.stale_threshold_ms,
            room_id: RoomId::generate(),
            scan_limit: self.config.scan_limit,
            fallback_to_general_pool: self.config.fallback_to_general_pool,
        };

        let attempt = self.store.try_match(&request).await?;
        match &attempt {
            MatchAttempt::AlreadyInRoom => {
                debug!(user_id = %requester, "Match request while already in a room");
            }
            MatchAttempt::Completed(MatchOutcome::Matched { peer_id, room_id }) => {
                info!(
                    user_id = %requester,
                    peer_id = %peer_id,
                    room_id = %room_id,
                    gender = %gender,
                    preference = %preference,
                    "Match made"
                );
            }
            MatchAttempt::Completed(MatchOutcome::NotMatched { reason }) => {
                debug!(
                    user_id = %requester,
                    preference = %preference,
                    reason = %reason,
                    "No match, requester queued"
                );
            }
        }
        Ok(attempt)
    }

    /// Current presence record of a user.
    pub async fn presence(&self, user_id: &UserId) -> AppResult<Option<UserPresence>> {
        self.store.read_presence(user_id).await
    }

    /// Name to show for a user: stored username, else the id.
    pub async fn display_name(&self, user_id: &UserId) -> String {
        match self.presence(user_id).await {
            Ok(Some(presence)) => presence.display_name(),
            _ => user_id.to_string(),
        }
    }
}

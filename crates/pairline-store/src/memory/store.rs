//! In-memory presence store using a Tokio mutex for single-process deployments.
//!
//! Every operation takes the single state lock, so a match search and its
//! commit observe and mutate a consistent snapshot exactly like the Redis
//! script does.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use pairline_core::result::AppResult;
use pairline_core::traits::PresenceStore;
use pairline_core::types::{
    Gender, GenderPreference, MatchAttempt, MatchOutcome, MatchRequest, NoMatchReason, PoolBucket,
    PresenceStatus, PresenceUpdate, RoomId, StatusUpdate, UserId, UserPresence,
};

/// A presence record with its expiry deadline.
#[derive(Debug, Clone)]
struct Record {
    presence: UserPresence,
    expires_at: Instant,
}

/// One availability pool: membership plus entry-time ordering.
#[derive(Debug, Default)]
struct Pool {
    by_time: BTreeSet<(i64, UserId)>,
    members: HashMap<UserId, i64>,
}

impl Pool {
    /// Adds a member, keeping the original entry time if already present.
    fn insert_nx(&mut self, user_id: &UserId, timestamp_ms: i64) {
        if self.members.contains_key(user_id) {
            return;
        }
        self.members.insert(user_id.clone(), timestamp_ms);
        self.by_time.insert((timestamp_ms, user_id.clone()));
    }

    fn remove(&mut self, user_id: &UserId) -> bool {
        match self.members.remove(user_id) {
            Some(ts) => {
                self.by_time.remove(&(ts, user_id.clone()));
                true
            }
            None => false,
        }
    }

    fn oldest(&self, limit: usize) -> Vec<(i64, UserId)> {
        self.by_time.iter().take(limit).cloned().collect()
    }
}

/// How a pooled candidate looked during a scan.
enum Candidate {
    Expired,
    Unavailable,
    Stale,
    Rejects,
    Eligible,
}

#[derive(Debug, Default)]
struct InnerState {
    records: HashMap<UserId, Record>,
    pools: HashMap<PoolBucket, Pool>,
}

impl InnerState {
    /// Returns the record if it has not expired, dropping it otherwise.
    fn live(&mut self, user_id: &UserId, now: Instant) -> Option<&mut Record> {
        let expired = self
            .records
            .get(user_id)
            .is_some_and(|r| r.expires_at <= now);
        if expired {
            self.records.remove(user_id);
        }
        self.records.get_mut(user_id)
    }

    fn pool(&mut self, bucket: PoolBucket) -> &mut Pool {
        self.pools.entry(bucket).or_default()
    }

    fn remove_from_all_pools(&mut self, user_id: &UserId) {
        for pool in self.pools.values_mut() {
            pool.remove(user_id);
        }
    }

    fn enrol(&mut self, user_id: &UserId, gender: Gender, timestamp_ms: i64) {
        let home = gender.pool();
        for bucket in PoolBucket::ALL {
            if bucket != home {
                self.pool(bucket).remove(user_id);
            }
        }
        self.pool(home).insert_nx(user_id, timestamp_ms);
    }

    fn classify(&mut self, candidate: &UserId, request: &MatchRequest, now: Instant) -> Candidate {
        let Some(record) = self.live(candidate, now) else {
            return Candidate::Expired;
        };
        let presence = &record.presence;
        if presence.status != PresenceStatus::Available || presence.is_in_room() {
            Candidate::Unavailable
        } else if presence.is_stale(request.now_ms, request.stale_threshold_ms) {
            Candidate::Stale
        } else if !presence.gender_preference.accepts(request.gender) {
            Candidate::Rejects
        } else {
            Candidate::Eligible
        }
    }

    fn try_match(&mut self, request: &MatchRequest, now: Instant, ttl: Duration) -> MatchAttempt {
        let me = &request.requester;

        if let Some(record) = self.live(me, now) {
            if record.presence.status == PresenceStatus::Matched || record.presence.is_in_room() {
                return MatchAttempt::AlreadyInRoom;
            }
        }

        // Register the requester as available and enrol it in its own pool.
        let record = self
            .records
            .entry(me.clone())
            .or_insert_with(|| Record {
                presence: blank_presence(me, request.now_ms),
                expires_at: now + ttl,
            });
        record.presence.status = PresenceStatus::Available;
        record.presence.clear_room();
        record.presence.gender = request.gender;
        record.presence.gender_preference = request.preference;
        record.presence.last_seen_at = request.now_ms;
        record.expires_at = now + ttl;
        self.enrol(me, request.gender, request.now_ms);

        let mut candidates: Vec<(i64, UserId, PoolBucket)> = Vec::new();
        for bucket in request.preference.search_pools(request.fallback_to_general_pool) {
            for (ts, id) in self.pool(bucket).oldest(request.scan_limit) {
                candidates.push((ts, id, bucket));
            }
        }
        if request.preference == GenderPreference::Random {
            candidates.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        }

        let (mut saw_mismatch, mut saw_stale, mut saw_unavailable) = (false, false, false);
        for (_, candidate, bucket) in candidates {
            if &candidate == me {
                continue;
            }
            match self.classify(&candidate, request, now) {
                Candidate::Expired => {
                    self.pool(bucket).remove(&candidate);
                    saw_stale = true;
                }
                Candidate::Unavailable => {
                    self.pool(bucket).remove(&candidate);
                    saw_unavailable = true;
                }
                Candidate::Stale => saw_stale = true,
                Candidate::Rejects => saw_mismatch = true,
                Candidate::Eligible => {
                    self.commit(me, &candidate, &request.room_id);
                    return MatchAttempt::Completed(MatchOutcome::Matched {
                        peer_id: candidate,
                        room_id: request.room_id.clone(),
                    });
                }
            }
        }

        MatchAttempt::Completed(MatchOutcome::NotMatched {
            reason: NoMatchReason::most_specific(saw_mismatch, saw_stale, saw_unavailable),
        })
    }

    fn commit(&mut self, a: &UserId, b: &UserId, room_id: &RoomId) {
        for (user, peer) in [(a, b), (b, a)] {
            if let Some(record) = self.records.get_mut(user) {
                record.presence.status = PresenceStatus::Matched;
                record.presence.current_room_id = Some(room_id.clone());
                record.presence.peer_id = Some(peer.clone());
            }
            self.remove_from_all_pools(user);
        }
    }
}

fn blank_presence(user_id: &UserId, now_ms: i64) -> UserPresence {
    UserPresence {
        user_id: user_id.clone(),
        connection_id: None,
        username: None,
        status: PresenceStatus::Available,
        gender: Gender::Other,
        gender_preference: GenderPreference::Random,
        current_room_id: None,
        peer_id: None,
        last_seen_at: now_ms,
    }
}

fn apply_status(presence: &mut UserPresence, status: StatusUpdate) {
    match status {
        StatusUpdate::Keep => {}
        StatusUpdate::Set(PresenceStatus::Matched) => {
            presence.status = PresenceStatus::Matched;
        }
        StatusUpdate::Set(other) => {
            presence.status = other;
            presence.clear_room();
        }
        StatusUpdate::AvailableUnlessMatched => {
            if presence.status != PresenceStatus::Matched {
                presence.status = PresenceStatus::Available;
                presence.clear_room();
            }
        }
    }
}

/// In-memory presence store.
///
/// Suitable for single-process deployments and tests only.
#[derive(Debug, Clone)]
pub struct MemoryPresenceStore {
    state: Arc<Mutex<InnerState>>,
    ttl: Duration,
}

impl MemoryPresenceStore {
    /// Creates a store whose records expire `ttl_seconds` after their last write.
    pub fn new(ttl_seconds: u64) -> Self {
        info!(ttl_seconds, "Initializing in-memory presence store");
        Self {
            state: Arc::new(Mutex::new(InnerState::default())),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn upsert_presence(&self, user_id: &UserId, update: PresenceUpdate) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let fallback_seen = update
            .last_seen_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        if state.live(user_id, now).is_none() {
            state.records.insert(
                user_id.clone(),
                Record {
                    presence: blank_presence(user_id, fallback_seen),
                    expires_at: now + self.ttl,
                },
            );
        }
        let Some(record) = state.records.get_mut(user_id) else {
            return Ok(());
        };

        let presence = &mut record.presence;
        apply_status(presence, update.status);
        if let Some(connection_id) = update.connection_id {
            presence.connection_id = Some(connection_id);
        }
        if let Some(username) = update.username {
            presence.username = Some(username);
        }
        if let Some(gender) = update.gender {
            presence.gender = gender;
        }
        if let Some(preference) = update.gender_preference {
            presence.gender_preference = preference;
        }
        if let Some(seen) = update.last_seen_at {
            presence.last_seen_at = seen;
        }
        record.expires_at = now + self.ttl;
        Ok(())
    }

    async fn touch(&self, user_id: &UserId, now_ms: i64) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let ttl = self.ttl;
        Ok(match state.live(user_id, now) {
            Some(record) => {
                record.presence.last_seen_at = now_ms;
                record.expires_at = now + ttl;
                true
            }
            None => false,
        })
    }

    async fn mark_offline(&self, user_id: &UserId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if let Some(record) = state.live(user_id, now) {
            record.presence.status = PresenceStatus::Offline;
            record.presence.clear_room();
        }
        state.remove_from_all_pools(user_id);
        debug!(user_id = %user_id, "Presence marked offline");
        Ok(())
    }

    async fn read_presence(&self, user_id: &UserId) -> AppResult<Option<UserPresence>> {
        let mut state = self.state.lock().await;
        Ok(state
            .live(user_id, Instant::now())
            .map(|record| record.presence.clone()))
    }

    async fn add_to_pool(
        &self,
        gender: Gender,
        user_id: &UserId,
        timestamp_ms: i64,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.enrol(user_id, gender, timestamp_ms);
        Ok(())
    }

    async fn remove_from_pool(&self, gender: Gender, user_id: &UserId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.pool(gender.pool()).remove(user_id);
        Ok(())
    }

    async fn pool_members(&self, bucket: PoolBucket) -> AppResult<Vec<UserId>> {
        let mut state = self.state.lock().await;
        Ok(state
            .pool(bucket)
            .oldest(usize::MAX)
            .into_iter()
            .map(|(_, id)| id)
            .collect())
    }

    async fn try_match(&self, request: &MatchRequest) -> AppResult<MatchAttempt> {
        let mut state = self.state.lock().await;
        let attempt = state.try_match(request, Instant::now(), self.ttl);
        debug!(requester = %request.requester, attempt = ?attempt, "Match attempt evaluated");
        Ok(attempt)
    }

    async fn release_room(&self, user_id: &UserId, room_id: &RoomId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let Some(record) = state.live(user_id, Instant::now()) else {
            return Ok(false);
        };
        if record.presence.current_room_id.as_ref() != Some(room_id) {
            return Ok(false);
        }
        if record.presence.status != PresenceStatus::Offline {
            record.presence.status = PresenceStatus::Available;
        }
        record.presence.clear_room();
        Ok(true)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

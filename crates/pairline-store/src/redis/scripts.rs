//! Lua scripts executed atomically by Redis, plus parsers for their replies.
//!
//! Scripts receive the prefixed key namespaces as arguments (see
//! [`crate::keys`]) and build candidate keys themselves, so they assume a
//! single Redis node rather than a cluster.

use std::collections::HashMap;

use redis::Script;

use pairline_core::error::AppError;
use pairline_core::result::AppResult;
use pairline_core::types::{
    Gender, GenderPreference, MatchAttempt, MatchOutcome, NoMatchReason, PresenceStatus, RoomId,
    UserId, UserPresence,
};

use crate::keys::field;

/// Search-and-commit matching.
///
/// ARGV: user namespace, pool namespace, by-time suffix, requester, now ms,
/// stale threshold ms, preference, gender, room id, ttl seconds, scan limit,
/// fallback flag (`1`/`0`).
///
/// Replies `{'busy'}`, `{'ok', peer, room}` or `{'err', REASON}`.
const MATCH_SCRIPT: &str = r#"
local user_ns = ARGV[1]
local pool_ns = ARGV[2]
local by_time = ARGV[3]
local me = ARGV[4]
local now_raw = ARGV[5]
local now = tonumber(now_raw)
local stale_ms = tonumber(ARGV[6])
local pref = ARGV[7]
local gender = ARGV[8]
local room = ARGV[9]
local ttl = tonumber(ARGV[10])
local limit = tonumber(ARGV[11])
local fallback = ARGV[12] == '1'

local buckets = {'male', 'female', 'random'}

local function leave_pool(bucket, id)
  redis.call('SREM', pool_ns .. bucket, id)
  redis.call('ZREM', pool_ns .. bucket .. by_time, id)
end

local me_key = user_ns .. me
local my_status = redis.call('HGET', me_key, 'status')
local my_room = redis.call('HGET', me_key, 'currentRoomId')
if my_status == 'matched' or (my_room and my_room ~= '') then
  return {'busy'}
end

redis.call('HSET', me_key,
  'status', 'available', 'currentRoomId', '', 'peerId', '',
  'gender', gender, 'genderPreference', pref, 'lastSeenAt', now_raw)
redis.call('EXPIRE', me_key, ttl)

local home = 'random'
if gender == 'male' or gender == 'female' then
  home = gender
end
for _, b in ipairs(buckets) do
  if b ~= home then
    leave_pool(b, me)
  end
end
redis.call('SADD', pool_ns .. home, me)
redis.call('ZADD', pool_ns .. home .. by_time, 'NX', now_raw, me)

local search
if pref == 'random' then
  search = buckets
elseif fallback then
  search = {pref, 'random'}
else
  search = {pref}
end

local candidates = {}
for _, b in ipairs(search) do
  local entries = redis.call('ZRANGE', pool_ns .. b .. by_time, 0, limit - 1, 'WITHSCORES')
  for i = 1, #entries, 2 do
    table.insert(candidates, {id = entries[i], score = tonumber(entries[i + 1]), bucket = b})
  end
end
if pref == 'random' then
  table.sort(candidates, function(x, y)
    if x.score == y.score then
      return x.id < y.id
    end
    return x.score < y.score
  end)
end

local saw_mismatch, saw_stale, saw_unavailable = false, false, false
for _, c in ipairs(candidates) do
  if c.id ~= me then
    local f = redis.call('HMGET', user_ns .. c.id,
      'status', 'currentRoomId', 'lastSeenAt', 'genderPreference')
    local status, croom, seen, cpref = f[1], f[2], tonumber(f[3]), f[4]
    if not status then
      leave_pool(c.bucket, c.id)
      saw_stale = true
    elseif status ~= 'available' or (croom and croom ~= '') then
      leave_pool(c.bucket, c.id)
      saw_unavailable = true
    elseif not seen or now - seen > stale_ms then
      saw_stale = true
    elseif cpref and cpref ~= 'random' and cpref ~= gender then
      saw_mismatch = true
    else
      for _, pair in ipairs({{me, c.id}, {c.id, me}}) do
        redis.call('HSET', user_ns .. pair[1],
          'status', 'matched', 'currentRoomId', room, 'peerId', pair[2])
        for _, b in ipairs(buckets) do
          leave_pool(b, pair[1])
        end
      end
      return {'ok', c.id, room}
    end
  end
end

if saw_mismatch then
  return {'err', 'PREF_MISMATCH'}
elseif saw_stale then
  return {'err', 'STALE_PEER'}
elseif saw_unavailable then
  return {'err', 'NOT_AVAILABLE'}
end
return {'err', 'NO_PEER'}
"#;

/// Partial presence upsert.
///
/// KEYS[1]: user hash. ARGV: ttl seconds, status mode (`keep` / `set` /
/// `available_unless_matched`), status value, now ms, then field/value pairs.
const UPSERT_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])
local mode = ARGV[2]
local status = ARGV[3]

if mode == 'set' then
  redis.call('HSET', key, 'status', status)
  if status ~= 'matched' then
    redis.call('HSET', key, 'currentRoomId', '', 'peerId', '')
  end
elseif mode == 'available_unless_matched' then
  if redis.call('HGET', key, 'status') ~= 'matched' then
    redis.call('HSET', key, 'status', 'available', 'currentRoomId', '', 'peerId', '')
  end
end

if #ARGV > 4 then
  redis.call('HSET', key, unpack(ARGV, 5))
end
if redis.call('HEXISTS', key, 'status') == 0 then
  redis.call('HSET', key, 'status', 'available', 'currentRoomId', '', 'peerId', '')
end
if redis.call('HEXISTS', key, 'lastSeenAt') == 0 then
  redis.call('HSET', key, 'lastSeenAt', ARGV[4])
end
redis.call('EXPIRE', key, ttl)
return 1
"#;

/// Refresh `lastSeenAt` and the expiry of an existing record.
///
/// KEYS[1]: user hash. ARGV: now ms, ttl seconds.
const TOUCH_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'lastSeenAt', ARGV[1])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[2]))
return 1
"#;

/// Mark a user offline and drop it from every pool.
///
/// KEYS[1]: user hash. ARGV: user id, pool namespace, by-time suffix.
const OFFLINE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  redis.call('HSET', KEYS[1], 'status', 'offline', 'currentRoomId', '', 'peerId', '')
end
for _, b in ipairs({'male', 'female', 'random'}) do
  redis.call('SREM', ARGV[2] .. b, ARGV[1])
  redis.call('ZREM', ARGV[2] .. b .. ARGV[3], ARGV[1])
end
return 1
"#;

/// Clear a user's room if it is still the given room.
///
/// KEYS[1]: user hash. ARGV: room id.
const RELEASE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'currentRoomId') ~= ARGV[1] then
  return 0
end
if redis.call('HGET', KEYS[1], 'status') ~= 'offline' then
  redis.call('HSET', KEYS[1], 'status', 'available')
end
redis.call('HSET', KEYS[1], 'currentRoomId', '', 'peerId', '')
return 1
"#;

/// Enrol a user in its home pool, leaving the other two.
///
/// ARGV: pool namespace, by-time suffix, user id, home bucket, timestamp ms.
const ENROL_SCRIPT: &str = r#"
for _, b in ipairs({'male', 'female', 'random'}) do
  if b ~= ARGV[4] then
    redis.call('SREM', ARGV[1] .. b, ARGV[3])
    redis.call('ZREM', ARGV[1] .. b .. ARGV[2], ARGV[3])
  end
end
redis.call('SADD', ARGV[1] .. ARGV[4], ARGV[3])
redis.call('ZADD', ARGV[1] .. ARGV[4] .. ARGV[2], 'NX', ARGV[5], ARGV[3])
return 1
"#;

/// Compiled scripts, hashed once and invoked via EVALSHA.
#[derive(Debug, Clone)]
pub struct Scripts {
    pub match_pair: Script,
    pub upsert: Script,
    pub touch: Script,
    pub mark_offline: Script,
    pub release: Script,
    pub enrol: Script,
}

impl Scripts {
    pub fn load() -> Self {
        Self {
            match_pair: Script::new(MATCH_SCRIPT),
            upsert: Script::new(UPSERT_SCRIPT),
            touch: Script::new(TOUCH_SCRIPT),
            mark_offline: Script::new(OFFLINE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
            enrol: Script::new(ENROL_SCRIPT),
        }
    }
}

/// Interpret the reply of the match script.
///
/// Anything other than the three documented shapes is a store error; the
/// caller must never treat it as "queued".
pub fn parse_match_reply(reply: &[String]) -> AppResult<MatchAttempt> {
    match reply {
        [tag] if tag == "busy" => Ok(MatchAttempt::AlreadyInRoom),
        [tag, peer, room] if tag == "ok" && !peer.is_empty() && !room.is_empty() => {
            Ok(MatchAttempt::Completed(MatchOutcome::Matched {
                peer_id: UserId::from(peer.as_str()),
                room_id: RoomId::from(room.as_str()),
            }))
        }
        [tag, reason] if tag == "err" => {
            let reason: NoMatchReason = reason.parse().map_err(AppError::store)?;
            Ok(MatchAttempt::Completed(MatchOutcome::NotMatched { reason }))
        }
        other => Err(AppError::store(format!(
            "Unexpected match script reply: {other:?}"
        ))),
    }
}

/// Build a presence record from an `HGETALL` reply. An empty hash is absent.
pub fn parse_presence(user_id: &UserId, mut fields: HashMap<String, String>) -> Option<UserPresence> {
    if fields.is_empty() {
        return None;
    }
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

    let status = fields
        .get(field::STATUS)
        .and_then(|s| s.parse().ok())
        .unwrap_or(PresenceStatus::Offline);
    Some(UserPresence {
        user_id: user_id.clone(),
        connection_id: non_empty(fields.remove(field::CONNECTION_ID)),
        username: non_empty(fields.remove(field::USERNAME)),
        status,
        gender: Gender::parse_lossy(fields.get(field::GENDER).map(String::as_str)),
        gender_preference: GenderPreference::parse_lossy(
            fields.get(field::GENDER_PREFERENCE).map(String::as_str),
        ),
        current_room_id: non_empty(fields.remove(field::CURRENT_ROOM_ID)).map(RoomId::from),
        peer_id: non_empty(fields.remove(field::PEER_ID)).map(UserId::from),
        last_seen_at: fields
            .get(field::LAST_SEEN_AT)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

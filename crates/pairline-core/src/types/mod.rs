//! Shared domain types: identifiers, gender buckets, presence records,
//! and matching outcomes.

pub mod gender;
pub mod id;
pub mod outcome;
pub mod presence;

pub use gender::{Gender, GenderPreference, PoolBucket};
pub use id::{RoomId, UserId};
pub use outcome::{MatchAttempt, MatchOutcome, MatchRequest, NoMatchReason};
pub use presence::{PresenceStatus, PresenceUpdate, StatusUpdate, UserPresence};

//! Inputs and results of a single atomic matching attempt.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::gender::{Gender, GenderPreference};
use super::id::{RoomId, UserId};

/// Everything the atomic match procedure needs, resolved up front so the
/// procedure itself is deterministic (the room id is pre-generated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    /// User asking for a match.
    pub requester: UserId,
    /// Requester's gender (decides its own pool and mutual compatibility).
    pub gender: Gender,
    /// Requester's stated preference (decides which pools are searched).
    pub preference: GenderPreference,
    /// Current time, epoch milliseconds.
    pub now_ms: i64,
    /// Candidates older than this are stale.
    pub stale_threshold_ms: i64,
    /// Room id to commit if a candidate is found.
    pub room_id: RoomId,
    /// Maximum candidates inspected per pool.
    pub scan_limit: usize,
    /// Whether male/female searches also look in the general pool.
    pub fallback_to_general_pool: bool,
}

/// Why an attempt produced no pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoMatchReason {
    /// No candidates at all.
    NoPeer,
    /// The only candidates found were stale.
    StalePeer,
    /// Candidates were present but no longer available.
    NotAvailable,
    /// Candidates were present but their preference rejects the requester.
    PrefMismatch,
}

impl NoMatchReason {
    /// Wire / script representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPeer => "NO_PEER",
            Self::StalePeer => "STALE_PEER",
            Self::NotAvailable => "NOT_AVAILABLE",
            Self::PrefMismatch => "PREF_MISMATCH",
        }
    }

    /// Picks the most specific reason from what a scan observed.
    pub fn most_specific(saw_mismatch: bool, saw_stale: bool, saw_unavailable: bool) -> Self {
        if saw_mismatch {
            Self::PrefMismatch
        } else if saw_stale {
            Self::StalePeer
        } else if saw_unavailable {
            Self::NotAvailable
        } else {
            Self::NoPeer
        }
    }
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoMatchReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NO_PEER" => Ok(Self::NoPeer),
            "STALE_PEER" => Ok(Self::StalePeer),
            "NOT_AVAILABLE" => Ok(Self::NotAvailable),
            "PREF_MISMATCH" => Ok(Self::PrefMismatch),
            other => Err(format!("unknown match reason '{other}'")),
        }
    }
}

/// Result of one matching attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Both parties were committed to `room_id`.
    Matched {
        /// The selected peer.
        peer_id: UserId,
        /// The freshly created room.
        room_id: RoomId,
    },
    /// The requester stays enrolled in its pool.
    NotMatched {
        /// Most specific reason.
        reason: NoMatchReason,
    },
}

impl MatchOutcome {
    /// Whether the attempt produced a pairing.
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// What the store reports back from the atomic procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchAttempt {
    /// The requester is already matched or in a room; nothing was changed.
    AlreadyInRoom,
    /// The procedure ran to completion.
    Completed(MatchOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_precedence() {
        assert_eq!(
            NoMatchReason::most_specific(true, true, true),
            NoMatchReason::PrefMismatch
        );
        assert_eq!(
            NoMatchReason::most_specific(false, true, true),
            NoMatchReason::StalePeer
        );
        assert_eq!(
            NoMatchReason::most_specific(false, false, true),
            NoMatchReason::NotAvailable
        );
        assert_eq!(
            NoMatchReason::most_specific(false, false, false),
            NoMatchReason::NoPeer
        );
    }

    #[test]
    fn test_reason_parse_is_case_insensitive() {
        assert_eq!(
            "pref_mismatch".parse::<NoMatchReason>().unwrap(),
            NoMatchReason::PrefMismatch
        );
        assert!("BOGUS".parse::<NoMatchReason>().is_err());
    }
}

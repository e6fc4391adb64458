//! Matching engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the matching engine and room readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Candidates whose `lastSeenAt` is older than this are skipped.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_ms: i64,
    /// Seconds a filtered (male/female) search waits before `match:timeout`.
    #[serde(default = "default_match_timeout")]
    pub match_timeout_seconds: u64,
    /// Maximum candidates inspected per pool in one attempt.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    /// Also search the unspecified-gender pool for male/female preferences.
    #[serde(default)]
    pub fallback_to_general_pool: bool,
    /// Delay between the second room join and `rtc:ready`.
    #[serde(default = "default_ready_delay")]
    pub ready_delay_ms: u64,
}

impl MatchingConfig {
    /// Match timeout as a [`Duration`].
    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_seconds)
    }

    /// Ready grace delay as a [`Duration`].
    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: default_stale_threshold(),
            match_timeout_seconds: default_match_timeout(),
            scan_limit: default_scan_limit(),
            fallback_to_general_pool: false,
            ready_delay_ms: default_ready_delay(),
        }
    }
}

fn default_stale_threshold() -> i64 {
    30_000
}

fn default_match_timeout() -> u64 {
    15
}

fn default_scan_limit() -> usize {
    50
}

fn default_ready_delay() -> u64 {
    500
}

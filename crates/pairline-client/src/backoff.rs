//! Requeue backoff for match requests.
//!
//! After `match:queued` a client may resubmit `match:request`. Delays grow
//! exponentially from `base` up to `cap`, and each delay is drawn uniformly
//! from `[0, ceiling]` (full jitter) so many clients queued at once do not
//! hit the shared pool in lockstep.

use std::time::Duration;

use rand::Rng;

const DEFAULT_BASE: Duration = Duration::from_millis(500);
const DEFAULT_CAP: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct RequeueBackoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Default for RequeueBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}

impl RequeueBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Attempts since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Upper bound of the next delay.
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Next delay using the thread-local RNG.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let ceiling = self.ceiling().as_millis() as u64;
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(rng.gen_range(0..=ceiling))
    }

    /// Start over, e.g. after a match.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

//! Matchmaking: the atomic match call and the bounded-wait timer.

pub mod engine;
pub mod timeout;

pub use engine::MatchingEngine;
pub use timeout::{MatchTimeoutScheduler, TimeoutTarget};

//! # pairline-store
//!
//! Presence store implementations for Pairline. Supports two modes:
//!
//! - **memory**: in-process records and pools behind one async mutex
//!   (single-process deployments and tests)
//! - **redis**: Redis hashes, sets and sorted sets, with every multi-key
//!   mutation (including the whole match search-and-commit) executed as a
//!   Lua script so it is atomic across processes
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::PresenceStoreManager;

//! Redis presence store provider.

pub mod client;
pub mod operations;
pub mod scripts;

pub use client::RedisClient;
pub use operations::RedisPresenceStore;

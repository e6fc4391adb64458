//! In-memory presence store implementation.

pub mod store;

pub use store::MemoryPresenceStore;

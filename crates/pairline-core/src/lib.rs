//! # pairline-core
//!
//! Core crate for Pairline. Contains the presence-store and bridge traits,
//! configuration schemas, typed identifiers, matchmaking domain types,
//! cross-process bridge events, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Pairline crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

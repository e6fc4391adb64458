//! # pairline-api
//!
//! HTTP layer for Pairline built on Axum.
//!
//! Serves the `/ws` signaling socket and the health endpoints, with CORS and
//! request tracing layers, and maps `AppError` to HTTP responses.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, build_state, run_server};
pub use state::AppState;

//! Application builder: wires router + middleware + state into an Axum app.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use pairline_core::config::AppConfig;
use pairline_core::error::AppError;
use pairline_core::result::AppResult;
use pairline_realtime::bridge;
use pairline_realtime::server::RealtimeEngine;
use pairline_store::PresenceStoreManager;

use crate::middleware::cors::build_cors_layer;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Connects the configured presence store and bridge and starts the engine.
pub async fn build_state(config: AppConfig) -> AppResult<AppState> {
    tracing::info!(provider = %config.store.provider, "Initializing presence store");
    let store = PresenceStoreManager::new(&config.store).await?;

    tracing::info!(provider = %config.bridge.provider, "Initializing notification bridge");
    let bridge = bridge::connect(&config.bridge).await?;

    let engine = RealtimeEngine::new(
        config.realtime.clone(),
        config.matching.clone(),
        Arc::new(store),
        bridge,
    );
    Ok(AppState::new(config, engine))
}

/// Runs the Pairline server until `shutdown` resolves.
pub async fn run_server(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> AppResult<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    let state = build_state(config).await?;
    let engine = state.realtime.clone();
    let app = build_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Pairline server listening on {}", addr);

    let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        tracing::info!("Shutdown signal received");
        if let Err(e) = engine.shutdown().await {
            tracing::error!(error = %e, "Realtime engine shutdown failed");
        }
        let _ = stopped_tx.send(());
    });

    let server = tokio::spawn(async move { server.await });
    let _ = stopped_rx.await;

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(AppError::internal(format!("Server error: {e}"))),
        Ok(Err(e)) => return Err(AppError::internal(format!("Server task failed: {e}"))),
        Err(_) => tracing::warn!(grace_seconds = grace.as_secs(), "Graceful shutdown timed out"),
    }

    tracing::info!("Pairline server stopped");
    Ok(())
}

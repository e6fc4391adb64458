//! WebSocket upgrade handler.
//!
//! Identity is established in-band by the `auth` event, so the upgrade
//! itself is unauthenticated.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// GET /ws: WebSocket upgrade
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max_bytes = state.config.realtime.max_message_bytes;
    ws.max_message_size(max_bytes.saturating_mul(2))
        .on_upgrade(move |socket| handle_ws_connection(state, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let connections = state.realtime.connections.clone();
    let (handle, mut outbound_rx) = connections.register();
    let conn_id = handle.id;
    let closed = handle.shutdown_token();

    info!(conn_id = %conn_id, "WebSocket connection established");

    // Spawn outbound message forwarder
    let outbound_closed = closed.clone();
    let outbound_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = outbound_closed.cancelled() => break,
                msg = outbound_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    error!(conn_id = %conn_id, error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // Process inbound messages
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => {
                debug!(conn_id = %conn_id, "Connection closed by server");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                connections.handle_inbound(&conn_id, text.as_str()).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup
    closed.cancel();
    connections.unregister(&conn_id).await;
    let _ = outbound_task.await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

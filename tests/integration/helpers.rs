//! Shared test helpers: an in-process server and a JSON WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use pairline_api::{AppState, build_app};
use pairline_core::config::{AppConfig, MatchingConfig};
use pairline_core::traits::PresenceStore;
use pairline_realtime::bridge::MemoryBridge;
use pairline_realtime::server::RealtimeEngine;
use pairline_store::memory::MemoryPresenceStore;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Config tuned for fast tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.matching = MatchingConfig {
        match_timeout_seconds: 1,
        ready_delay_ms: 20,
        ..MatchingConfig::default()
    };
    config
}

/// A running server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Single process with its own store and bridge.
    pub async fn start() -> Self {
        Self::start_shared(Arc::new(MemoryPresenceStore::new(30)), MemoryBridge::new(64)).await
    }

    /// A process sharing `store` and `bridge` with sibling test servers.
    pub async fn start_shared(store: Arc<dyn PresenceStore>, bridge: MemoryBridge) -> Self {
        let config = test_config();
        let engine = RealtimeEngine::new(
            config.realtime.clone(),
            config.matching.clone(),
            store,
            Arc::new(bridge),
        );
        let state = AppState::new(config, engine);
        let app = build_app(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    pub async fn connect(&self) -> WsClient {
        let (stream, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("WebSocket handshake failed");
        WsClient { stream }
    }

    /// Connect and authenticate.
    pub async fn login(&self, user_id: &str, gender: &str) -> WsClient {
        let mut client = self.connect().await;
        client
            .send("auth", json!({ "userId": user_id, "username": user_id, "gender": gender }))
            .await;
        client.expect("auth:ok").await;
        client
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        self.state.realtime.connections.store()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.realtime.connections.close_all();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// JSON `{event, data}` client.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.stream.send(Message::text(frame)).await.unwrap();
    }

    /// Next event as `(name, data)`.
    pub async fn recv(&mut self) -> (String, Value) {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed")
                .expect("socket error");
            if let Message::Text(text) = msg {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let event = frame["event"].as_str().unwrap().to_string();
                return (event, frame.get("data").cloned().unwrap_or(Value::Null));
            }
        }
    }

    /// Assert the next event's name and return its data.
    pub async fn expect(&mut self, event: &str) -> Value {
        let (name, data) = self.recv().await;
        assert_eq!(name, event, "unexpected event with data {data}");
        data
    }

    /// Assert that nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(Ok(Message::Text(text)))) =
            tokio::time::timeout(wait, self.stream.next()).await
        {
            panic!("unexpected frame: {}", text.as_str());
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Poll `check` until it holds or the receive timeout elapses.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

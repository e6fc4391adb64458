//! Two server processes sharing one presence store and one bridge.

use std::sync::Arc;

use serde_json::json;

use pairline_core::traits::PresenceStore;
use pairline_core::types::{PresenceStatus, UserId};
use pairline_realtime::bridge::MemoryBridge;
use pairline_store::memory::MemoryPresenceStore;

use crate::helpers::{TestServer, eventually};

#[tokio::test]
async fn test_match_and_end_cross_process() {
    let store: Arc<dyn PresenceStore> = Arc::new(MemoryPresenceStore::new(30));
    let bridge = MemoryBridge::new(64);
    let east = TestServer::start_shared(store.clone(), bridge.clone()).await;
    let west = TestServer::start_shared(store, bridge).await;

    let mut b = west.login("user-b", "female").await;
    b.send("match:request", json!({ "pref": "random" })).await;
    b.expect("match:queued").await;

    let mut a = east.login("user-a", "male").await;
    a.send("match:request", json!({ "pref": "female" })).await;
    let found_a = a.expect("match:found").await;

    // Delivered to the other process through the bridge, exactly once.
    let found_b = b.expect("match:found").await;
    assert_eq!(found_b["peerId"], "user-a");
    assert_eq!(found_a["roomId"], found_b["roomId"]);

    a.send("end:room", json!({ "roomId": found_a["roomId"] })).await;
    a.expect("chat:system").await;
    b.expect("rtc:peer-left").await;
    assert_eq!(b.expect("chat:system").await["text"], "Chat ended");
}

#[tokio::test]
async fn test_disconnect_reaches_peer_on_other_process() {
    let store: Arc<dyn PresenceStore> = Arc::new(MemoryPresenceStore::new(30));
    let bridge = MemoryBridge::new(64);
    let east = TestServer::start_shared(store.clone(), bridge.clone()).await;
    let west = TestServer::start_shared(store.clone(), bridge).await;

    let mut b = west.login("user-b", "female").await;
    b.send("match:request", json!({ "pref": "random" })).await;
    b.expect("match:queued").await;

    let mut a = east.login("user-a", "male").await;
    a.send("match:request", json!({ "pref": "female" })).await;
    let found = a.expect("match:found").await;
    b.expect("match:found").await;

    a.close().await;

    b.expect("rtc:peer-left").await;
    let notice = b.expect("chat:system").await;
    assert_eq!(notice["text"], "User disconnected");
    assert_eq!(notice["roomId"], found["roomId"]);

    let user_b = UserId::from("user-b");
    eventually(|| {
        let store = store.clone();
        let user_b = user_b.clone();
        async move {
            store
                .read_presence(&user_b)
                .await
                .unwrap()
                .is_some_and(|p| p.status == PresenceStatus::Available && p.current_room_id.is_none())
        }
    })
    .await;
}

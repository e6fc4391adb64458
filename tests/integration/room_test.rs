//! Room lifecycle: ready, relay, chat, end and disconnect.

use std::time::Duration;

use serde_json::{Value, json};

use pairline_core::types::{PresenceStatus, UserId};

use crate::helpers::{TestServer, WsClient, eventually};

async fn matched_pair(server: &TestServer, a_id: &str, b_id: &str) -> (WsClient, WsClient, Value) {
    let mut a = server.login(a_id, "male").await;
    let mut b = server.login(b_id, "female").await;
    b.send("match:request", json!({ "pref": "random" })).await;
    b.expect("match:queued").await;
    a.send("match:request", json!({ "pref": "random" })).await;
    let room_id = a.expect("match:found").await["roomId"].clone();
    b.expect("match:found").await;
    (a, b, room_id)
}

#[tokio::test]
async fn test_ready_then_relay() {
    let server = TestServer::start().await;
    let (mut a, mut b, room_id) = matched_pair(&server, "zed", "amy").await;

    b.send("room:join", json!({ "roomId": room_id })).await;
    a.send("room:join", json!({ "roomId": room_id })).await;

    let expected = json!({ "roomId": room_id, "offerer": "amy" });
    assert_eq!(a.expect("rtc:ready").await, expected);
    assert_eq!(b.expect("rtc:ready").await, expected);

    let offer = json!({ "roomId": room_id, "sdp": { "type": "offer", "sdp": "v=0" } });
    b.send("rtc:offer", offer.clone()).await;
    assert_eq!(a.expect("rtc:offer").await, offer);

    let candidate = json!({ "roomId": room_id, "candidate": { "candidate": "c1", "sdpMid": "0" } });
    a.send("rtc:candidate", candidate.clone()).await;
    assert_eq!(b.expect("rtc:candidate").await, candidate);

    // Nothing was echoed back to the senders.
    a.expect_silence(Duration::from_millis(100)).await;
    b.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_join_foreign_room_rejected() {
    let server = TestServer::start().await;
    let (_a, _b, room_id) = matched_pair(&server, "a", "b").await;

    let mut intruder = server.login("intruder", "other").await;
    intruder.send("room:join", json!({ "roomId": room_id })).await;
    assert_eq!(intruder.expect("error").await["code"], "NOT_IN_ROOM");
}

#[tokio::test]
async fn test_chat_reaches_both_sides() {
    let server = TestServer::start().await;
    let (mut a, mut b, room_id) = matched_pair(&server, "a", "b").await;

    a.send("chat:send", json!({ "roomId": room_id, "text": "hello" })).await;
    for client in [&mut a, &mut b] {
        let message = client.expect("chat:message").await;
        assert_eq!(message["text"], "hello");
        assert_eq!(message["from"], "a");
        assert!(message["id"].is_string());
    }
}

#[tokio::test]
async fn test_end_room_and_next() {
    let server = TestServer::start().await;
    let (mut a, mut b, room_id) = matched_pair(&server, "a", "b").await;

    a.send("end:room", json!({ "roomId": room_id })).await;
    assert_eq!(
        a.expect("chat:system").await,
        json!({ "text": "Chat ended", "roomId": room_id })
    );
    b.expect("rtc:peer-left").await;
    b.expect("chat:system").await;

    // "next": both can search again right away.
    b.send("match:request", json!({ "pref": "random" })).await;
    b.expect("match:queued").await;
    a.send("match:request", json!({ "pref": "random" })).await;
    let again = a.expect("match:found").await;
    assert_ne!(again["roomId"], room_id);
}

#[tokio::test]
async fn test_disconnect_mid_room_notifies_peer() {
    let server = TestServer::start().await;
    let (d, mut e, room_id) = matched_pair(&server, "user-d", "user-e").await;

    d.close().await;

    e.expect("rtc:peer-left").await;
    assert_eq!(
        e.expect("chat:system").await,
        json!({ "text": "User disconnected", "roomId": room_id })
    );

    let store = server.store().clone();
    eventually(|| {
        let store = store.clone();
        async move {
            matches!(
                store.read_presence(&UserId::from("user-d")).await,
                Ok(Some(p)) if p.current_room_id.is_none() && p.status == PresenceStatus::Offline
            )
        }
    })
    .await;

    let peer = store.read_presence(&UserId::from("user-e")).await.unwrap().unwrap();
    assert_eq!(peer.status, PresenceStatus::Available);
    assert_eq!(peer.current_room_id, None);
}

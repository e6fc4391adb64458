//! Matchmaking over the socket: pairing, queueing, timeout, errors.

use std::time::Duration;

use serde_json::json;

use crate::helpers::TestServer;

#[tokio::test]
async fn test_preference_pair_both_receive_same_room() {
    let server = TestServer::start().await;
    let mut a = server.login("user-a", "male").await;
    let mut b = server.login("user-b", "female").await;

    b.send("match:request", json!({ "pref": "random" })).await;
    assert_eq!(b.expect("match:queued").await, json!({ "filter": "random" }));

    a.send("match:request", json!({ "pref": "female" })).await;
    let found_a = a.expect("match:found").await;
    let found_b = b.expect("match:found").await;

    assert_eq!(found_a["peerId"], "user-b");
    assert_eq!(found_b["peerId"], "user-a");
    assert_eq!(found_b["peerUsername"], "user-a");
    assert_eq!(found_a["roomId"], found_b["roomId"]);
}

#[tokio::test]
async fn test_filtered_search_times_out() {
    let server = TestServer::start().await;
    let mut c = server.login("user-c", "male").await;

    c.send("match:request", json!({ "pref": "female" })).await;
    assert_eq!(c.expect("match:queued").await, json!({ "filter": "female" }));

    let timeout = c.expect("match:timeout").await;
    assert_eq!(timeout["filter"], "female");
    assert!(timeout["message"].as_str().unwrap().contains("female"));
}

#[tokio::test]
async fn test_random_search_has_no_timeout() {
    let server = TestServer::start().await;
    let mut c = server.login("user-c", "male").await;

    c.send("match:request", json!({ "pref": "random" })).await;
    c.expect("match:queued").await;
    c.expect_silence(Duration::from_millis(1500)).await;
}

#[tokio::test]
async fn test_match_after_timeout_arrival() {
    let server = TestServer::start().await;
    let mut c = server.login("user-c", "male").await;
    c.send("match:request", json!({ "pref": "female" })).await;
    c.expect("match:queued").await;

    // A compatible user arriving later finds the queued requester.
    let mut f = server.login("user-f", "female").await;
    f.send("match:request", json!({ "pref": "male" })).await;
    assert_eq!(f.expect("match:found").await["peerId"], "user-c");
    assert_eq!(c.expect("match:found").await["peerId"], "user-f");

    // The pending timeout was cancelled by the match.
    c.expect_silence(Duration::from_millis(1500)).await;
}

#[tokio::test]
async fn test_unauthenticated_match_request() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.send("match:request", json!({})).await;
    assert_eq!(client.expect("match:error").await, json!("not-authenticated"));
}

#[tokio::test]
async fn test_auth_without_user_id() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    client.send("auth", json!({ "gender": "male" })).await;
    assert_eq!(client.expect("auth:error").await, json!("missing-user-id"));
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.login("user-a", "male").await;

    client.send("no-such-event", json!({})).await;
    assert_eq!(client.expect("error").await["code"], "INVALID_MESSAGE");

    client.send("heartbeat", json!({})).await;
    client.send("match:request", json!({ "pref": "random" })).await;
    client.expect("match:queued").await;
}

#[tokio::test]
async fn test_cancel_leaves_pool() {
    let server = TestServer::start().await;
    let mut b = server.login("user-b", "female").await;
    b.send("match:request", json!({ "pref": "random" })).await;
    b.expect("match:queued").await;
    b.send("match:cancel", json!({})).await;

    let mut a = server.login("user-a", "male").await;
    a.send("match:request", json!({ "pref": "female" })).await;
    a.expect("match:queued").await;
    b.expect_silence(Duration::from_millis(200)).await;
}

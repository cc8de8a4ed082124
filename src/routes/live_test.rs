use super::*;
use crate::frame::ErrorCode;
use crate::state::test_helpers::{self, FakeFeed, FakeIdentity, FakePlatform, FakeStore};
use crate::supabase::ChangeEvent;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use time::macros::datetime;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

fn view_over(store: Arc<FakeStore>) -> ViewHandle {
    spawn_view("u1".into(), store, Arc::new(FakeFeed::default()))
}

fn request(syscall: &str, data: serde_json::Value) -> Frame {
    let serde_json::Value::Object(map) = data else { panic!("data must be an object") };
    Frame::request(syscall, map.into_iter().collect())
}

// =============================================================================
// handle_request
// =============================================================================

#[tokio::test]
async fn create_replies_done_with_stored_bookmark() {
    let view = view_over(Arc::new(FakeStore::default()));
    let req = request(SYSCALL_CREATE, json!({ "title": "Rust", "url": "https://rust-lang.org" }));
    let reply = handle_request(&view, &req).await;
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.parent_id, Some(req.id));
    assert_eq!(reply.data["bookmark"]["title"], "Rust");
    assert_eq!(reply.data["bookmark"]["user_id"], "u1");
}

#[tokio::test]
async fn create_with_bad_url_replies_validation_error() {
    let store = Arc::new(FakeStore::default());
    let view = view_over(store.clone());
    let req = request(SYSCALL_CREATE, json!({ "title": "Rust", "url": "not a url" }));
    let reply = handle_request(&view, &req).await;
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.str_field("code"), Some("E_INVALID_URL"));
    assert_eq!(reply.str_field("message"), Some("Please enter a valid URL (include https://)."));
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn create_with_missing_fields_replies_required() {
    let view = view_over(Arc::new(FakeStore::default()));
    let reply = handle_request(&view, &request(SYSCALL_CREATE, json!({}))).await;
    assert_eq!(reply.str_field("message"), Some("Both title and URL are required."));
}

#[tokio::test]
async fn store_failure_is_retryable_error() {
    let store = Arc::new(FakeStore::default());
    store.fail_insert.store(true, Ordering::SeqCst);
    let view = view_over(store);
    let reply = handle_request(&view, &request(SYSCALL_CREATE, json!({ "title": "a", "url": "https://a.b" }))).await;
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.data["retryable"], true);
    assert_eq!(reply.str_field("code"), Some("E_STORE_RESPONSE"));
}

#[tokio::test]
async fn delete_requires_id() {
    let view = view_over(Arc::new(FakeStore::default()));
    let reply = handle_request(&view, &request(SYSCALL_DELETE, json!({ "id": "" }))).await;
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.str_field("message"), Some("id required"));
}

#[tokio::test]
async fn delete_replies_done() {
    let store = Arc::new(FakeStore::with_rows(vec![test_helpers::bookmark("b1", "u1", datetime!(2025-01-01 0:00 UTC))]));
    let view = view_over(store.clone());
    let reply = handle_request(&view, &request(SYSCALL_DELETE, json!({ "id": "b1" }))).await;
    assert_eq!(reply.status, Status::Done);
    assert!(store.ids().is_empty());
}

#[tokio::test]
async fn unknown_syscall_is_an_error() {
    let view = view_over(Arc::new(FakeStore::default()));
    let reply = handle_request(&view, &request("bookmark:rename", json!({}))).await;
    assert_eq!(reply.str_field("message"), Some("unknown syscall: bookmark:rename"));
}

#[test]
fn snapshot_frame_carries_list_state() {
    let snapshot = Snapshot {
        revision: 9,
        bookmarks: vec![test_helpers::bookmark("b1", "u1", datetime!(2025-01-01 0:00 UTC))],
        loaded: true,
        error: None,
    };
    let frame = snapshot_frame(&snapshot);
    assert_eq!(frame.syscall, SYSCALL_SNAPSHOT);
    assert_eq!(frame.status, Status::Request);
    assert_eq!(frame.data["loaded"], true);
    assert!(frame.data["error"].is_null());
    assert_eq!(frame.data["bookmarks"][0]["id"], "b1");
    assert!(!frame.data.contains_key("revision"));
}

// =============================================================================
// END TO END
// =============================================================================

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_frame(client: &mut Client) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame receive timed out")
            .expect("socket closed")
            .expect("socket error");
        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

async fn next_snapshot(client: &mut Client, pred: impl Fn(&Frame) -> bool) -> Frame {
    loop {
        let frame = next_frame(client).await;
        if frame.syscall == SYSCALL_SNAPSHOT && pred(&frame) {
            return frame;
        }
    }
}

#[tokio::test]
async fn live_socket_streams_snapshots_and_replies() {
    let platform = Arc::new(FakePlatform::default());
    platform
        .store
        .rows
        .lock()
        .unwrap()
        .push(test_helpers::bookmark("b1", "u1", datetime!(2025-01-01 0:00 UTC)));
    let identity = FakeIdentity::default().with_user("at", test_helpers::identity("u1"));
    let app = crate::routes::app(test_helpers::test_app_state(identity, platform.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let mut req = format!("ws://{addr}/api/live").into_client_request().unwrap();
    req.headers_mut().insert("cookie", "sb-access-token=at".parse().unwrap());
    let (mut client, _) = tokio_tungstenite::connect_async(req).await.unwrap();

    let first = next_snapshot(&mut client, |f| f.data["loaded"] == true).await;
    assert_eq!(first.data["bookmarks"][0]["id"], "b1");

    let create = request(SYSCALL_CREATE, json!({ "title": "Docs", "url": "https://docs.rs" }));
    client
        .send(tokio_tungstenite::tungstenite::Message::Text(serde_json::to_string(&create).unwrap().into()))
        .await
        .unwrap();

    let mut saw_reply = false;
    let mut saw_snapshot = false;
    while !(saw_reply && saw_snapshot) {
        let frame = next_frame(&mut client).await;
        if frame.parent_id == Some(create.id) {
            assert_eq!(frame.status, Status::Done);
            saw_reply = true;
        } else if frame.syscall == SYSCALL_SNAPSHOT && frame.data["bookmarks"].as_array().map(Vec::len) == Some(2) {
            saw_snapshot = true;
        }
    }

    platform.feed.emit(ChangeEvent::Delete("b1".into())).await;
    let after = next_snapshot(&mut client, |f| f.data["bookmarks"].as_array().map(Vec::len) == Some(1)).await;
    assert_eq!(after.data["bookmarks"][0]["title"], "Docs");

    client.close(None).await.unwrap();
    // Closing the socket tears down the view and its subscription.
    timeout(Duration::from_secs(2), async {
        while platform.feed.open_subscriptions() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription not closed");
}

#[test]
fn error_codes_are_stable() {
    let err = crate::sync::ViewError::Closed;
    assert_eq!(err.error_code(), "E_VIEW_CLOSED");
}

#[tokio::test]
async fn expired_session_replies_unauthorized() {
    let store = Arc::new(FakeStore::with_rows(vec![test_helpers::bookmark("b1", "u1", datetime!(2025-01-01 0:00 UTC))]));
    let view = view_over(store.clone());
    let mut snapshots = view.snapshots();
    timeout(Duration::from_millis(500), snapshots.wait_for(|s| s.loaded)).await.unwrap().unwrap();

    store.expired.store(true, Ordering::SeqCst);
    let reply = handle_request(&view, &request(SYSCALL_CREATE, json!({ "title": "a", "url": "https://a.b" }))).await;
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.str_field("code"), Some("E_UNAUTHORIZED"));
    assert_eq!(reply.data["retryable"], false);
}

#[tokio::test]
async fn expired_session_closes_socket_with_session_code() {
    let platform = Arc::new(FakePlatform::default());
    platform.store.expired.store(true, Ordering::SeqCst);
    let identity = FakeIdentity::default().with_user("at", test_helpers::identity("u1"));
    let app = crate::routes::app(test_helpers::test_app_state(identity, platform.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let mut req = format!("ws://{addr}/api/live").into_client_request().unwrap();
    req.headers_mut().insert("cookie", "sb-access-token=at".parse().unwrap());
    let (mut client, _) = tokio_tungstenite::connect_async(req).await.unwrap();

    let close = timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                Some(Ok(tokio_tungstenite::tungstenite::Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                other => panic!("socket ended without a close frame: {other:?}"),
            }
        }
    })
    .await
    .expect("socket was not closed");
    let frame = close.expect("close frame without code");
    assert_eq!(u16::from(frame.code), SESSION_EXPIRED_CLOSE_CODE);
}

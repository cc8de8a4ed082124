use super::*;
use crate::state::test_helpers::{self, FakeIdentity, FakePlatform};
use axum::body::{Body, to_bytes};
use axum::http::{Request, header};
use std::sync::Arc;
use time::macros::datetime;
use tower::ServiceExt;

fn signed_in() -> FakeIdentity {
    FakeIdentity::default().with_user("at", test_helpers::identity("u1"))
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn healthz_ok_without_session() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/healthz", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn root_redirects_to_dashboard() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/", None)).await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn dashboard_without_session_redirects_to_login() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/dashboard", None)).await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn dashboard_with_stale_token_redirects_and_clears_cookies() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/dashboard", Some("sb-access-token=old"))).await.unwrap();
    assert_eq!(location(&response), "/login");
    let cleared: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cleared.len(), 2);
}

#[tokio::test]
async fn dashboard_renders_owner_bookmarks() {
    let platform = Arc::new(FakePlatform::default());
    platform.store.rows.lock().unwrap().extend([
        test_helpers::bookmark("b1", "u1", datetime!(2025-01-01 0:00 UTC)),
        test_helpers::bookmark("b2", "u2", datetime!(2025-01-02 0:00 UTC)),
    ]);
    let app = app(test_helpers::test_app_state(signed_in(), platform.clone()));
    let response = app.oneshot(get("/dashboard", Some("sb-access-token=at"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("data-id=\"b1\""));
    assert!(!html.contains("data-id=\"b2\""));
    assert!(html.contains("u1@example.com"));
    assert_eq!(*platform.tokens.lock().unwrap(), vec!["at".to_string()]);
}

#[tokio::test]
async fn dashboard_shows_error_note_when_store_fails() {
    let platform = Arc::new(FakePlatform::default());
    platform.store.fail_list.store(true, std::sync::atomic::Ordering::SeqCst);
    let app = app(test_helpers::test_app_state(signed_in(), platform));
    let response = app.oneshot(get("/dashboard", Some("sb-access-token=at"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Could not load bookmarks."));
    assert!(html.contains("No bookmarks yet."));
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let identity = FakeIdentity::default()
        .with_user("fresh-at", test_helpers::identity("u1"))
        .with_refresh("rt", test_helpers::session("fresh-at", "fresh-rt", "u1"));
    let app = app(test_helpers::test_app_state(identity, Arc::default()));
    let response = app
        .oneshot(get("/dashboard", Some("sb-access-token=old; sb-refresh-token=rt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("sb-access-token=fresh-at")));
    assert!(cookies.iter().any(|c| c.starts_with("sb-refresh-token=fresh-rt")));
}

#[tokio::test]
async fn login_page_shows_auth_failure_banner() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/login?error=auth_failed", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Sign-in failed"));
    assert!(html.contains("href=\"/auth/login\""));
}

#[tokio::test]
async fn login_page_sends_signed_in_users_to_dashboard() {
    let app = app(test_helpers::test_app_state(signed_in(), Arc::default()));
    let response = app.oneshot(get("/login", Some("sb-access-token=at"))).await.unwrap();
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn live_socket_requires_session() {
    let app = app(test_helpers::test_app_state(FakeIdentity::default(), Arc::default()));
    let response = app.oneshot(get("/api/live", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Pages and the live websocket sit behind the session gate, which resolves
//! the caller's identity from cookies (refreshing it when the access token
//! has lapsed) and turns anonymous `/dashboard` visits into a redirect.
//! The sign-in endpoints manage their own cookies and are mounted outside
//! the gate, as is the health probe.

pub mod auth;
pub mod gate;
pub mod live;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::root))
        .route("/login", get(pages::login))
        .route("/dashboard", get(pages::dashboard))
        .route("/api/live", get(live::handle_live))
        .layer(middleware::from_fn_with_state(state.clone(), gate::session_gate))
        .route("/auth/login", get(auth::sign_in))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::sign_out))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

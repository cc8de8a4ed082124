//! Auth routes: PKCE sign-in, callback, sign-out.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{info, warn};

use crate::session::{self, ACCESS_COOKIE, VERIFIER_COOKIE};
use crate::state::AppState;

pub(crate) const AUTH_FAILED_REDIRECT: &str = "/login?error=auth_failed";

/// `GET /auth/login`: stash a PKCE verifier, redirect to the provider.
pub async fn sign_in(State(state): State<AppState>, jar: CookieJar) -> Response {
    let verifier = session::generate_verifier();
    let challenge = session::code_challenge(&verifier);
    let url = state
        .identity
        .authorize_url(&state.config.oauth_provider, &state.config.callback_url(), &challenge);

    let jar = session::verifier_cookie(jar, verifier, state.config.cookie_secure);
    (jar, Redirect::temporary(&url)).into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

/// `GET /auth/callback`: exchange the code for a session, set cookies,
/// redirect to `/dashboard`. Any failure lands on `/login?error=auth_failed`.
pub async fn callback(State(state): State<AppState>, jar: CookieJar, Query(params): Query<CallbackQuery>) -> Response {
    let secure = state.config.cookie_secure;
    let failed = |jar: CookieJar| {
        (session::clear_verifier_cookie(jar, secure), Redirect::temporary(AUTH_FAILED_REDIRECT)).into_response()
    };

    if let Some(error) = params.error.as_deref() {
        warn!(%error, "auth: provider returned an error");
        return failed(jar);
    }
    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        warn!("auth: callback without code");
        return failed(jar);
    };
    let Some(verifier) = session::cookie_value(&jar, VERIFIER_COOKIE).map(str::to_string) else {
        warn!("auth: callback without code verifier cookie");
        return failed(jar);
    };

    match state.identity.exchange_code(code, &verifier).await {
        Ok(sess) => {
            info!(user_id = %sess.user.id, "auth: signed in");
            let jar = session::session_cookies(session::clear_verifier_cookie(jar, secure), &sess, secure);
            (jar, Redirect::temporary("/dashboard")).into_response()
        }
        Err(e) => {
            warn!(error = %e, "auth: code exchange failed");
            failed(jar)
        }
    }
}

/// `POST /auth/logout`: revoke (best effort), clear cookies, redirect to `/login`.
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(token) = session::cookie_value(&jar, ACCESS_COOKIE) {
        if let Err(e) = state.identity.sign_out(token).await {
            warn!(error = %e, "auth: sign-out revoke failed");
        }
    }
    let jar = session::clear_session_cookies(jar, state.config.cookie_secure);
    // 303 so the browser follows with GET.
    (jar, Redirect::to("/login")).into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

//! Session gate: cookie-backed identity for every gated request.
//!
//! LIFECYCLE
//! =========
//! 1. No session cookies: anonymous.
//! 2. Access token accepted by the platform: authenticated as-is.
//! 3. Access token rejected or missing but a refresh token exists: trade it
//!    for a new pair and write the new cookies on the response.
//! 4. Refresh refused: anonymous, and the stale cookies are cleared.
//!
//! Platform outages resolve to anonymous without touching cookies, so a
//! transient failure does not sign anyone out.
//!
//! Anonymous requests under `/dashboard` are redirected to `/login`; every
//! other path proceeds, with `Authenticated` in the request extensions when
//! resolved.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, info, warn};

use crate::session::{self, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::state::AppState;
use crate::supabase::{AuthError, Identity, IdentityProvider, Session};

// =============================================================================
// EXTRACTOR
// =============================================================================

/// The signed-in user behind a gated request.
/// Use as a handler parameter to require authentication.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    pub access_token: String,
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> OptionalFromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[derive(Debug)]
pub(crate) enum Resolution {
    Valid(Authenticated),
    Refreshed(Session),
    /// No usable session; leave cookies alone.
    Anonymous,
    /// The session is dead; clear its cookies.
    Expired,
}

pub(crate) async fn resolve(identity: &dyn IdentityProvider, jar: &CookieJar) -> Resolution {
    let access = session::cookie_value(jar, ACCESS_COOKIE);
    let refresh = session::cookie_value(jar, REFRESH_COOKIE);

    if let Some(token) = access {
        match identity.current_user(token).await {
            Ok(Some(user)) => return Resolution::Valid(Authenticated { identity: user, access_token: token.to_string() }),
            Ok(None) => debug!("gate: access token rejected"),
            Err(e) => {
                warn!(error = %e, "gate: identity check failed");
                return Resolution::Anonymous;
            }
        }
    }

    let Some(refresh) = refresh else {
        return if access.is_some() { Resolution::Expired } else { Resolution::Anonymous };
    };
    match identity.refresh(refresh).await {
        Ok(fresh) => Resolution::Refreshed(fresh),
        Err(AuthError::Rejected { status, .. }) => {
            info!(status, "gate: refresh token rejected");
            Resolution::Expired
        }
        Err(e) => {
            warn!(error = %e, "gate: session refresh failed");
            Resolution::Anonymous
        }
    }
}

fn is_protected(path: &str) -> bool {
    path == "/dashboard" || path.starts_with("/dashboard/")
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

pub async fn session_gate(State(state): State<AppState>, jar: CookieJar, mut request: Request, next: Next) -> Response {
    let secure = state.config.cookie_secure;
    let mut updates = CookieJar::new();

    let auth = match resolve(state.identity.as_ref(), &jar).await {
        Resolution::Valid(auth) => Some(auth),
        Resolution::Refreshed(fresh) => {
            updates = session::session_cookies(updates, &fresh, secure);
            Some(Authenticated { identity: fresh.user, access_token: fresh.access_token })
        }
        Resolution::Expired => {
            updates = session::clear_session_cookies(updates, secure);
            None
        }
        Resolution::Anonymous => None,
    };

    let Some(auth) = auth else {
        if is_protected(request.uri().path()) {
            return (updates, Redirect::temporary("/login")).into_response();
        }
        return (updates, next.run(request).await).into_response();
    };

    request.extensions_mut().insert(auth);
    (updates, next.run(request).await).into_response()
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

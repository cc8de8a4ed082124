//! Session cookies and PKCE material.
//!
//! ARCHITECTURE
//! ============
//! The platform issues an access/refresh token pair; the server keeps both in
//! HttpOnly cookies so page loads and the live websocket upgrade carry them
//! without any client script touching tokens. Sign-in uses the PKCE flow:
//! a random verifier waits in a short-lived cookie while the browser visits
//! the identity provider, and the callback proves possession of it.

use std::fmt::Write;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use time::Duration;

use crate::supabase::Session;

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";
pub const VERIFIER_COOKIE: &str = "sb-code-verifier";

/// Session cookies outlive the access token; the refresh token renews it.
const SESSION_MAX_AGE_DAYS: i64 = 30;
const VERIFIER_MAX_AGE_MINUTES: i64 = 10;

// =============================================================================
// PKCE
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Random 64-char hex code verifier (within the 43..=128 range PKCE allows).
#[must_use]
pub fn generate_verifier() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// S256 challenge: base64url (unpadded) of the verifier's SHA-256.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

// =============================================================================
// COOKIES
// =============================================================================

fn build(name: &'static str, value: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Store a freshly issued token pair.
#[must_use]
pub fn session_cookies(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    let max_age = Duration::days(SESSION_MAX_AGE_DAYS);
    jar.add(build(ACCESS_COOKIE, session.access_token.clone(), secure, max_age))
        .add(build(REFRESH_COOKIE, session.refresh_token.clone(), secure, max_age))
}

/// Expire both token cookies.
#[must_use]
pub fn clear_session_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(build(ACCESS_COOKIE, String::new(), secure, Duration::ZERO))
        .add(build(REFRESH_COOKIE, String::new(), secure, Duration::ZERO))
}

#[must_use]
pub fn verifier_cookie(jar: CookieJar, verifier: String, secure: bool) -> CookieJar {
    jar.add(build(VERIFIER_COOKIE, verifier, secure, Duration::minutes(VERIFIER_MAX_AGE_MINUTES)))
}

#[must_use]
pub fn clear_verifier_cookie(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(build(VERIFIER_COOKIE, String::new(), secure, Duration::ZERO))
}

/// Non-empty value of a cookie, if present.
#[must_use]
pub fn cookie_value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(Cookie::value).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

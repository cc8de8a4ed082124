//! Auth API client: authorize URL, PKCE code exchange, user lookup,
//! refresh and sign-out.
//!
//! Thin HTTP wrapper over `/auth/v1`. Response parsing lives in pure
//! functions so it can be tested without a server.

use reqwest::StatusCode;

use super::types::{AuthError, Identity, IdentityProvider, Session};
use super::{SupabaseClient, read_body};

#[derive(serde::Serialize)]
struct PkceGrant<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

#[derive(serde::Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[async_trait::async_trait]
impl IdentityProvider for SupabaseClient {
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let mut url = match reqwest::Url::parse(&self.endpoint("/auth/v1/authorize")) {
            Ok(url) => url,
            // Base URL was validated at config time.
            Err(_) => return self.endpoint("/auth/v1/authorize"),
        };
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        url.into()
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError> {
        let response = self
            .http()
            .post(self.endpoint("/auth/v1/token?grant_type=pkce"))
            .header("apikey", self.anon_key())
            .json(&PkceGrant { auth_code: code, code_verifier })
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        parse_session(status, &body)
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, AuthError> {
        let response = self
            .http()
            .get(self.endpoint("/auth/v1/user"))
            .header("apikey", self.anon_key())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        parse_user(status, &body)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let response = self
            .http()
            .post(self.endpoint("/auth/v1/token?grant_type=refresh_token"))
            .header("apikey", self.anon_key())
            .json(&RefreshGrant { refresh_token })
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        parse_session(status, &body)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http()
            .post(self.endpoint("/auth/v1/logout"))
            .header("apikey", self.anon_key())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        // An already-dead token is as signed out as it gets.
        if is_success(status) || is_unauthorized(status) {
            return Ok(());
        }
        Err(AuthError::Rejected { status, body })
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn is_success(status: u16) -> bool {
    StatusCode::from_u16(status).is_ok_and(|s| s.is_success())
}

fn is_unauthorized(status: u16) -> bool {
    matches!(status, 401 | 403)
}

pub(crate) fn parse_session(status: u16, body: &str) -> Result<Session, AuthError> {
    if !is_success(status) {
        return Err(AuthError::Rejected { status, body: body.to_string() });
    }
    serde_json::from_str(body).map_err(|e| AuthError::Parse(e.to_string()))
}

pub(crate) fn parse_user(status: u16, body: &str) -> Result<Option<Identity>, AuthError> {
    if is_unauthorized(status) {
        return Ok(None);
    }
    if !is_success(status) {
        return Err(AuthError::Rejected { status, body: body.to_string() });
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| AuthError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

//! Hosted platform client: auth, REST storage and realtime change feed.
//!
//! DESIGN
//! ======
//! One `SupabaseClient` is built in `main` from `AppConfig` and handed to
//! `AppState`; nothing reaches the platform through globals. It holds the
//! shared HTTP connection pool, the project URL and the public key.
//! Per-user handles (`RestStore`, `RealtimeFeed`) are cheap views over it that
//! add the user's access token.

pub mod auth;
pub mod realtime;
pub mod rest;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use types::{
    AuthError, BookmarkStore, ChangeEvent, ChangeFeed, DataPlane, Identity, IdentityProvider, RealtimeError, Session,
    StoreError, Subscription,
};

use crate::config::AppConfig;

const CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    heartbeat: Duration,
}

impl SupabaseClient {
    /// Build the platform client from typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &AppConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: config.supabase_url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
            }),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.inner.anon_key
    }

    pub(crate) fn heartbeat(&self) -> Duration {
        self.inner.heartbeat
    }

    /// Absolute URL for a platform path such as `/rest/v1/bookmarks`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }
}

impl DataPlane for SupabaseClient {
    fn store(&self, access_token: &str) -> Arc<dyn BookmarkStore> {
        Arc::new(rest::RestStore::new(self.clone(), access_token))
    }

    fn feed(&self, access_token: &str) -> Arc<dyn ChangeFeed> {
        Arc::new(realtime::RealtimeFeed::new(self.clone(), access_token))
    }
}

/// Status code and body text of a response.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<(u16, String), reqwest::Error> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    Ok((status, text))
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str) -> SupabaseClient {
    let config = AppConfig {
        supabase_url: base_url.into(),
        anon_key: "anon".into(),
        port: 3000,
        public_origin: "http://localhost:3000".into(),
        oauth_provider: "google".into(),
        cookie_secure: false,
        request_timeout_secs: 1,
        heartbeat_secs: 25,
    };
    SupabaseClient::new(&config).expect("test client should build")
}

//! Platform-neutral collaborator contracts and their errors.
//!
//! DESIGN
//! ======
//! Route handlers and the view actor only ever see these traits. The
//! concrete HTTP/websocket client implements them; tests swap in in-memory
//! fakes from `state::test_helpers`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bookmark::{Bookmark, BookmarkId, NewBookmark, OwnerId};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request never produced a response (DNS, TLS, timeout).
    #[error("auth request failed: {0}")]
    Request(String),
    /// The platform refused the credential (bad code, expired refresh token).
    #[error("auth rejected: status {status}")]
    Rejected { status: u16, body: String },
    #[error("auth response parse failed: {0}")]
    Parse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store responded with status {status}: {body}")]
    Response { status: u16, body: String },
    /// The access token is expired or revoked; the request needs a fresh session.
    #[error("store rejected the session: {0}")]
    Unauthorized(String),
    #[error("store response parse failed: {0}")]
    Parse(String),
    #[error("store returned no row for insert")]
    EmptyInsert,
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_STORE_REQUEST",
            Self::Response { .. } => "E_STORE_RESPONSE",
            Self::Unauthorized(_) => "E_STORE_UNAUTHORIZED",
            Self::Parse(_) => "E_STORE_PARSE",
            Self::EmptyInsert => "E_STORE_EMPTY_INSERT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("realtime connect failed: {0}")]
    Connect(String),
    #[error("realtime join failed: {0}")]
    Join(String),
    #[error("realtime join timed out")]
    JoinTimeout,
    #[error("realtime connection closed")]
    Closed,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated user as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: OwnerId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token pair issued by a code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Identity,
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL that starts the provider's OAuth flow and returns to `redirect_to`.
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String;

    /// Complete a PKCE authorization-code exchange.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, AuthError>;

    /// Resolve an access token. `Ok(None)` means the token is invalid or expired.
    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, AuthError>;

    /// Trade a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Revoke the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait::async_trait]
pub trait BookmarkStore: Send + Sync {
    /// All of the owner's bookmarks, newest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Bookmark>, StoreError>;

    /// Persist a bookmark and return the stored row with its assigned id and timestamp.
    async fn insert(&self, owner: &str, candidate: &NewBookmark) -> Result<Bookmark, StoreError>;

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError>;
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// A change to the owner's bookmark rows, normalized from the realtime feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Delete(BookmarkId),
    /// The transport reconnected and events may have been missed.
    Resync,
    /// The platform refused to rejoin with the subscription's access token.
    /// No further events follow.
    Revoked,
}

/// Live stream of change events for one owner. Dropping or closing it ends
/// the underlying connection.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    #[must_use]
    pub fn new(events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Tear down the subscription. Events still in flight are discarded.
    pub fn close(mut self) {
        self.events.close();
    }
}

#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, owner: &str) -> Result<Subscription, RealtimeError>;
}

/// Hands out store and feed handles bound to one user's access token, so
/// row-level authorization on the platform sees the right identity.
pub trait DataPlane: Send + Sync {
    fn store(&self, access_token: &str) -> Arc<dyn BookmarkStore>;

    fn feed(&self, access_token: &str) -> Arc<dyn ChangeFeed>;
}

//! Bookmark record and submit-time validation.
//!
//! DESIGN
//! ======
//! `Bookmark` mirrors the hosted `bookmarks` table row exactly, so the same
//! type deserializes from REST responses and realtime payloads. `NewBookmark`
//! is the only way to build an insert request, which guarantees nothing
//! unvalidated ever reaches the store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Store-assigned bookmark identifier. Opaque; compared for equality only.
pub type BookmarkId = String;

/// Identifier of the authenticated user owning a bookmark.
pub type OwnerId = String;

/// One saved link. Wire shape: `{ id, user_id, title, url, created_at }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    pub title: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Bookmark {
    /// Whether `url` may be rendered as a clickable link. Any absolute URL is
    /// a valid bookmark, but only `http` and `https` get an `href`.
    #[must_use]
    pub fn has_web_url(&self) -> bool {
        reqwest::Url::parse(self.url.trim()).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Both title and URL are required.")]
    EmptyTitle,
    #[error("Both title and URL are required.")]
    EmptyUrl,
    #[error("Please enter a valid URL (include https://).")]
    InvalidUrl(String),
}

impl crate::frame::ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyTitle => "E_EMPTY_TITLE",
            Self::EmptyUrl => "E_EMPTY_URL",
            Self::InvalidUrl(_) => "E_INVALID_URL",
        }
    }
}

/// A validated, trimmed insert candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
    title: String,
    url: String,
}

impl NewBookmark {
    /// Trim and validate user input.
    ///
    /// # Errors
    ///
    /// Returns an error if either field is empty after trimming, or if the url
    /// does not parse as an absolute URL.
    pub fn parse(title: &str, url: &str) -> Result<Self, ValidationError> {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        // `Url::parse` has no base, so relative references are rejected here.
        if reqwest::Url::parse(url).is_err() {
            return Err(ValidationError::InvalidUrl(url.to_string()));
        }
        Ok(Self { title: title.to_string(), url: url.to_string() })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
#[path = "bookmark_test.rs"]
mod tests;

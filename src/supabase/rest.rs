//! REST storage gateway for the `bookmarks` table.
//!
//! Every request carries the public key plus the user's access token, so the
//! platform's row-level policies scope reads and writes to that user.

use reqwest::Url;
use tracing::debug;

use super::types::{BookmarkStore, StoreError};
use super::{SupabaseClient, read_body};
use crate::bookmark::{Bookmark, NewBookmark};

const TABLE_PATH: &str = "/rest/v1/bookmarks";

pub struct RestStore {
    client: SupabaseClient,
    access_token: String,
}

impl RestStore {
    #[must_use]
    pub fn new(client: SupabaseClient, access_token: &str) -> Self {
        Self { client, access_token: access_token.to_string() }
    }

    fn table_url(&self, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.client.endpoint(TABLE_PATH)).map_err(|e| StoreError::Request(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", self.client.anon_key())
            .bearer_auth(&self.access_token)
    }
}

#[derive(serde::Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    title: &'a str,
    url: &'a str,
}

#[async_trait::async_trait]
impl BookmarkStore for RestStore {
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Bookmark>, StoreError> {
        let owner_filter = format!("eq.{owner}");
        let url = self.table_url(&[("select", "*"), ("user_id", &owner_filter), ("order", "created_at.desc")])?;
        let response = self
            .authorized(self.client.http().get(url))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let rows = parse_rows(status, &body)?;
        debug!(%owner, count = rows.len(), "store: listed bookmarks");
        Ok(rows)
    }

    async fn insert(&self, owner: &str, candidate: &NewBookmark) -> Result<Bookmark, StoreError> {
        let url = self.table_url(&[])?;
        let row = InsertRow { user_id: owner, title: candidate.title(), url: candidate.url() };
        let response = self
            .authorized(self.client.http().post(url))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        parse_rows(status, &body)?
            .into_iter()
            .next()
            .ok_or(StoreError::EmptyInsert)
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        let id_filter = format!("eq.{id}");
        let url = self.table_url(&[("id", &id_filter)])?;
        let response = self
            .authorized(self.client.http().delete(url))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let (status, body) = read_body(response)
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        check_status(status, &body)
    }
}

// =============================================================================
// PARSING
// =============================================================================

pub(crate) fn check_status(status: u16, body: &str) -> Result<(), StoreError> {
    if (200..300).contains(&status) {
        Ok(())
    } else if status == 401 {
        Err(StoreError::Unauthorized(body.to_string()))
    } else {
        Err(StoreError::Response { status, body: body.to_string() })
    }
}

pub(crate) fn parse_rows(status: u16, body: &str) -> Result<Vec<Bookmark>, StoreError> {
    check_status(status, body)?;
    serde_json::from_str(body).map_err(|e| StoreError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;

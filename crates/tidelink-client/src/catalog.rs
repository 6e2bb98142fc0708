//! Catalog endpoint wrappers
//!
//! Thin methods on [`ProviderClient`] that compose paths and query
//! parameters. Read endpoints take an optional country code and fall back to
//! the configured default; nothing here adds behavior beyond the pipeline.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::{
    client::{ApiResponse, ProviderClient, RequestOptions},
    Result, TidalError,
};

/// Page size used by [`ProviderClient::get_playlist_items`] when none is given
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default result count for [`ProviderClient::search_tracks`]
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Items of one page, from `data` (JSON:API) or `items`
pub fn page_items(body: &Value) -> Vec<Value> {
    body.get("data")
        .or_else(|| body.get("items"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// True when the page advertises a following page
fn has_next_page(body: &Value) -> bool {
    let next = |section: &str| {
        body.get(section)
            .and_then(|s| s.get("next"))
            .is_some_and(|n| !n.is_null())
    };
    next("links") || next("metadata")
}

impl ProviderClient {
    fn country<'a>(&'a self, country_code: Option<&'a str>) -> &'a str {
        country_code.unwrap_or(&self.config().default_country_code)
    }

    /// Absolute URL under the API base; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<String> {
        let base = &self.config().api_base_url;
        let mut url = Url::parse(base).map_err(|e| {
            TidalError::InvalidConfig(format!("invalid api_base_url '{base}': {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                TidalError::InvalidConfig(format!("api_base_url '{base}' cannot hold a path"))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// `GET /v2/users/me`
    pub async fn get_current_user(&self, country_code: Option<&str>) -> Result<Value> {
        let options = RequestOptions::new().param("countryCode", self.country(country_code));
        Ok(self
            .request(Method::GET, "/v2/users/me", options)
            .await?
            .body)
    }

    /// `GET /v2/users/{id}/playlists`
    pub async fn get_user_playlists(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
        country_code: Option<&str>,
    ) -> Result<Value> {
        let options = RequestOptions::new()
            .param("countryCode", self.country(country_code))
            .param("limit", limit)
            .param("offset", offset);
        let path = self.endpoint(&["v2", "users", user_id, "playlists"])?;
        Ok(self.request(Method::GET, &path, options).await?.body)
    }

    /// `GET /v2/playlists/{uuid}`, optionally with `include=items`
    pub async fn get_playlist(
        &self,
        playlist_id: &str,
        country_code: Option<&str>,
        include_items: bool,
    ) -> Result<Value> {
        let mut options = RequestOptions::new().param("countryCode", self.country(country_code));
        if include_items {
            options = options.param("include", "items");
        }
        let path = self.endpoint(&["v2", "playlists", playlist_id])?;
        Ok(self.request(Method::GET, &path, options).await?.body)
    }

    /// One page of `GET /v2/playlists/{uuid}/items`
    pub async fn get_playlist_items_page(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
        country_code: Option<&str>,
    ) -> Result<ApiResponse> {
        let options = RequestOptions::new()
            .param("countryCode", self.country(country_code))
            .param("limit", limit)
            .param("offset", offset);
        let path = self.endpoint(&["v2", "playlists", playlist_id, "items"])?;
        self.request(Method::GET, &path, options).await
    }

    /// Every item of a playlist from `offset` on.
    ///
    /// Stops at the first page that is short or has no `next` link.
    pub async fn get_playlist_items(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
        country_code: Option<&str>,
    ) -> Result<Vec<Value>> {
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let mut offset = offset;
        let mut items = Vec::new();

        loop {
            let page = self
                .get_playlist_items_page(playlist_id, limit, offset, country_code)
                .await?;
            let batch = page_items(&page.body);
            let fetched = batch.len();
            items.extend(batch);
            debug!(playlist_id, offset, fetched, "Fetched playlist page");

            if fetched < limit as usize || !has_next_page(&page.body) {
                break;
            }
            let Some(next) = offset.checked_add(limit) else {
                debug!(playlist_id, offset, "Offset limit reached, stopping pagination");
                break;
            };
            offset = next;
        }

        Ok(items)
    }

    /// `GET /v2/tracks/{id}`
    pub async fn get_track(&self, track_id: &str, country_code: Option<&str>) -> Result<Value> {
        let options = RequestOptions::new().param("countryCode", self.country(country_code));
        let path = self.endpoint(&["v2", "tracks", track_id])?;
        Ok(self.request(Method::GET, &path, options).await?.body)
    }

    /// `GET /v2/searchresults/tracks?query=`
    pub async fn search_tracks(
        &self,
        query: &str,
        limit: u32,
        country_code: Option<&str>,
    ) -> Result<Value> {
        let options = RequestOptions::new()
            .param("query", query)
            .param("countryCode", self.country(country_code))
            .param("limit", limit);
        Ok(self
            .request(Method::GET, "/v2/searchresults/tracks", options)
            .await?
            .body)
    }

    /// `GET /v2/users/{id}/favorites/tracks`
    pub async fn get_favorite_tracks(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
        country_code: Option<&str>,
    ) -> Result<Value> {
        let options = RequestOptions::new()
            .param("countryCode", self.country(country_code))
            .param("limit", limit)
            .param("offset", offset);
        let path = self.endpoint(&["v2", "users", user_id, "favorites", "tracks"])?;
        Ok(self.request(Method::GET, &path, options).await?.body)
    }

    /// `POST /v2/users/me/favorites/tracks`
    pub async fn add_track_to_favorites(&self, track_id: &str) -> Result<Value> {
        let options = RequestOptions::new().json(json!({ "trackId": track_id }));
        Ok(self
            .request(Method::POST, "/v2/users/me/favorites/tracks", options)
            .await?
            .body)
    }

    /// `DELETE /v2/users/me/favorites/tracks/{id}`
    pub async fn remove_track_from_favorites(&self, track_id: &str) -> Result<Value> {
        let path = self.endpoint(&["v2", "users", "me", "favorites", "tracks", track_id])?;
        Ok(self
            .request(Method::DELETE, &path, RequestOptions::new())
            .await?
            .body)
    }

    /// `POST /v2/playlists`
    pub async fn create_playlist(&self, title: &str, description: &str) -> Result<Value> {
        let options = RequestOptions::new().json(json!({
            "title": title,
            "description": description,
        }));
        Ok(self
            .request(Method::POST, "/v2/playlists", options)
            .await?
            .body)
    }

    /// `POST /v2/playlists/{uuid}/items`
    pub async fn add_tracks_to_playlist(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<Value> {
        let options = RequestOptions::new().json(json!({ "trackIds": track_ids }));
        let path = self.endpoint(&["v2", "playlists", playlist_id, "items"])?;
        Ok(self.request(Method::POST, &path, options).await?.body)
    }
}

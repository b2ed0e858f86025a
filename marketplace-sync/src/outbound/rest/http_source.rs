//! Reqwest-backed media API adapter.
//!
//! This adapter owns transport details only: URL building, bearer headers,
//! timeout and HTTP error mapping, and JSON decoding into domain records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::dto::{
    ApiErrorDto, CommentDto, FavouriteDto, FavouriteReceiptDto, FavouriteRequestDto, MediaDto,
    TaggedFileDto, UserDto,
};
use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{
    AuthToken, Comment, Favourite, FavouriteReceipt, FileId, Listing, TaggedFile, UserId,
    UserProfile,
};

/// Media API adapter rooted at one base URL.
pub struct RestCatalogueSource {
    client: Client,
    base_url: Url,
}

impl RestCatalogueSource {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    /// ```rust,ignore
    /// let source = RestCatalogueSource::new(base_url, Duration::from_secs(10));
    /// assert!(source.is_ok() || source.is_err());
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogueSourceError> {
        build_endpoint(&self.base_url, segments)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, CatalogueSourceError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "media API request");
        let response = send(self.client.get(url)).await?;
        let body = read_success_body(response).await?;
        decode(&body)
    }
}

#[async_trait]
impl CatalogueSource for RestCatalogueSource {
    async fn fetch_listings(&self) -> Result<Vec<Listing>, CatalogueSourceError> {
        let media: Vec<MediaDto> = self.get_json(&["media"]).await?;
        Ok(media.into_iter().map(Listing::from).collect())
    }

    async fn fetch_listing(&self, file_id: FileId) -> Result<Listing, CatalogueSourceError> {
        let id = file_id.to_string();
        let media: MediaDto = self.get_json(&["media", &id]).await?;
        Ok(media.into())
    }

    async fn fetch_comments(&self, file_id: FileId) -> Result<Vec<Comment>, CatalogueSourceError> {
        let id = file_id.to_string();
        let comments: Vec<CommentDto> = self.get_json(&["comments", &id]).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn fetch_favourites(
        &self,
        file_id: FileId,
    ) -> Result<Vec<Favourite>, CatalogueSourceError> {
        let id = file_id.to_string();
        let favourites: Vec<FavouriteDto> = self.get_json(&["favourites", "file", &id]).await?;
        Ok(favourites.into_iter().map(Favourite::from).collect())
    }

    async fn fetch_tagged(&self, tag: &str) -> Result<Vec<TaggedFile>, CatalogueSourceError> {
        let files: Vec<TaggedFileDto> = self.get_json(&["tags", tag]).await?;
        Ok(files
            .into_iter()
            .map(|file| file.into_domain(tag))
            .collect())
    }

    async fn fetch_user(
        &self,
        user_id: UserId,
        token: &AuthToken,
    ) -> Result<UserProfile, CatalogueSourceError> {
        let id = user_id.to_string();
        let url = self.endpoint(&["users", &id])?;
        debug!(%url, "media API request");
        let request = self.client.get(url).bearer_auth(require_token(token)?);
        let body = read_success_body(send(request).await?).await?;
        let user: UserDto = decode(&body)?;
        Ok(user.into())
    }

    async fn post_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<FavouriteReceipt, CatalogueSourceError> {
        let url = self.endpoint(&["favourites"])?;
        let request = self
            .client
            .post(url)
            .bearer_auth(require_token(token)?)
            .json(&FavouriteRequestDto {
                file_id: file_id.get(),
            });
        let body = read_success_body(send(request).await?).await?;
        let receipt = if body.iter().all(u8::is_ascii_whitespace) {
            FavouriteReceiptDto::default()
        } else {
            decode(&body)?
        };
        Ok(receipt.into_domain(file_id))
    }

    async fn delete_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<bool, CatalogueSourceError> {
        let id = file_id.to_string();
        let url = self.endpoint(&["favourites", &id])?;
        let request = self.client.delete(url).bearer_auth(require_token(token)?);
        let response = send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%file_id, "no favourite to delete");
            return Ok(false);
        }
        read_success_body(response).await?;
        Ok(true)
    }
}

fn require_token(token: &AuthToken) -> Result<&str, CatalogueSourceError> {
    if token.is_blank() {
        return Err(CatalogueSourceError::auth("missing bearer token"));
    }
    Ok(token.expose())
}

fn build_endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, CatalogueSourceError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| CatalogueSourceError::server(format!("base url {base_url} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn send(request: RequestBuilder) -> Result<Response, CatalogueSourceError> {
    request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(map_transport_error)
}

async fn read_success_body(response: Response) -> Result<Vec<u8>, CatalogueSourceError> {
    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(map_status_error(status, body.as_ref()));
    }
    Ok(body.to_vec())
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CatalogueSourceError> {
    serde_json::from_slice(body).map_err(|error| {
        CatalogueSourceError::server(format!("invalid media API payload: {error}"))
    })
}

fn map_transport_error(error: reqwest::Error) -> CatalogueSourceError {
    if error.is_timeout() {
        CatalogueSourceError::network(format!("request timed out: {error}"))
    } else if error.is_decode() || error.is_body() {
        CatalogueSourceError::server(error.to_string())
    } else {
        CatalogueSourceError::network(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> CatalogueSourceError {
    let detail = serde_json::from_slice::<ApiErrorDto>(body)
        .ok()
        .and_then(ApiErrorDto::summary)
        .unwrap_or_else(|| body_preview(body));
    let message = if detail.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), detail)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogueSourceError::auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            CatalogueSourceError::network(message)
        }
        _ => CatalogueSourceError::server(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

//! Driven port for the remote media API.
//!
//! The domain owns the record shapes and the error taxonomy so the enrichment
//! pipeline, avatar resolver and favourite state machine stay adapter-agnostic.
//! Implementations are stateless and never retry.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{
    AuthToken, Comment, Favourite, FavouriteReceipt, FileId, Listing, TaggedFile, UserId,
    UserProfile,
};

define_port_error! {
    /// Errors surfaced while calling the media API.
    pub enum CatalogueSourceError {
        /// Transport failed (connect, DNS, timeout) before a response arrived.
        Network { message: String } =>
            "catalogue network failure: {message}",
        /// The API rejected or did not receive credentials (401/403).
        Auth { message: String } =>
            "catalogue rejected credentials: {message}",
        /// The API failed (5xx), answered unexpectedly or sent a malformed body.
        Server { message: String } =>
            "catalogue server failure: {message}",
    }
}

impl CatalogueSourceError {
    /// Return whether a caller-driven retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Port for reading listings and writing favourites.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogueSource: Send + Sync {
    /// Fetch every listing (`GET /media`).
    async fn fetch_listings(&self) -> Result<Vec<Listing>, CatalogueSourceError>;

    /// Fetch one listing (`GET /media/:file_id`).
    async fn fetch_listing(&self, file_id: FileId) -> Result<Listing, CatalogueSourceError>;

    /// Fetch comments on a listing (`GET /comments/:file_id`).
    async fn fetch_comments(&self, file_id: FileId) -> Result<Vec<Comment>, CatalogueSourceError>;

    /// Fetch favourites on a listing (`GET /favourites/file/:file_id`).
    async fn fetch_favourites(
        &self,
        file_id: FileId,
    ) -> Result<Vec<Favourite>, CatalogueSourceError>;

    /// Fetch files carrying `tag` (`GET /tags/:tag`), in server order.
    async fn fetch_tagged(&self, tag: &str) -> Result<Vec<TaggedFile>, CatalogueSourceError>;

    /// Fetch a user's public profile (`GET /users/:user_id`); the API only
    /// answers signed-in callers.
    async fn fetch_user(
        &self,
        user_id: UserId,
        token: &AuthToken,
    ) -> Result<UserProfile, CatalogueSourceError>;

    /// Favourite a listing as the token's owner (`POST /favourites`).
    async fn post_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<FavouriteReceipt, CatalogueSourceError>;

    /// Remove the token owner's favourite (`DELETE /favourites/:file_id`).
    ///
    /// Returns `false` when the server had nothing to delete.
    async fn delete_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<bool, CatalogueSourceError>;
}

/// Fixture implementation describing an empty catalogue that accepts writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureCatalogueSource;

#[async_trait]
impl CatalogueSource for FixtureCatalogueSource {
    async fn fetch_listings(&self) -> Result<Vec<Listing>, CatalogueSourceError> {
        Ok(Vec::new())
    }

    async fn fetch_listing(&self, file_id: FileId) -> Result<Listing, CatalogueSourceError> {
        Err(CatalogueSourceError::server(format!(
            "listing {file_id} not found"
        )))
    }

    async fn fetch_comments(
        &self,
        _file_id: FileId,
    ) -> Result<Vec<Comment>, CatalogueSourceError> {
        Ok(Vec::new())
    }

    async fn fetch_favourites(
        &self,
        _file_id: FileId,
    ) -> Result<Vec<Favourite>, CatalogueSourceError> {
        Ok(Vec::new())
    }

    async fn fetch_tagged(&self, _tag: &str) -> Result<Vec<TaggedFile>, CatalogueSourceError> {
        Ok(Vec::new())
    }

    async fn fetch_user(
        &self,
        user_id: UserId,
        _token: &AuthToken,
    ) -> Result<UserProfile, CatalogueSourceError> {
        Err(CatalogueSourceError::server(format!(
            "user {user_id} not found"
        )))
    }

    async fn post_favourite(
        &self,
        file_id: FileId,
        _token: &AuthToken,
    ) -> Result<FavouriteReceipt, CatalogueSourceError> {
        Ok(FavouriteReceipt {
            favourite_id: None,
            file_id,
        })
    }

    async fn delete_favourite(
        &self,
        _file_id: FileId,
        _token: &AuthToken,
    ) -> Result<bool, CatalogueSourceError> {
        Ok(true)
    }
}

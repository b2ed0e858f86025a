//! Domain primitives and services.
//!
//! Purpose: model marketplace listings and their social state, and keep the
//! enriched catalogue consistent with optimistic favourite changes. Nothing in
//! here knows about HTTP; the remote API is reached through
//! [`ports::CatalogueSource`].
//!
//! Public surface:
//! - Listing types: [`Listing`], [`EnrichedListing`], [`Category`] and ids.
//! - [`Error`] / [`ErrorCode`]: transport-agnostic failures.
//! - [`EnrichmentPipeline`], [`AvatarResolver`], [`FavouriteStateMachine`].
//! - [`CatalogueQuery`]: the facade consumers share.

pub mod avatar;
pub mod catalogue;
pub mod enrichment;
pub mod error;
pub mod favourites;
pub mod listing;
pub mod ports;
pub mod profile;
pub mod session;

pub use self::avatar::{AvatarConfig, AvatarResolver};
pub use self::catalogue::{
    CatalogueConfig, CatalogueQuery, ListingFilter, ListingQuery, SortOrder,
};
pub use self::enrichment::{EnrichmentConfig, EnrichmentPipeline};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::favourites::{FavouriteState, FavouriteStateMachine, FavouriteView};
pub use self::listing::{
    Category, Comment, EnrichedListing, Favourite, FavouriteReceipt, FileId, Listing,
    ParseCategoryError, TaggedFile, UserId, UserProfile,
};
pub use self::profile::ProfileResolver;
pub use self::session::{AuthToken, Session};

/// Result alias for facade operations.
///
/// # Examples
/// ```
/// use marketplace_sync::domain::{Error, SyncResult};
///
/// fn toggle() -> SyncResult<bool> {
///     Err(Error::unauthorized("sign in to save favourites"))
/// }
/// assert!(toggle().is_err());
/// ```
pub type SyncResult<T> = Result<T, Error>;

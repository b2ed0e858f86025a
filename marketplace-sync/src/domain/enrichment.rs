//! Enrichment pipeline: join raw listings with their social data.
//!
//! The pipeline fans out one comments request and one favourites request per
//! listing through an ordered, bounded buffer, then joins each result into an
//! [`EnrichedListing`]. Output order always matches catalogue order, whatever
//! order the requests complete in.
//!
//! Secondary failures never drop a listing: the failed part is zeroed and the
//! listing is flagged `degraded`. Only a failed catalogue read is fatal.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{Category, Comment, EnrichedListing, Favourite, FileId, Listing, UserId};

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Upper bound on listings whose secondary fetches run at once.
    pub max_concurrent_fetches: usize,
    /// Application tag scoping the catalogue and its categories.
    ///
    /// When set, the catalogue is the set of files tagged with it and
    /// categories are read from `<app_tag>_<category>` tags.
    pub app_tag: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            app_tag: None,
        }
    }
}

/// Category membership for one batch.
type CategoryIndex = BTreeMap<FileId, BTreeSet<Category>>;

/// Raw fetch results for one listing, before joining.
#[derive(Debug)]
pub(crate) struct FetchedListing {
    pub(crate) listing: Listing,
    pub(crate) comments: Result<Vec<Comment>, CatalogueSourceError>,
    pub(crate) favourites: Result<Vec<Favourite>, CatalogueSourceError>,
}

/// Builds enriched listings from the remote catalogue.
pub struct EnrichmentPipeline {
    source: Arc<dyn CatalogueSource>,
    config: EnrichmentConfig,
}

impl EnrichmentPipeline {
    /// Build a pipeline over `source`.
    pub fn new(source: Arc<dyn CatalogueSource>, config: EnrichmentConfig) -> Self {
        Self { source, config }
    }

    /// Fetch and enrich the whole catalogue for `current_user`.
    ///
    /// # Errors
    ///
    /// Returns the source error when the catalogue itself cannot be read.
    /// Per-listing comment or favourite failures degrade that listing instead.
    pub async fn enrich_catalogue(
        &self,
        current_user: Option<UserId>,
    ) -> Result<Vec<EnrichedListing>, CatalogueSourceError> {
        let listings = self.fetch_catalogue().await?;
        let categories = self.fetch_category_index().await;

        let enriched = stream::iter(listings.into_iter().map(|listing| self.fetch_social(listing)))
            .buffered(self.concurrency())
            .map(|fetched| join_listing(fetched, current_user, &categories))
            .collect::<Vec<_>>()
            .await;

        let degraded = enriched.iter().filter(|listing| listing.degraded).count();
        info!(listings = enriched.len(), degraded, "catalogue enriched");
        Ok(enriched)
    }

    /// Fetch and enrich a single listing.
    ///
    /// Category membership is not looked up; callers carry it over from the
    /// cached entry.
    ///
    /// # Errors
    ///
    /// Returns the source error when the listing itself cannot be read.
    pub async fn enrich_one(
        &self,
        file_id: FileId,
        current_user: Option<UserId>,
    ) -> Result<EnrichedListing, CatalogueSourceError> {
        let listing = self.source.fetch_listing(file_id).await?;
        let fetched = self.fetch_social(listing).await;
        Ok(join_listing(fetched, current_user, &CategoryIndex::new()))
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrent_fetches.max(1)
    }

    async fn fetch_catalogue(&self) -> Result<Vec<Listing>, CatalogueSourceError> {
        let listings = match self.config.app_tag.as_deref() {
            None => self.source.fetch_listings().await?,
            Some(app_tag) => {
                let tagged = self.source.fetch_tagged(app_tag).await?;
                stream::iter(
                    tagged
                        .into_iter()
                        .map(|file| self.source.fetch_listing(file.file_id)),
                )
                .buffered(self.concurrency())
                .try_collect::<Vec<_>>()
                .await?
            }
        };
        Ok(dedup_by_identity(listings))
    }

    async fn fetch_category_index(&self) -> CategoryIndex {
        let Some(app_tag) = self.config.app_tag.as_deref() else {
            return CategoryIndex::new();
        };

        let lookups = Category::ALL.into_iter().map(|category| async move {
            let tag = category.tag(app_tag);
            (category, self.source.fetch_tagged(&tag).await)
        });

        let mut index = CategoryIndex::new();
        for (category, result) in join_all(lookups).await {
            match result {
                Ok(files) => {
                    for file in files {
                        index.entry(file.file_id).or_default().insert(category);
                    }
                }
                Err(error) => {
                    warn!(%category, %error, "category lookup failed; membership unknown");
                }
            }
        }
        index
    }

    async fn fetch_social(&self, listing: Listing) -> FetchedListing {
        let file_id = listing.file_id;
        let (comments, favourites) = futures_util::join!(
            self.source.fetch_comments(file_id),
            self.source.fetch_favourites(file_id),
        );
        FetchedListing {
            listing,
            comments,
            favourites,
        }
    }
}

fn dedup_by_identity(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::with_capacity(listings.len());
    listings
        .into_iter()
        .filter(|listing| {
            let first = seen.insert(listing.file_id);
            if !first {
                debug!(file_id = %listing.file_id, "duplicate listing dropped");
            }
            first
        })
        .collect()
}

fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Join one listing with its fetch results.
pub(crate) fn join_listing(
    fetched: FetchedListing,
    current_user: Option<UserId>,
    categories: &CategoryIndex,
) -> EnrichedListing {
    let FetchedListing {
        listing,
        comments,
        favourites,
    } = fetched;
    let file_id = listing.file_id;
    let mut degraded = false;

    let comment_count = match comments {
        Ok(comments) => saturating_count(
            comments
                .iter()
                .filter(|comment| comment.file_id == file_id)
                .count(),
        ),
        Err(error) => {
            warn!(%file_id, %error, "comments unavailable; listing degraded");
            degraded = true;
            0
        }
    };

    let (favourite_count, is_favourited_by_current_user) = match favourites {
        Ok(favourites) => {
            let users = favourites
                .iter()
                .filter(|favourite| favourite.file_id == file_id)
                .map(|favourite| favourite.user_id)
                .collect::<BTreeSet<_>>();
            let mine = current_user.is_some_and(|user| users.contains(&user));
            (saturating_count(users.len()), mine)
        }
        Err(error) => {
            warn!(%file_id, %error, "favourites unavailable; listing degraded");
            degraded = true;
            (0, false)
        }
    };

    EnrichedListing {
        categories: categories.get(&file_id).cloned().unwrap_or_default(),
        listing,
        favourite_count,
        is_favourited_by_current_user,
        comment_count,
        degraded,
    }
}

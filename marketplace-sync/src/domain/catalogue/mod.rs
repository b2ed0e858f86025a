//! Query facade: the single entry point consumers share.
//!
//! `CatalogueQuery` owns the enriched-listing cache plus the avatar and owner
//! profile caches. Screens receive it by `Arc` and never hold a writable
//! reference to any of them. Reads reuse the cached catalogue until something invalidates it;
//! favourite toggles patch the cached entries in place.

mod query;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

pub use self::query::{ListingFilter, ListingQuery, SortOrder};
use crate::domain::avatar::{AvatarConfig, AvatarResolver};
use crate::domain::enrichment::{EnrichmentConfig, EnrichmentPipeline};
use crate::domain::favourites::{FavouriteState, FavouriteStateMachine, FavouriteView};
use crate::domain::ports::CatalogueSource;
use crate::domain::profile::ProfileResolver;
use crate::domain::{EnrichedListing, Error, FileId, Session, UserId, UserProfile};

/// Facade construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueConfig {
    /// Enrichment fan-out and catalogue scope.
    pub enrichment: EnrichmentConfig,
    /// Avatar URLs.
    pub avatars: AvatarConfig,
    /// User whose favourite flags the catalogue carries.
    pub current_user: Option<UserId>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    last_update: Option<u64>,
    current_user: Option<UserId>,
    listings: Option<Vec<EnrichedListing>>,
}

/// The enriched-listing cache. Only the facade writes to it.
#[derive(Debug, Default)]
pub(crate) struct CatalogueCache {
    state: Mutex<CacheState>,
}

impl CatalogueCache {
    fn with_user(current_user: Option<UserId>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                current_user,
                ..CacheState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self) -> Option<Vec<EnrichedListing>> {
        self.lock().listings.clone()
    }

    /// Generation and user a rebuild should run for.
    fn rebuild_ticket(&self) -> (u64, Option<UserId>) {
        let state = self.lock();
        (state.generation, state.current_user)
    }

    /// Store a rebuilt catalogue unless it was invalidated meanwhile.
    fn install(&self, generation: u64, listings: Vec<EnrichedListing>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.listings = Some(listings);
        true
    }

    fn invalidate(&self) -> u64 {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        state.listings = None;
        state.generation
    }

    fn observe_update(&self, counter: u64) -> bool {
        let changed = {
            let mut state = self.lock();
            let changed = state.last_update != Some(counter);
            state.last_update = Some(counter);
            changed
        };
        if changed {
            self.invalidate();
        }
        changed
    }

    fn set_current_user(&self, user: Option<UserId>) -> bool {
        let changed = {
            let mut state = self.lock();
            let changed = state.current_user != user;
            state.current_user = user;
            changed
        };
        if changed {
            self.invalidate();
        }
        changed
    }

    fn current_user(&self) -> Option<UserId> {
        self.lock().current_user
    }

    fn find(&self, file_id: FileId) -> Option<EnrichedListing> {
        self.lock()
            .listings
            .as_ref()?
            .iter()
            .find(|listing| listing.file_id() == file_id)
            .cloned()
    }

    /// Swap in a refreshed entry, keeping cached category membership.
    fn replace(&self, generation: u64, mut refreshed: EnrichedListing) -> Option<EnrichedListing> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        let slot = state
            .listings
            .as_mut()?
            .iter_mut()
            .find(|listing| listing.file_id() == refreshed.file_id())?;
        refreshed.categories = std::mem::take(&mut slot.categories);
        *slot = refreshed.clone();
        Some(refreshed)
    }
}

/// Re-apply in-flight toggles to freshly fetched listings, which still show
/// the server's pre-toggle flags and counts.
fn overlay_pending(listings: &mut [EnrichedListing], pending: &[(FileId, bool)]) {
    for &(file_id, favourited) in pending {
        if let Some(listing) = listings.iter_mut().find(|l| l.file_id() == file_id) {
            listing.reconcile_favourite(favourited);
        }
    }
}

impl FavouriteView for CatalogueCache {
    fn is_favourited(&self, user_id: UserId, file_id: FileId) -> Option<bool> {
        let state = self.lock();
        if state.current_user != Some(user_id) {
            return None;
        }
        state
            .listings
            .as_ref()?
            .iter()
            .find(|listing| listing.file_id() == file_id)
            .map(|listing| listing.is_favourited_by_current_user)
    }

    fn reconcile(&self, user_id: UserId, file_id: FileId, favourited: bool) -> bool {
        let mut state = self.lock();
        if state.current_user != Some(user_id) {
            return false;
        }
        let Some(listing) = state
            .listings
            .as_mut()
            .and_then(|listings| listings.iter_mut().find(|l| l.file_id() == file_id))
        else {
            return false;
        };
        listing.reconcile_favourite(favourited);
        true
    }
}

/// Shared read/write entry point for catalogue consumers.
pub struct CatalogueQuery {
    pipeline: EnrichmentPipeline,
    avatars: AvatarResolver,
    profiles: ProfileResolver,
    favourites: Arc<FavouriteStateMachine>,
    cache: Arc<CatalogueCache>,
    rebuild_gate: tokio::sync::Mutex<()>,
}

impl CatalogueQuery {
    /// Build a facade with empty caches over `source`.
    pub fn new(source: Arc<dyn CatalogueSource>, config: CatalogueConfig) -> Self {
        let CatalogueConfig {
            enrichment,
            avatars,
            current_user,
        } = config;
        Self {
            pipeline: EnrichmentPipeline::new(Arc::clone(&source), enrichment),
            avatars: AvatarResolver::new(Arc::clone(&source), avatars),
            profiles: ProfileResolver::new(Arc::clone(&source)),
            favourites: Arc::new(FavouriteStateMachine::new(source)),
            cache: Arc::new(CatalogueCache::with_user(current_user)),
            rebuild_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Enriched listings matching `query`.
    ///
    /// The catalogue is fetched only when the cache is empty or invalidated;
    /// concurrent callers share one rebuild.
    ///
    /// # Errors
    ///
    /// Returns the catalogue read failure when a rebuild was needed and the
    /// listing fetch failed. Consumers show a retry affordance.
    pub async fn enriched_listings(&self, query: &ListingQuery) -> Result<Vec<EnrichedListing>, Error> {
        let listings = self.catalogue().await?;
        Ok(query.apply(listings))
    }

    /// Number of listings owned by `user_id` (the seller card's "N listings").
    ///
    /// # Errors
    ///
    /// Same as [`Self::enriched_listings`].
    pub async fn owner_listing_count(&self, user_id: UserId) -> Result<usize, Error> {
        let listings = self.catalogue().await?;
        Ok(listings
            .iter()
            .filter(|listing| listing.listing.user_id == user_id)
            .count())
    }

    /// Refetch one listing and patch its cached entry.
    ///
    /// The refreshed entry is returned even when the catalogue is not cached
    /// or was invalidated during the fetch; only the cache update is skipped.
    ///
    /// # Errors
    ///
    /// Returns the source error when the listing cannot be read.
    pub async fn refresh_listing(&self, file_id: FileId) -> Result<EnrichedListing, Error> {
        let (generation, user) = self.cache.rebuild_ticket();
        let mut refreshed = self.pipeline.enrich_one(file_id, user).await?;
        let patched = self.favourites.with_pending(user, |pending| {
            overlay_pending(std::slice::from_mut(&mut refreshed), pending);
            self.cache.replace(generation, refreshed.clone())
        });
        match patched {
            Some(patched) => Ok(patched),
            None => {
                debug!(%file_id, "refreshed listing not cached");
                Ok(refreshed)
            }
        }
    }

    /// Favourite state of `user_id` on `file_id`.
    ///
    /// `None` when nothing is in flight and the cached catalogue has no entry
    /// for the pair (not loaded, evicted, or another user's flags).
    pub fn favourite_state(&self, user_id: UserId, file_id: FileId) -> Option<FavouriteState> {
        self.favourites.state(self.cache.as_ref(), user_id, file_id)
    }

    /// Toggle the session user's favourite and return the new flag.
    ///
    /// The transition runs as its own task, so it completes and patches the
    /// cache even if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// See [`FavouriteStateMachine::toggle`]. A conflict means the previous
    /// tap is still in flight and should be treated as a no-op.
    pub async fn toggle_favourite(&self, session: &Session, file_id: FileId) -> Result<bool, Error> {
        let favourites = Arc::clone(&self.favourites);
        let cache = Arc::clone(&self.cache);
        let session = session.clone();
        tokio::spawn(async move { favourites.toggle(cache.as_ref(), &session, file_id).await })
            .await
            .map_err(|error| Error::server(format!("favourite task failed: {error}")))?
    }

    /// Avatar URL for `user_id`, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns the source error when an uncached lookup fails.
    pub async fn resolve_avatar(&self, user_id: UserId) -> Result<String, Error> {
        Ok(self.avatars.resolve(user_id).await?)
    }

    /// Evict one cached avatar after the user uploaded a new one.
    pub fn invalidate_avatar(&self, user_id: UserId) {
        self.avatars.invalidate(user_id);
    }

    /// Public profile of `user_id`, typically a listing owner, from cache when
    /// possible.
    ///
    /// # Errors
    ///
    /// - [`crate::domain::ErrorCode::Unauthorized`] for a blank token (no
    ///   request is sent) or when the API rejects the token on a miss.
    /// - The source error when an uncached lookup fails otherwise.
    pub async fn resolve_owner(&self, session: &Session, user_id: UserId) -> Result<UserProfile, Error> {
        if session.token.is_blank() {
            return Err(Error::unauthorized("sign in to see seller profiles"));
        }
        Ok(self.profiles.resolve(user_id, &session.token).await?)
    }

    /// Evict one cached profile after the user edited it.
    pub fn invalidate_owner(&self, user_id: UserId) {
        self.profiles.invalidate(user_id);
    }

    /// Drop the cached catalogue; the next read refetches.
    pub fn invalidate(&self) {
        let generation = self.cache.invalidate();
        info!(generation, "catalogue invalidated");
    }

    /// Feed the app's update counter; any change invalidates the catalogue.
    ///
    /// Returns whether the counter changed.
    pub fn observe_update(&self, counter: u64) -> bool {
        let changed = self.cache.observe_update(counter);
        if changed {
            info!(counter, "update counter changed; catalogue invalidated");
        }
        changed
    }

    /// Switch the user whose favourite flags the catalogue carries.
    pub fn set_current_user(&self, user: Option<UserId>) {
        if self.cache.set_current_user(user) {
            info!(user = ?user, "current user changed; catalogue invalidated");
        }
    }

    /// User whose favourite flags the catalogue carries.
    pub fn current_user(&self) -> Option<UserId> {
        self.cache.current_user()
    }

    /// Cached entry for `file_id` without fetching.
    pub fn cached_listing(&self, file_id: FileId) -> Option<EnrichedListing> {
        self.cache.find(file_id)
    }

    async fn catalogue(&self) -> Result<Vec<EnrichedListing>, Error> {
        if let Some(listings) = self.cache.cached() {
            debug!(listings = listings.len(), "catalogue cache hit");
            return Ok(listings);
        }

        let _gate = self.rebuild_gate.lock().await;
        if let Some(listings) = self.cache.cached() {
            debug!("catalogue rebuilt by a concurrent caller");
            return Ok(listings);
        }

        let (generation, user) = self.cache.rebuild_ticket();
        debug!(generation, "catalogue cache miss; rebuilding");
        let mut listings = self.pipeline.enrich_catalogue(user).await?;
        let installed = self.favourites.with_pending(user, |pending| {
            overlay_pending(&mut listings, pending);
            self.cache.install(generation, listings.clone())
        });
        if !installed {
            debug!(generation, "catalogue invalidated during rebuild; result not cached");
        }
        Ok(listings)
    }
}

#[cfg(test)]
mod tests;

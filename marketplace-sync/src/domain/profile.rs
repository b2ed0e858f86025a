//! Owner profile lookups with a per-user cache.
//!
//! Listing cards and the favourites list show the owner's username next to the
//! avatar. Profiles are public, so an answer fetched with one session's token
//! serves every later caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{AuthToken, UserId, UserProfile};

type ProfileEntry = Arc<OnceCell<UserProfile>>;

/// Resolves user ids to public profiles.
pub struct ProfileResolver {
    source: Arc<dyn CatalogueSource>,
    entries: Mutex<HashMap<UserId, ProfileEntry>>,
}

impl ProfileResolver {
    /// Build a resolver with an empty cache.
    pub fn new(source: Arc<dyn CatalogueSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the profile of `user_id`, fetching it with `token` on a miss.
    ///
    /// Concurrent misses for the same user share one lookup.
    ///
    /// # Errors
    ///
    /// Returns the source error when the lookup fails; failures are not
    /// cached.
    pub async fn resolve(
        &self,
        user_id: UserId,
        token: &AuthToken,
    ) -> Result<UserProfile, CatalogueSourceError> {
        let entry = self.entry(user_id);
        if let Some(profile) = entry.get() {
            debug!(%user_id, "profile cache hit");
            return Ok(profile.clone());
        }

        let profile = entry
            .get_or_try_init(|| async {
                let profile = self.source.fetch_user(user_id, token).await?;
                debug!(%user_id, username = %profile.username, "profile resolved");
                Ok::<_, CatalogueSourceError>(profile)
            })
            .await?;
        Ok(profile.clone())
    }

    /// Forget the cached profile for `user_id`; the next resolve refetches.
    pub fn invalidate(&self, user_id: UserId) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id)
            .is_some();
        debug!(%user_id, removed, "profile invalidated");
    }

    fn entry(&self, user_id: UserId) -> ProfileEntry {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(user_id).or_default())
    }
}

//! Avatar resolution with a per-user cache.
//!
//! Avatars are files tagged `avatar_<user_id>`; the most recent upload wins.
//! Users without one resolve to the configured default asset, and that answer
//! is cached too so repeated lookups stay local.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{TaggedFile, UserId};

/// Cached answer for one user. `None` is the default-avatar sentinel.
type AvatarEntry = Arc<OnceCell<Option<String>>>;

/// Where avatar files live and what to show without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarConfig {
    /// Prefix prepended to uploaded file names.
    pub uploads_url: String,
    /// URL returned for users without an avatar.
    pub default_avatar_url: String,
}

/// Resolves user ids to avatar URLs.
pub struct AvatarResolver {
    source: Arc<dyn CatalogueSource>,
    config: AvatarConfig,
    entries: Mutex<HashMap<UserId, AvatarEntry>>,
}

impl AvatarResolver {
    /// Build a resolver with an empty cache.
    pub fn new(source: Arc<dyn CatalogueSource>, config: AvatarConfig) -> Self {
        Self {
            source,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the avatar URL for `user_id`.
    ///
    /// Concurrent misses for the same user share one lookup.
    ///
    /// # Errors
    ///
    /// Returns the source error when the tag lookup fails; failures are not
    /// cached.
    pub async fn resolve(&self, user_id: UserId) -> Result<String, CatalogueSourceError> {
        let entry = self.entry(user_id);
        if let Some(avatar) = entry.get() {
            debug!(%user_id, "avatar cache hit");
            return Ok(self.url_for(avatar.as_deref()));
        }

        let avatar = entry.get_or_try_init(|| self.lookup(user_id)).await?;
        Ok(self.url_for(avatar.as_deref()))
    }

    /// Forget the cached avatar for `user_id`; the next resolve refetches.
    pub fn invalidate(&self, user_id: UserId) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id)
            .is_some();
        debug!(%user_id, removed, "avatar invalidated");
    }

    fn entry(&self, user_id: UserId) -> AvatarEntry {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(user_id).or_default())
    }

    fn url_for(&self, avatar: Option<&str>) -> String {
        avatar.map_or_else(|| self.config.default_avatar_url.clone(), str::to_owned)
    }

    async fn lookup(&self, user_id: UserId) -> Result<Option<String>, CatalogueSourceError> {
        let tag = format!("avatar_{user_id}");
        let files = self.source.fetch_tagged(&tag).await?;
        let avatar = latest_upload(files)
            .map(|file| format!("{}{}", self.config.uploads_url, file.filename));
        debug!(%user_id, found = avatar.is_some(), "avatar resolved");
        Ok(avatar)
    }
}

/// Most recent file; on equal timestamps the later one in server order wins.
fn latest_upload(files: Vec<TaggedFile>) -> Option<TaggedFile> {
    files.into_iter().reduce(|best, file| {
        if file.time_added >= best.time_added {
            file
        } else {
            best
        }
    })
}

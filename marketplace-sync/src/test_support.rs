//! Test utilities shared by unit and integration tests.
//!
//! [`InMemoryCatalogueSource`] behaves like a small media API: it keeps
//! server-side favourites, records every call, can fail chosen calls and can
//! hold favourite writes open so tests observe pending transitions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Semaphore;

use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{
    AuthToken, Comment, Favourite, FavouriteReceipt, FileId, Listing, TaggedFile, UserId,
    UserProfile,
};

/// One recorded call against the in-memory source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceCall {
    /// `fetch_listings`.
    Listings,
    /// `fetch_listing`.
    Listing(FileId),
    /// `fetch_comments`.
    Comments(FileId),
    /// `fetch_favourites`.
    Favourites(FileId),
    /// `fetch_tagged`.
    Tagged(String),
    /// `fetch_user`.
    User(UserId),
    /// `post_favourite`.
    PostFavourite(FileId),
    /// `delete_favourite`.
    DeleteFavourite(FileId),
}

#[derive(Default)]
struct SourceState {
    listings: Vec<Listing>,
    comments: HashMap<FileId, Vec<Comment>>,
    favourites: Vec<Favourite>,
    tags: HashMap<String, Vec<TaggedFile>>,
    users: HashMap<UserId, UserProfile>,
    tokens: HashMap<String, UserId>,
    failures: HashMap<SourceCall, CatalogueSourceError>,
    delays: HashMap<SourceCall, Duration>,
    calls: Vec<SourceCall>,
    write_gate: Option<Arc<Semaphore>>,
}

/// In-memory media API for tests.
#[derive(Default)]
pub struct InMemoryCatalogueSource {
    state: Mutex<SourceState>,
}

impl InMemoryCatalogueSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listing to the catalogue.
    pub fn add_listing(&self, listing: Listing) -> &Self {
        self.lock().listings.push(listing);
        self
    }

    /// Add a comment.
    pub fn add_comment(&self, comment: Comment) -> &Self {
        self.lock()
            .comments
            .entry(comment.file_id)
            .or_default()
            .push(comment);
        self
    }

    /// Record a server-side favourite.
    pub fn add_favourite(&self, file_id: FileId, user_id: UserId) -> &Self {
        self.lock().favourites.push(favourite(file_id, user_id));
        self
    }

    /// Attach a tagged file.
    pub fn add_tagged(&self, file: TaggedFile) -> &Self {
        self.lock()
            .tags
            .entry(file.tag.clone())
            .or_default()
            .push(file);
        self
    }

    /// Register a user profile under `user_id`.
    pub fn add_user(&self, user_id: UserId, username: &str) -> &Self {
        self.lock().users.insert(
            user_id,
            UserProfile {
                user_id,
                username: username.to_owned(),
                full_name: None,
            },
        );
        self
    }

    /// Accept `token` as belonging to `user_id` for favourite writes and
    /// profile reads.
    pub fn register_token(&self, token: &AuthToken, user_id: UserId) -> &Self {
        self.lock().tokens.insert(token.expose().to_owned(), user_id);
        self
    }

    /// Make every matching call fail with `error` until cleared.
    pub fn fail(&self, call: SourceCall, error: CatalogueSourceError) -> &Self {
        self.lock().failures.insert(call, error);
        self
    }

    /// Let matching calls succeed again.
    pub fn clear_failure(&self, call: &SourceCall) -> &Self {
        self.lock().failures.remove(call);
        self
    }

    /// Delay matching calls by `delay` before they answer.
    pub fn delay(&self, call: SourceCall, delay: Duration) -> &Self {
        self.lock().delays.insert(call, delay);
        self
    }

    /// Block favourite writes until [`Self::release_writes`] is called.
    pub fn hold_writes(&self) -> &Self {
        self.lock().write_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `count` held writes proceed.
    pub fn release_writes(&self, count: usize) {
        if let Some(gate) = self.lock().write_gate.as_ref() {
            gate.add_permits(count);
        }
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<SourceCall> {
        self.lock().calls.clone()
    }

    /// Number of calls equal to `call`.
    pub fn call_count(&self, call: &SourceCall) -> usize {
        self.lock().calls.iter().filter(|seen| *seen == call).count()
    }

    /// Server-side favourite count for `file_id`.
    pub fn server_favourite_count(&self, file_id: FileId) -> usize {
        self.lock()
            .favourites
            .iter()
            .filter(|favourite| favourite.file_id == file_id)
            .count()
    }

    async fn enter(&self, call: SourceCall) -> Result<(), CatalogueSourceError> {
        let (delay, failure) = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            (
                state.delays.get(&call).copied(),
                state.failures.get(&call).cloned(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }

    async fn pass_write_gate(&self) {
        let gate = self.lock().write_gate.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn user_for(&self, token: &AuthToken) -> Result<UserId, CatalogueSourceError> {
        self.lock()
            .tokens
            .get(token.expose())
            .copied()
            .ok_or_else(|| CatalogueSourceError::auth("status 401: invalid token"))
    }
}

#[async_trait]
impl CatalogueSource for InMemoryCatalogueSource {
    async fn fetch_listings(&self) -> Result<Vec<Listing>, CatalogueSourceError> {
        self.enter(SourceCall::Listings).await?;
        Ok(self.lock().listings.clone())
    }

    async fn fetch_listing(&self, file_id: FileId) -> Result<Listing, CatalogueSourceError> {
        self.enter(SourceCall::Listing(file_id)).await?;
        self.lock()
            .listings
            .iter()
            .find(|listing| listing.file_id == file_id)
            .cloned()
            .ok_or_else(|| CatalogueSourceError::server(format!("status 404: file {file_id}")))
    }

    async fn fetch_comments(&self, file_id: FileId) -> Result<Vec<Comment>, CatalogueSourceError> {
        self.enter(SourceCall::Comments(file_id)).await?;
        Ok(self.lock().comments.get(&file_id).cloned().unwrap_or_default())
    }

    async fn fetch_favourites(
        &self,
        file_id: FileId,
    ) -> Result<Vec<Favourite>, CatalogueSourceError> {
        self.enter(SourceCall::Favourites(file_id)).await?;
        Ok(self
            .lock()
            .favourites
            .iter()
            .filter(|favourite| favourite.file_id == file_id)
            .cloned()
            .collect())
    }

    async fn fetch_tagged(&self, tag: &str) -> Result<Vec<TaggedFile>, CatalogueSourceError> {
        self.enter(SourceCall::Tagged(tag.to_owned())).await?;
        Ok(self.lock().tags.get(tag).cloned().unwrap_or_default())
    }

    async fn fetch_user(
        &self,
        user_id: UserId,
        token: &AuthToken,
    ) -> Result<UserProfile, CatalogueSourceError> {
        self.enter(SourceCall::User(user_id)).await?;
        self.user_for(token)?;
        self.lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| CatalogueSourceError::server(format!("status 404: user {user_id}")))
    }

    async fn post_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<FavouriteReceipt, CatalogueSourceError> {
        self.enter(SourceCall::PostFavourite(file_id)).await?;
        self.pass_write_gate().await;
        let user_id = self.user_for(token)?;
        let mut state = self.lock();
        if state
            .favourites
            .iter()
            .any(|favourite| favourite.file_id == file_id && favourite.user_id == user_id)
        {
            return Err(CatalogueSourceError::server("status 400: already favourited"));
        }
        let favourite_id = u64::try_from(state.favourites.len()).unwrap_or(u64::MAX) + 1;
        state.favourites.push(Favourite {
            favourite_id: Some(favourite_id),
            file_id,
            user_id,
        });
        Ok(FavouriteReceipt {
            favourite_id: Some(favourite_id),
            file_id,
        })
    }

    async fn delete_favourite(
        &self,
        file_id: FileId,
        token: &AuthToken,
    ) -> Result<bool, CatalogueSourceError> {
        self.enter(SourceCall::DeleteFavourite(file_id)).await?;
        self.pass_write_gate().await;
        let user_id = self.user_for(token)?;
        let mut state = self.lock();
        let before = state.favourites.len();
        state
            .favourites
            .retain(|favourite| !(favourite.file_id == file_id && favourite.user_id == user_id));
        Ok(state.favourites.len() < before)
    }
}

fn at_minute(minute: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::minutes(minute)
}

/// Listing `id` owned by `owner`, added `minute` minutes after the epoch.
pub fn listing(id: u64, owner: u64, minute: i64) -> Listing {
    Listing {
        file_id: FileId::new(id),
        title: format!("Listing {id}"),
        description: format!("Item number {id} in good condition"),
        user_id: UserId::new(owner),
        time_added: at_minute(minute),
        thumbnails: BTreeMap::from([("w160".to_owned(), format!("{id}_tn.png"))]),
        filename: format!("{id}.jpg"),
        media_type: Some("image".to_owned()),
        mime_type: Some("image/jpeg".to_owned()),
    }
}

/// Same as [`listing`] with an explicit title.
pub fn titled_listing(id: u64, owner: u64, minute: i64, title: &str) -> Listing {
    Listing {
        title: title.to_owned(),
        ..listing(id, owner, minute)
    }
}

/// Favourite of `file_id` by `user_id`.
pub fn favourite(file_id: FileId, user_id: UserId) -> Favourite {
    Favourite {
        favourite_id: None,
        file_id,
        user_id,
    }
}

/// Comment `comment_id` on `file_id` by `user_id`.
pub fn comment(file_id: FileId, comment_id: u64, user_id: UserId) -> Comment {
    Comment {
        comment_id,
        file_id,
        user_id,
        comment: format!("Is item {file_id} still available?"),
        time_added: at_minute(0),
    }
}

/// File `file_id` tagged `tag`, uploaded `minute` minutes after the epoch.
pub fn tagged(file_id: u64, user_id: u64, filename: &str, minute: i64, tag: &str) -> TaggedFile {
    TaggedFile {
        file_id: FileId::new(file_id),
        filename: filename.to_owned(),
        user_id: UserId::new(user_id),
        time_added: at_minute(minute),
        tag: tag.to_owned(),
    }
}

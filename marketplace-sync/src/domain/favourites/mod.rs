//! Optimistic favourite toggles.
//!
//! Each `(user, listing)` pair moves through
//! `Unfavourited → PendingFavourite → Favourited` and back through
//! `PendingUnfavourite`. Settled states are read from the cached view; the
//! machine only records pairs with a request in flight. A pending pair rejects
//! further toggles with a conflict, so a displayed count never carries more
//! than one unconfirmed change per user and listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::ports::{CatalogueSource, CatalogueSourceError};
use crate::domain::{Error, FileId, Session, UserId};

/// Favourite state of one user on one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FavouriteState {
    /// Not favourited, nothing in flight.
    Unfavourited,
    /// Shown as favourited; `POST /favourites` in flight.
    PendingFavourite,
    /// Favourited, nothing in flight.
    Favourited,
    /// Shown as not favourited; `DELETE /favourites/:id` in flight.
    PendingUnfavourite,
}

impl FavouriteState {
    /// Settled state for a favourite flag.
    pub const fn settled(favourited: bool) -> Self {
        if favourited {
            Self::Favourited
        } else {
            Self::Unfavourited
        }
    }

    /// Whether a request is in flight.
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::PendingFavourite | Self::PendingUnfavourite)
    }

    /// Whether the user is shown as having favourited the listing.
    pub const fn is_favourited(self) -> bool {
        matches!(self, Self::Favourited | Self::PendingFavourite)
    }
}

/// The cached listings a toggle patches.
///
/// Implemented by the catalogue cache; tests supply their own.
pub trait FavouriteView: Send + Sync {
    /// Current flag for `user_id` on `file_id`, or `None` when the view has no
    /// entry for that pair.
    fn is_favourited(&self, user_id: UserId, file_id: FileId) -> Option<bool>;

    /// Make the flag equal `favourited`, moving the count by one only when the
    /// flag changes. Returns `false` when the listing is no longer present.
    fn reconcile(&self, user_id: UserId, file_id: FileId, favourited: bool) -> bool;
}

type PairKey = (UserId, FileId);

/// Per-pair optimistic toggle machine.
pub struct FavouriteStateMachine {
    source: Arc<dyn CatalogueSource>,
    pending: Mutex<HashMap<PairKey, FavouriteState>>,
}

impl FavouriteStateMachine {
    /// Build a machine with nothing in flight.
    pub fn new(source: Arc<dyn CatalogueSource>) -> Self {
        Self {
            source,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PairKey, FavouriteState>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state for a pair, or `None` when neither the machine nor the
    /// view knows it.
    pub fn state(
        &self,
        view: &dyn FavouriteView,
        user_id: UserId,
        file_id: FileId,
    ) -> Option<FavouriteState> {
        if let Some(state) = self.pending().get(&(user_id, file_id)) {
            return Some(*state);
        }
        view.is_favourited(user_id, file_id)
            .map(FavouriteState::settled)
    }

    /// Run `apply` with the optimistic flag of every pair `user_id` has in
    /// flight.
    ///
    /// The ledger stays locked while `apply` runs, so no toggle can begin or
    /// settle in between. Callers installing freshly fetched listings use this
    /// to carry in-flight patches over; `apply` may lock the view but must not
    /// call back into the machine.
    pub(crate) fn with_pending<R>(
        &self,
        user_id: Option<UserId>,
        apply: impl FnOnce(&[(FileId, bool)]) -> R,
    ) -> R {
        let pending = self.pending();
        let pairs = user_id.map_or_else(Vec::new, |user_id| {
            pending
                .iter()
                .filter(|((owner, _), _)| *owner == user_id)
                .map(|((_, file_id), state)| (*file_id, state.is_favourited()))
                .collect()
        });
        apply(&pairs)
    }

    /// Flip the session user's favourite on `file_id`.
    ///
    /// The view is patched before the request is sent and reconciled with the
    /// outcome afterwards: confirmed on success, reverted on failure. If the
    /// listing left the view meanwhile, the outcome is discarded.
    ///
    /// Returns the new favourite flag.
    ///
    /// # Errors
    ///
    /// - [`crate::domain::ErrorCode::Unauthorized`] for a blank token (no
    ///   request is sent) or when the API rejects the token.
    /// - [`crate::domain::ErrorCode::Conflict`] when a toggle for the same pair
    ///   is still pending; nothing changes.
    /// - [`crate::domain::ErrorCode::NotFound`] when the view has no entry.
    /// - Network or server errors after the optimistic patch was reverted.
    pub async fn toggle(
        &self,
        view: &dyn FavouriteView,
        session: &Session,
        file_id: FileId,
    ) -> Result<bool, Error> {
        if session.token.is_blank() {
            return Err(Error::unauthorized("sign in to save favourites"));
        }
        let user_id = session.user_id;
        let was_favourited = self.begin(view, user_id, file_id)?;
        let target = !was_favourited;

        let outcome = if target {
            self.source
                .post_favourite(file_id, &session.token)
                .await
                .map(|_| ())
        } else {
            self.source
                .delete_favourite(file_id, &session.token)
                .await
                .map(|deleted| {
                    if !deleted {
                        debug!(%user_id, %file_id, "favourite already absent on server");
                    }
                })
        };

        self.settle(view, (user_id, file_id), was_favourited, outcome)
            .map(|()| target)
    }

    fn begin(
        &self,
        view: &dyn FavouriteView,
        user_id: UserId,
        file_id: FileId,
    ) -> Result<bool, Error> {
        let mut pending = self.pending();
        if let Some(state) = pending.get(&(user_id, file_id)) {
            debug!(%user_id, %file_id, ?state, "toggle rejected; transition in flight");
            return Err(Error::conflict(format!(
                "favourite change for listing {file_id} already in flight"
            )));
        }
        let Some(was_favourited) = view.is_favourited(user_id, file_id) else {
            return Err(Error::not_found(format!(
                "listing {file_id} is not in the catalogue"
            )));
        };

        let state = if was_favourited {
            FavouriteState::PendingUnfavourite
        } else {
            FavouriteState::PendingFavourite
        };
        pending.insert((user_id, file_id), state);
        view.reconcile(user_id, file_id, !was_favourited);
        Ok(was_favourited)
    }

    fn settle(
        &self,
        view: &dyn FavouriteView,
        key: PairKey,
        was_favourited: bool,
        outcome: Result<(), CatalogueSourceError>,
    ) -> Result<(), Error> {
        let (user_id, file_id) = key;
        let mut pending = self.pending();
        let result = match outcome {
            Ok(()) => {
                let target = !was_favourited;
                if view.reconcile(user_id, file_id, target) {
                    info!(%user_id, %file_id, favourited = target, "favourite confirmed");
                } else {
                    debug!(%user_id, %file_id, "listing evicted; confirmation discarded");
                }
                Ok(())
            }
            Err(error) => {
                if view.reconcile(user_id, file_id, was_favourited) {
                    warn!(%user_id, %file_id, %error, "favourite change rolled back");
                } else {
                    debug!(%user_id, %file_id, %error, "listing evicted; rollback discarded");
                }
                Err(Error::from(error))
            }
        };
        pending.remove(&key);
        result
    }
}

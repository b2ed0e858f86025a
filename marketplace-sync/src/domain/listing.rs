//! Listing records fetched from the media API and the enriched view model.
//!
//! Raw records (`Listing`, `Comment`, `Favourite`, `TaggedFile`) are immutable
//! snapshots of server state. `EnrichedListing` is the denormalised view served
//! to consumers; only its favourite fields change after construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw server identifier.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw identifier value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id! {
    /// Server-assigned listing (media file) identifier.
    FileId
}

numeric_id! {
    /// Server-assigned user identifier.
    UserId
}

/// A marketplace item as returned by `GET /media`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Stable listing identity.
    pub file_id: FileId,
    /// Listing headline.
    pub title: String,
    /// Free-text description (price and details).
    pub description: String,
    /// Owner of the listing.
    pub user_id: UserId,
    /// Upload time.
    pub time_added: DateTime<Utc>,
    /// Thumbnail paths keyed by size label (`w160`, `w320`, `w640`).
    pub thumbnails: BTreeMap<String, String>,
    /// Full-size file name relative to the uploads URL.
    pub filename: String,
    /// Media type (`image`, `video`) when supplied.
    pub media_type: Option<String>,
    /// MIME type when supplied.
    pub mime_type: Option<String>,
}

/// A comment attached to a listing. Only counted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    /// Comment identifier, unique within its listing.
    pub comment_id: u64,
    /// Listing the comment belongs to.
    pub file_id: FileId,
    /// Author.
    pub user_id: UserId,
    /// Comment body.
    pub comment: String,
    /// Creation time.
    pub time_added: DateTime<Utc>,
}

/// One user's favourite mark on one listing.
///
/// The server holds at most one favourite per `(file_id, user_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Favourite {
    /// Server identifier when supplied.
    pub favourite_id: Option<u64>,
    /// Favourited listing.
    pub file_id: FileId,
    /// Favouriting user.
    pub user_id: UserId,
}

/// Acknowledgement returned by `POST /favourites`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavouriteReceipt {
    /// Identifier of the created favourite when the server reports one.
    pub favourite_id: Option<u64>,
    /// Listing that was favourited.
    pub file_id: FileId,
}

/// A file returned by `GET /tags/:tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFile {
    /// Tagged file.
    pub file_id: FileId,
    /// File name relative to the uploads URL.
    pub filename: String,
    /// Uploader.
    pub user_id: UserId,
    /// Upload time.
    pub time_added: DateTime<Utc>,
    /// Tag the file was found under.
    pub tag: String,
}

/// Public profile of a media API user, as returned by `GET /users/:user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// Profile owner.
    pub user_id: UserId,
    /// Display name shown next to a listing.
    pub username: String,
    /// Full name when the user filled it in.
    pub full_name: Option<String>,
}

/// Browse categories offered by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Furniture and household items.
    Home,
    /// Phones, computers and gadgets.
    Electronics,
    /// Clothes and accessories.
    Clothing,
    /// Sports equipment.
    Sports,
    /// Consoles and games.
    Gaming,
    /// Anything else.
    Others,
}

impl Category {
    /// Every category in browse order.
    pub const ALL: [Self; 6] = [
        Self::Home,
        Self::Electronics,
        Self::Clothing,
        Self::Sports,
        Self::Gaming,
        Self::Others,
    ];

    /// Stable lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Electronics => "electronics",
            Self::Clothing => "clothing",
            Self::Sports => "sports",
            Self::Gaming => "gaming",
            Self::Others => "others",
        }
    }

    /// Server tag marking membership of this category for `app_tag`.
    ///
    /// # Examples
    /// ```
    /// use marketplace_sync::domain::Category;
    ///
    /// assert_eq!(Category::Gaming.tag("kirppis"), "kirppis_gaming");
    /// ```
    pub fn tag(self, app_tag: &str) -> String {
        format!("{app_tag}_{}", self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing an unknown category label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseCategoryError(raw.to_owned()))
    }
}

/// A listing joined with its social data.
///
/// ## Invariants
/// - `favourite_count` equals the distinct favouriting users in the last
///   synchronised server state, adjusted by at most one pending toggle of the
///   current user.
/// - `degraded` is set when comments or favourites failed to load; the failed
///   part is reported as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedListing {
    /// The raw listing.
    #[serde(flatten)]
    pub listing: Listing,
    /// Number of users who favourited the listing.
    pub favourite_count: u32,
    /// Whether the current user has favourited the listing.
    pub is_favourited_by_current_user: bool,
    /// Number of comments.
    pub comment_count: u32,
    /// Secondary data failed to load.
    pub degraded: bool,
    /// Categories the listing is tagged with.
    pub categories: BTreeSet<Category>,
}

impl EnrichedListing {
    /// Identity of the underlying listing.
    pub const fn file_id(&self) -> FileId {
        self.listing.file_id
    }

    /// Set the current user's favourite flag, moving the count by one when the
    /// flag actually changes. Returns whether anything changed.
    pub(crate) fn reconcile_favourite(&mut self, favourited: bool) -> bool {
        if self.is_favourited_by_current_user == favourited {
            return false;
        }
        self.is_favourited_by_current_user = favourited;
        self.favourite_count = if favourited {
            self.favourite_count.saturating_add(1)
        } else {
            self.favourite_count.saturating_sub(1)
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn enriched(favourite_count: u32, favourited: bool) -> EnrichedListing {
        EnrichedListing {
            listing: Listing {
                file_id: FileId::new(1),
                title: "Desk lamp".to_owned(),
                description: "10e".to_owned(),
                user_id: UserId::new(7),
                time_added: DateTime::<Utc>::UNIX_EPOCH,
                thumbnails: BTreeMap::new(),
                filename: "lamp.jpg".to_owned(),
                media_type: None,
                mime_type: None,
            },
            favourite_count,
            is_favourited_by_current_user: favourited,
            comment_count: 0,
            degraded: false,
            categories: BTreeSet::new(),
        }
    }

    #[rstest]
    #[case::favourite(0, false, true, 1)]
    #[case::unfavourite(3, true, false, 2)]
    #[case::zero_floor(0, true, false, 0)]
    fn reconcile_moves_count_once(
        #[case] count: u32,
        #[case] flag: bool,
        #[case] target: bool,
        #[case] expected: u32,
    ) {
        let mut listing = enriched(count, flag);
        assert!(listing.reconcile_favourite(target));
        assert_eq!(listing.favourite_count, expected);
        assert_eq!(listing.is_favourited_by_current_user, target);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut listing = enriched(2, true);
        assert!(!listing.reconcile_favourite(true));
        assert_eq!(listing.favourite_count, 2);
    }

    #[rstest]
    #[case("home", Category::Home)]
    #[case(" Gaming ", Category::Gaming)]
    #[case("OTHERS", Category::Others)]
    fn parses_category_labels(#[case] raw: &str, #[case] expected: Category) {
        assert_eq!(raw.parse::<Category>(), Ok(expected));
    }

    #[test]
    fn rejects_unknown_category() {
        let err = "boats".parse::<Category>().expect_err("unknown label");
        assert_eq!(err.to_string(), "unknown category: boats");
    }

    #[test]
    fn enriched_listing_serialises_flat() {
        let value = serde_json::to_value(enriched(4, true)).expect("serialise");
        assert_eq!(value["file_id"], 1);
        assert_eq!(value["favourite_count"], 4);
        assert_eq!(value["is_favourited_by_current_user"], true);
    }
}

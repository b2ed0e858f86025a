//! Read-side projections over the enriched catalogue.

use std::cmp::Ordering;

use crate::domain::{Category, EnrichedListing, UserId};

/// Listing predicates. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    /// Category membership.
    pub category: Option<Category>,
    /// Case-insensitive title substring. Blank text matches everything.
    pub title_contains: Option<String>,
    /// Owner equality ("my listings", a seller's other items).
    pub owner: Option<UserId>,
    /// Only listings the current user has favourited.
    pub favourited_only: bool,
}

impl ListingFilter {
    /// Whether `listing` passes every predicate.
    pub fn matches(&self, listing: &EnrichedListing) -> bool {
        self.matcher()(listing)
    }

    fn matcher(&self) -> impl Fn(&EnrichedListing) -> bool + '_ {
        let needle = self
            .title_contains
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);

        move |listing: &EnrichedListing| {
            self.category
                .is_none_or(|category| listing.categories.contains(&category))
                && self.owner.is_none_or(|owner| listing.listing.user_id == owner)
                && (!self.favourited_only || listing.is_favourited_by_current_user)
                && needle.as_deref().is_none_or(|needle| {
                    listing.listing.title.to_lowercase().contains(needle)
                })
        }
    }
}

/// Sort orders offered to consumers. Ties always fall back to ascending
/// `file_id`, so every order is total and deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Newest first by `time_added`.
    Recent,
    /// Most favourited first.
    Popular,
}

impl SortOrder {
    /// Compare two listings under this order.
    pub fn compare(self, left: &EnrichedListing, right: &EnrichedListing) -> Ordering {
        let primary = match self {
            Self::Recent => right.listing.time_added.cmp(&left.listing.time_added),
            Self::Popular => right.favourite_count.cmp(&left.favourite_count),
        };
        primary.then_with(|| left.file_id().cmp(&right.file_id()))
    }
}

/// A complete catalogue query: filter, optional order, optional limit.
///
/// # Examples
/// ```
/// use marketplace_sync::domain::{Category, ListingQuery, SortOrder};
///
/// let query = ListingQuery::new()
///     .in_category(Category::Electronics)
///     .sorted(SortOrder::Recent)
///     .limit(5);
/// assert_eq!(query.limit, Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    /// Predicates.
    pub filter: ListingFilter,
    /// Order; `None` keeps catalogue order.
    pub sort: Option<SortOrder>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl ListingQuery {
    /// Everything, in catalogue order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to `category`.
    #[must_use]
    pub fn in_category(mut self, category: Category) -> Self {
        self.filter.category = Some(category);
        self
    }

    /// Restrict to titles containing `text`, ignoring case.
    #[must_use]
    pub fn title_contains(mut self, text: impl Into<String>) -> Self {
        self.filter.title_contains = Some(text.into());
        self
    }

    /// Restrict to listings owned by `owner`.
    #[must_use]
    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.filter.owner = Some(owner);
        self
    }

    /// Restrict to the current user's favourites.
    #[must_use]
    pub fn favourited_only(mut self) -> Self {
        self.filter.favourited_only = true;
        self
    }

    /// Order results.
    #[must_use]
    pub fn sorted(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    /// Keep at most `count` results.
    #[must_use]
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    /// Project `listings` through this query.
    pub fn apply(&self, listings: Vec<EnrichedListing>) -> Vec<EnrichedListing> {
        let matches = self.filter.matcher();
        let mut selected = listings
            .into_iter()
            .filter(|listing| matches(listing))
            .collect::<Vec<_>>();
        if let Some(order) = self.sort {
            selected.sort_by(|left, right| order.compare(left, right));
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

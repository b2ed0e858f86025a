//! Tests for the query facade and its catalogue cache.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::CatalogueSourceError;
use crate::domain::{AuthToken, Category, ErrorCode};
use crate::test_support::{InMemoryCatalogueSource, SourceCall, listing, tagged};

const ME: UserId = UserId::new(42);
const TOKEN: &str = "token-42";

fn config(current_user: Option<UserId>) -> CatalogueConfig {
    CatalogueConfig {
        enrichment: EnrichmentConfig::default(),
        avatars: AvatarConfig {
            uploads_url: "https://media.example/uploads/".to_owned(),
            default_avatar_url: "asset://avatar-default.png".to_owned(),
        },
        current_user,
    }
}

fn session() -> Session {
    Session::new(ME, AuthToken::new(TOKEN))
}

/// Listing 1 has no favourites; listing 2 has three from other users.
#[fixture]
fn source() -> Arc<InMemoryCatalogueSource> {
    let source = InMemoryCatalogueSource::new();
    source
        .add_listing(listing(1, 10, 5))
        .add_listing(listing(2, 11, 9))
        .add_favourite(FileId::new(2), UserId::new(1))
        .add_favourite(FileId::new(2), UserId::new(2))
        .add_favourite(FileId::new(2), UserId::new(3))
        .register_token(&AuthToken::new(TOKEN), ME);
    Arc::new(source)
}

fn facade(source: &Arc<InMemoryCatalogueSource>) -> CatalogueQuery {
    CatalogueQuery::new(source.clone(), config(Some(ME)))
}

fn ids(listings: &[EnrichedListing]) -> Vec<u64> {
    listings.iter().map(|listing| listing.file_id().get()).collect()
}

fn by_id(listings: &[EnrichedListing], id: u64) -> &EnrichedListing {
    listings
        .iter()
        .find(|listing| listing.file_id().get() == id)
        .expect("listing present")
}

#[rstest]
#[tokio::test]
async fn popularity_order_survives_a_toggle(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);
    let popular = ListingQuery::new().sorted(SortOrder::Popular);

    let before = catalogue.enriched_listings(&popular).await.expect("loads");
    assert_eq!(ids(&before), vec![2, 1]);

    let favourited = catalogue
        .toggle_favourite(&session(), FileId::new(1))
        .await
        .expect("toggle succeeds");
    assert!(favourited);

    let after = catalogue.enriched_listings(&popular).await.expect("loads");
    assert_eq!(ids(&after), vec![2, 1]);
    assert_eq!(by_id(&after, 1).favourite_count, 1);
    assert!(by_id(&after, 1).is_favourited_by_current_user);
    assert_eq!(source.call_count(&SourceCall::Listings), 1, "toggle patched the cache");
}

#[rstest]
#[tokio::test]
async fn reads_reuse_the_cache_until_invalidated(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);

    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    catalogue
        .enriched_listings(&ListingQuery::new().title_contains("listing 2"))
        .await
        .expect("loads");
    assert_eq!(source.call_count(&SourceCall::Listings), 1);
    assert_eq!(source.call_count(&SourceCall::Comments(FileId::new(1))), 1);

    source.add_listing(listing(3, 12, 20));
    catalogue.invalidate();

    let refreshed = catalogue
        .enriched_listings(&ListingQuery::new().sorted(SortOrder::Recent))
        .await
        .expect("loads");
    assert_eq!(ids(&refreshed), vec![3, 2, 1]);
    assert_eq!(source.call_count(&SourceCall::Listings), 2);
}

#[rstest]
#[tokio::test]
async fn update_counter_invalidates_only_on_change(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);

    assert!(catalogue.observe_update(1));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert!(!catalogue.observe_update(1));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert_eq!(source.call_count(&SourceCall::Listings), 1);

    assert!(catalogue.observe_update(2));
    assert!(catalogue.cached_listing(FileId::new(1)).is_none());
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert_eq!(source.call_count(&SourceCall::Listings), 2);
}

#[rstest]
#[tokio::test]
async fn concurrent_reads_share_one_rebuild(source: Arc<InMemoryCatalogueSource>) {
    source.delay(SourceCall::Listings, Duration::from_millis(20));
    let catalogue = facade(&source);
    let query = ListingQuery::new();

    let (first, second) = tokio::join!(
        catalogue.enriched_listings(&query),
        catalogue.enriched_listings(&query)
    );
    assert_eq!(first.expect("loads"), second.expect("loads"));
    assert_eq!(source.call_count(&SourceCall::Listings), 1);
}

#[rstest]
#[tokio::test]
async fn rebuild_invalidated_midway_is_not_cached(source: Arc<InMemoryCatalogueSource>) {
    source.delay(SourceCall::Listings, Duration::from_millis(30));
    let catalogue = Arc::new(facade(&source));

    let reader = tokio::spawn({
        let catalogue = Arc::clone(&catalogue);
        async move { catalogue.enriched_listings(&ListingQuery::new()).await }
    });
    while source.call_count(&SourceCall::Listings) == 0 {
        tokio::task::yield_now().await;
    }
    catalogue.invalidate();

    let stale = reader.await.expect("task joins").expect("loads");
    assert_eq!(stale.len(), 2, "caller still receives its result");
    assert!(catalogue.cached_listing(FileId::new(1)).is_none());

    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert_eq!(source.call_count(&SourceCall::Listings), 2);
}

#[rstest]
#[tokio::test]
async fn catalogue_failure_surfaces_and_is_not_cached(source: Arc<InMemoryCatalogueSource>) {
    source.fail(SourceCall::Listings, CatalogueSourceError::network("offline"));
    let catalogue = facade(&source);

    let error = catalogue
        .enriched_listings(&ListingQuery::new())
        .await
        .expect_err("offline");
    assert_eq!(error.code(), ErrorCode::Network);
    assert!(error.is_retryable());

    source.clear_failure(&SourceCall::Listings);
    let listings = catalogue
        .enriched_listings(&ListingQuery::new())
        .await
        .expect("recovers");
    assert_eq!(listings.len(), 2);
}

#[rstest]
#[tokio::test]
async fn favourite_state_follows_the_cache(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);
    assert_eq!(catalogue.favourite_state(ME, FileId::new(1)), None);

    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert_eq!(
        catalogue.favourite_state(ME, FileId::new(1)),
        Some(FavouriteState::Unfavourited)
    );
    assert_eq!(
        catalogue.favourite_state(UserId::new(1), FileId::new(2)),
        None,
        "only the current user's flags are cached"
    );
}

#[rstest]
#[tokio::test]
async fn toggle_requires_a_loaded_listing(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);

    let error = catalogue
        .toggle_favourite(&session(), FileId::new(1))
        .await
        .expect_err("catalogue not loaded");
    assert_eq!(error.code(), ErrorCode::NotFound);
    assert_eq!(source.call_count(&SourceCall::PostFavourite(FileId::new(1))), 0);
}

#[rstest]
#[tokio::test]
async fn toggle_for_another_user_is_not_found(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");

    let other = Session::new(UserId::new(7), AuthToken::new("token-7"));
    let error = catalogue
        .toggle_favourite(&other, FileId::new(1))
        .await
        .expect_err("other user's flags are not cached");
    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[rstest]
#[tokio::test]
async fn in_flight_toggle_finishes_after_invalidation(source: Arc<InMemoryCatalogueSource>) {
    source.hold_writes();
    let catalogue = Arc::new(facade(&source));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");

    let toggle = tokio::spawn({
        let catalogue = Arc::clone(&catalogue);
        async move { catalogue.toggle_favourite(&session(), FileId::new(1)).await }
    });
    while catalogue.favourite_state(ME, FileId::new(1)) != Some(FavouriteState::PendingFavourite) {
        tokio::task::yield_now().await;
    }

    catalogue.invalidate();
    source.release_writes(1);
    assert_eq!(toggle.await.expect("task joins"), Ok(true));
    assert_eq!(source.server_favourite_count(FileId::new(1)), 1);

    let reloaded = catalogue
        .enriched_listings(&ListingQuery::new())
        .await
        .expect("loads");
    assert_eq!(by_id(&reloaded, 1).favourite_count, 1);
    assert!(by_id(&reloaded, 1).is_favourited_by_current_user);
}

#[rstest]
#[tokio::test]
async fn rebuild_keeps_a_pending_toggle_visible(source: Arc<InMemoryCatalogueSource>) {
    source.hold_writes();
    let catalogue = Arc::new(facade(&source));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");

    let toggle = tokio::spawn({
        let catalogue = Arc::clone(&catalogue);
        async move { catalogue.toggle_favourite(&session(), FileId::new(1)).await }
    });
    while catalogue.favourite_state(ME, FileId::new(1)) != Some(FavouriteState::PendingFavourite) {
        tokio::task::yield_now().await;
    }

    catalogue.invalidate();
    let rebuilt = catalogue
        .enriched_listings(&ListingQuery::new())
        .await
        .expect("loads while the write is held");
    assert_eq!(by_id(&rebuilt, 1).favourite_count, 1);
    assert!(by_id(&rebuilt, 1).is_favourited_by_current_user);
    let cached = catalogue.cached_listing(FileId::new(1)).expect("cached");
    assert_eq!(cached.favourite_count, 1);
    assert!(cached.is_favourited_by_current_user);
    assert_eq!(
        catalogue.favourite_state(ME, FileId::new(1)),
        Some(FavouriteState::PendingFavourite)
    );

    source.release_writes(1);
    assert_eq!(toggle.await.expect("task joins"), Ok(true));
    let settled = catalogue.cached_listing(FileId::new(1)).expect("cached");
    assert_eq!(settled.favourite_count, 1, "confirmation does not double count");
    assert_eq!(
        catalogue.favourite_state(ME, FileId::new(1)),
        Some(FavouriteState::Favourited)
    );
}

#[rstest]
#[tokio::test]
async fn refresh_keeps_a_pending_toggle_visible(source: Arc<InMemoryCatalogueSource>) {
    source.hold_writes();
    let catalogue = Arc::new(facade(&source));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");

    let toggle = tokio::spawn({
        let catalogue = Arc::clone(&catalogue);
        async move { catalogue.toggle_favourite(&session(), FileId::new(2)).await }
    });
    while catalogue.favourite_state(ME, FileId::new(2)) != Some(FavouriteState::PendingFavourite) {
        tokio::task::yield_now().await;
    }

    let refreshed = catalogue
        .refresh_listing(FileId::new(2))
        .await
        .expect("refreshes");
    assert_eq!(refreshed.favourite_count, 4);
    assert!(refreshed.is_favourited_by_current_user);
    assert_eq!(
        catalogue.cached_listing(FileId::new(2)).expect("cached").favourite_count,
        4
    );

    source.release_writes(1);
    assert_eq!(toggle.await.expect("task joins"), Ok(true));
    assert_eq!(
        catalogue.cached_listing(FileId::new(2)).expect("cached").favourite_count,
        4
    );
}

#[rstest]
#[tokio::test]
async fn dropped_caller_does_not_cancel_the_toggle(source: Arc<InMemoryCatalogueSource>) {
    source.hold_writes();
    let catalogue = Arc::new(facade(&source));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");

    let caller = tokio::spawn({
        let catalogue = Arc::clone(&catalogue);
        async move { catalogue.toggle_favourite(&session(), FileId::new(1)).await }
    });
    while catalogue.favourite_state(ME, FileId::new(1)) != Some(FavouriteState::PendingFavourite) {
        tokio::task::yield_now().await;
    }
    caller.abort();
    source.release_writes(1);

    while catalogue.favourite_state(ME, FileId::new(1)) != Some(FavouriteState::Favourited) {
        tokio::task::yield_now().await;
    }
    let cached = catalogue.cached_listing(FileId::new(1)).expect("still cached");
    assert_eq!(cached.favourite_count, 1);
}

#[rstest]
#[tokio::test]
async fn switching_user_reloads_favourite_flags(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = CatalogueQuery::new(source.clone(), config(None));
    let loaded = catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert!(loaded.iter().all(|listing| !listing.is_favourited_by_current_user));

    catalogue.set_current_user(Some(UserId::new(1)));
    assert_eq!(catalogue.current_user(), Some(UserId::new(1)));
    let mine = catalogue
        .enriched_listings(&ListingQuery::new().favourited_only())
        .await
        .expect("loads");
    assert_eq!(ids(&mine), vec![2]);
    assert_eq!(source.call_count(&SourceCall::Listings), 2);

    catalogue.set_current_user(Some(UserId::new(1)));
    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    assert_eq!(source.call_count(&SourceCall::Listings), 2, "same user keeps the cache");
}

#[rstest]
#[tokio::test]
async fn owner_listing_count_uses_the_cache(source: Arc<InMemoryCatalogueSource>) {
    source.add_listing(listing(3, 10, 1));
    let catalogue = facade(&source);

    assert_eq!(catalogue.owner_listing_count(UserId::new(10)).await, Ok(2));
    assert_eq!(catalogue.owner_listing_count(UserId::new(99)).await, Ok(0));
    assert_eq!(source.call_count(&SourceCall::Listings), 1);
}

#[tokio::test]
async fn refresh_listing_keeps_cached_categories() {
    let source = Arc::new(InMemoryCatalogueSource::new());
    source
        .add_tagged(tagged(1, 10, "1.jpg", 5, "kirppis"))
        .add_tagged(tagged(1, 10, "1.jpg", 5, "kirppis_gaming"))
        .add_listing(listing(1, 10, 5))
        .register_token(&AuthToken::new(TOKEN), ME);
    let mut settings = config(Some(ME));
    settings.enrichment.app_tag = Some("kirppis".to_owned());
    let catalogue = CatalogueQuery::new(source.clone(), settings);

    catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    source.add_favourite(FileId::new(1), UserId::new(5));

    let refreshed = catalogue
        .refresh_listing(FileId::new(1))
        .await
        .expect("refreshes");
    assert_eq!(refreshed.favourite_count, 1);
    assert!(refreshed.categories.contains(&Category::Gaming));

    let gaming = catalogue
        .enriched_listings(&ListingQuery::new().in_category(Category::Gaming))
        .await
        .expect("loads");
    assert_eq!(ids(&gaming), vec![1]);
    assert_eq!(gaming[0].favourite_count, 1);
}

#[rstest]
#[tokio::test]
async fn refresh_without_cache_returns_the_listing(source: Arc<InMemoryCatalogueSource>) {
    let catalogue = facade(&source);

    let refreshed = catalogue
        .refresh_listing(FileId::new(2))
        .await
        .expect("refreshes");
    assert_eq!(refreshed.favourite_count, 3);
    assert!(catalogue.cached_listing(FileId::new(2)).is_none());
}

#[rstest]
#[tokio::test]
async fn avatars_are_cached_per_user(source: Arc<InMemoryCatalogueSource>) {
    source
        .add_tagged(tagged(8, 10, "ten.png", 1, "avatar_10"))
        .add_tagged(tagged(9, 10, "ten-new.png", 2, "avatar_10"));
    let catalogue = facade(&source);
    let call = SourceCall::Tagged("avatar_10".to_owned());

    for _ in 0..3 {
        assert_eq!(
            catalogue.resolve_avatar(UserId::new(10)).await,
            Ok("https://media.example/uploads/ten-new.png".to_owned())
        );
    }
    assert_eq!(
        catalogue.resolve_avatar(UserId::new(11)).await,
        Ok("asset://avatar-default.png".to_owned())
    );
    assert_eq!(source.call_count(&call), 1);

    catalogue.invalidate_avatar(UserId::new(10));
    catalogue.resolve_avatar(UserId::new(10)).await.expect("resolves");
    assert_eq!(source.call_count(&call), 2);
}

#[rstest]
#[tokio::test]
async fn owner_profiles_are_cached_per_user(source: Arc<InMemoryCatalogueSource>) {
    source.add_user(UserId::new(10), "seller10");
    let catalogue = facade(&source);
    let call = SourceCall::User(UserId::new(10));

    let listings = catalogue.enriched_listings(&ListingQuery::new()).await.expect("loads");
    let owner = by_id(&listings, 1).listing.user_id;
    for _ in 0..3 {
        let profile = catalogue
            .resolve_owner(&session(), owner)
            .await
            .expect("resolves");
        assert_eq!(profile.username, "seller10");
    }
    assert_eq!(source.call_count(&call), 1);

    let missing = catalogue
        .resolve_owner(&session(), UserId::new(11))
        .await
        .expect_err("no such user");
    assert_eq!(missing.code(), ErrorCode::Server);

    catalogue.invalidate_owner(owner);
    catalogue.resolve_owner(&session(), owner).await.expect("resolves");
    assert_eq!(source.call_count(&call), 2);
}

#[rstest]
#[tokio::test]
async fn owner_lookup_needs_a_session(source: Arc<InMemoryCatalogueSource>) {
    source.add_user(UserId::new(10), "seller10");
    let catalogue = facade(&source);

    let error = catalogue
        .resolve_owner(&Session::new(ME, AuthToken::new(" ")), UserId::new(10))
        .await
        .expect_err("blank token");
    assert_eq!(error.code(), ErrorCode::Unauthorized);
    assert_eq!(source.call_count(&SourceCall::User(UserId::new(10))), 0);
}

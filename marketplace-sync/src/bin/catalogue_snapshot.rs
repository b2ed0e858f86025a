//! Fetch the marketplace catalogue once and print it as JSON.
//!
//! Settings come from `MARKETPLACE_*` variables, CLI flags or a config file
//! (see `SyncSettings`). Logs go to stderr as JSON; the snapshot goes to
//! stdout, newest listings first, with each owner's avatar URL.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result, eyre};
use futures_util::future::join_all;
use marketplace_sync::config::SyncSettings;
use marketplace_sync::domain::{CatalogueQuery, EnrichedListing, ListingQuery, SortOrder, UserId};
use marketplace_sync::outbound::rest::RestCatalogueSource;
use ortho_config::OrthoConfig;
use serde::Serialize;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Serialize)]
struct Snapshot {
    listings: Vec<EnrichedListing>,
    avatars: BTreeMap<UserId, String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .json()
        .try_init()
    {
        eprintln!("tracing init failed: {e}");
    }

    let settings =
        SyncSettings::load().map_err(|error| eyre!("failed to load settings: {error}"))?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build snapshot runtime")?;
    runtime.block_on(run(settings))
}

async fn run(settings: SyncSettings) -> Result<()> {
    let base_url = settings.api_base_url()?;
    let source = RestCatalogueSource::new(base_url.clone(), settings.request_timeout())
        .wrap_err("failed to build media API client")?;
    let catalogue = CatalogueQuery::new(Arc::new(source), settings.catalogue_config()?);

    let listings = catalogue
        .enriched_listings(&ListingQuery::new().sorted(SortOrder::Recent))
        .await
        .wrap_err_with(|| format!("failed to load catalogue from {base_url}"))?;

    let owners = listings
        .iter()
        .map(|listing| listing.listing.user_id)
        .collect::<BTreeSet<_>>();
    let resolved = join_all(owners.into_iter().map(|owner| {
        let catalogue = &catalogue;
        async move { (owner, catalogue.resolve_avatar(owner).await) }
    }))
    .await;

    let mut avatars = BTreeMap::new();
    for (owner, result) in resolved {
        match result {
            Ok(url) => {
                avatars.insert(owner, url);
            }
            Err(error) => warn!(user_id = %owner, %error, "avatar unavailable"),
        }
    }

    let degraded = listings.iter().filter(|listing| listing.degraded).count();
    info!(listings = listings.len(), degraded, avatars = avatars.len(), "snapshot ready");

    let snapshot = Snapshot { listings, avatars };
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &snapshot).wrap_err("failed to write snapshot")?;
    writeln!(stdout).wrap_err("failed to write snapshot")?;
    Ok(())
}

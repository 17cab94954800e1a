//! Catalog bootstrap: one listing fetch per daemon start.

use anyhow::{Context, Result};
use jukebox_proto::catalog::{group_catalog, Album, ObjectListing};
use jukebox_proto::config::LibraryConfig;
use tracing::{info, warn};

/// Fetch the bucket listing and group it into albums.  Single attempt, no
/// retry; the caller degrades to an empty catalog on error.
pub async fn fetch_catalog(
    client: &reqwest::Client,
    library: &LibraryConfig,
) -> Result<Vec<Album>> {
    let response = client
        .get(&library.listing_url)
        .header("Accept", "application/json")
        .send()
        .await
        .context("Failed to fetch bucket listing")?;

    if !response.status().is_success() {
        anyhow::bail!("Listing endpoint returned status: {}", response.status());
    }

    let listing: ObjectListing = response
        .json()
        .await
        .context("Failed to parse bucket listing")?;

    let mut items = listing.items;
    if items.len() > library.max_entries {
        warn!(
            "Listing has {} entries, keeping the first {} (library.max_entries)",
            items.len(),
            library.max_entries
        );
        items.truncate(library.max_entries);
    }
    info!("Listing fetched: {} entries", items.len());

    Ok(group_catalog(&library.media_base_url, &items))
}

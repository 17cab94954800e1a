//! Listing-body parsing + grouping against a captured bucket response.

use jukebox_proto::catalog::{find_by_url, group_catalog, song_url, ObjectListing};

const MEDIA_BASE: &str = "https://storage.googleapis.com/michoel-streicher-songs";

/// Trimmed GCS object-list response: the daemon only consumes `items[].name`,
/// everything else must be ignored.
const LISTING_FIXTURE: &str = r#"{
  "kind": "storage#objects",
  "items": [
    {
      "kind": "storage#object",
      "id": "michoel-streicher-songs/Album A/Track 1.mp3/1700000000000000",
      "name": "Album A/Track 1.mp3",
      "bucket": "michoel-streicher-songs",
      "size": "4194304",
      "contentType": "audio/mpeg"
    },
    {
      "kind": "storage#object",
      "name": "Album A/Track 2.mp3",
      "size": "5242880",
      "contentType": "audio/mpeg"
    },
    {
      "kind": "storage#object",
      "name": "Album B/",
      "size": "0",
      "contentType": "text/plain"
    },
    {
      "kind": "storage#object",
      "name": "Album B/Track 1.mp3",
      "size": "6291456",
      "contentType": "audio/mpeg"
    }
  ]
}"#;

#[test]
fn parse_listing_and_group_into_albums() {
    let listing: ObjectListing =
        serde_json::from_str(LISTING_FIXTURE).expect("listing body should parse");
    assert_eq!(listing.items.len(), 4);

    let catalog = group_catalog(MEDIA_BASE, &listing.items);

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[0].name, "Album A");
    assert_eq!(
        catalog[0]
            .songs
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>(),
        vec!["Track 1.mp3", "Track 2.mp3"]
    );
    // The directory placeholder entry surfaces the album but no song.
    assert_eq!(catalog[1].name, "Album B");
    assert_eq!(
        catalog[1]
            .songs
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>(),
        vec!["Track 1.mp3"]
    );
}

#[test]
fn derived_urls_round_trip_through_lookup() {
    let listing: ObjectListing = serde_json::from_str(LISTING_FIXTURE).unwrap();
    let catalog = group_catalog(MEDIA_BASE, &listing.items);

    let expected = song_url(MEDIA_BASE, "Album A", "Track 2.mp3");
    assert_eq!(catalog[0].songs[1].url, expected);
    assert_eq!(
        expected,
        format!("{MEDIA_BASE}/Album%20A/Track%202.mp3")
    );

    // The URL mpv reports back on a track change resolves to the song.
    let (album, song) = find_by_url(&catalog, &expected).expect("url should resolve");
    assert_eq!(album.name, "Album A");
    assert_eq!(song.name, "Track 2.mp3");
}

#[test]
fn empty_listing_body_yields_empty_catalog() {
    let listing: ObjectListing = serde_json::from_str(r#"{"kind": "storage#objects"}"#).unwrap();
    assert!(listing.items.is_empty());
    assert!(group_catalog(MEDIA_BASE, &listing.items).is_empty());
}

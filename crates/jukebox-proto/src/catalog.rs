//! Album/song catalog built from a flat object-storage listing.
//!
//! The listing endpoint returns object names of the form `"<album>/<song>"`.
//! Grouping splits each name on the FIRST separator, so `"A/B/C"` is song
//! `"B/C"` of album `"A"`.  Entries with no separator or an empty song
//! segment (directory placeholders like `"Album A/"`) contribute no song;
//! the album key still surfaces so empty albums stay visible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Listing wire types ────────────────────────────────────────────────────────

/// Body of the storage listing endpoint (GCS object-list shape).
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectListing {
    #[serde(default)]
    pub items: Vec<CatalogEntry>,
}

/// One raw record from the listing.  `name` is `"<album>/<song>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
}

// ── Catalog types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Song {
    pub name: String,
    /// Fetchable media URL, derived at catalog build, never persisted.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Album {
    pub name: String,
    /// Displayable cover reference (data URI or placeholder).  Resolved
    /// lazily from the album's first song after the catalog is built.
    #[serde(default)]
    pub cover: String,
    pub songs: Vec<Song>,
}

/// The track a user picked.  `album` is attached at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NowPlaying {
    pub album: String,
    pub song: String,
    pub url: String,
}

// ── URL resolution ────────────────────────────────────────────────────────────

/// Map `(album, song)` to a fetchable media URL.  Each path segment is
/// percent-encoded independently, so distinct pairs never collide.
pub fn song_url(media_base: &str, album: &str, song: &str) -> String {
    format!(
        "{}/{}/{}",
        media_base.trim_end_matches('/'),
        urlencoding::encode(album),
        urlencoding::encode(song)
    )
}

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Partition a flat listing into albums, preserving first-seen album order
/// and per-album song insertion order.  Malformed names are silently
/// filtered, never an error.
pub fn group_catalog(media_base: &str, entries: &[CatalogEntry]) -> Vec<Album> {
    let mut albums: Vec<Album> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let (album, song) = match entry.name.split_once('/') {
            Some((album, song)) => (album, Some(song)),
            None => (entry.name.as_str(), None),
        };
        if album.is_empty() {
            continue;
        }

        let idx = *index.entry(album.to_string()).or_insert_with(|| {
            albums.push(Album {
                name: album.to_string(),
                cover: String::new(),
                songs: Vec::new(),
            });
            albums.len() - 1
        });

        match song {
            Some(song) if !song.is_empty() => {
                albums[idx].songs.push(Song {
                    name: song.to_string(),
                    url: song_url(media_base, album, song),
                });
            }
            // Directory placeholder or separator-less name: album only.
            _ => {}
        }
    }

    albums
}

// ── Lookup & navigation ───────────────────────────────────────────────────────

/// Find the song a playback-widget track-change notification refers to.
pub fn find_by_url<'a>(albums: &'a [Album], url: &str) -> Option<(&'a Album, &'a Song)> {
    albums.iter().find_map(|album| {
        album
            .songs
            .iter()
            .find(|song| song.url == url)
            .map(|song| (album, song))
    })
}

fn position_of(albums: &[Album], current: &NowPlaying) -> Option<(usize, usize)> {
    let album_idx = albums.iter().position(|a| a.name == current.album)?;
    let song_idx = albums[album_idx]
        .songs
        .iter()
        .position(|s| s.url == current.url)?;
    Some((album_idx, song_idx))
}

fn now_playing(album: &Album, song: &Song) -> NowPlaying {
    NowPlaying {
        album: album.name.clone(),
        song: song.name.clone(),
        url: song.url.clone(),
    }
}

/// Next song within the current album, wrapping at the end.
pub fn next_song(albums: &[Album], current: &NowPlaying) -> Option<NowPlaying> {
    let (album_idx, song_idx) = position_of(albums, current)?;
    let album = &albums[album_idx];
    let song = &album.songs[(song_idx + 1) % album.songs.len()];
    Some(now_playing(album, song))
}

/// Previous song within the current album, wrapping at the start.
pub fn prev_song(albums: &[Album], current: &NowPlaying) -> Option<NowPlaying> {
    let (album_idx, song_idx) = position_of(albums, current)?;
    let album = &albums[album_idx];
    let idx = if song_idx == 0 {
        album.songs.len() - 1
    } else {
        song_idx - 1
    };
    Some(now_playing(album, &album.songs[idx]))
}

/// Any song from the whole catalog.
pub fn random_song(albums: &[Album]) -> Option<NowPlaying> {
    use rand::Rng;

    let total: usize = albums.iter().map(|a| a.songs.len()).sum();
    if total == 0 {
        return None;
    }
    let mut pick = rand::thread_rng().gen_range(0..total);
    for album in albums {
        if pick < album.songs.len() {
            return Some(now_playing(album, &album.songs[pick]));
        }
        pick -= album.songs.len();
    }
    None
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://storage.example.com/bucket";

    fn entries(names: &[&str]) -> Vec<CatalogEntry> {
        names
            .iter()
            .map(|n| CatalogEntry {
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_group_one_album_per_prefix_in_listing_order() {
        let catalog = group_catalog(
            BASE,
            &entries(&[
                "Album A/Track 1.mp3",
                "Album A/Track 2.mp3",
                "Album B/Track 1.mp3",
            ]),
        );
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
        assert_eq!(catalog[1].name, "Album B");
        assert_eq!(catalog[1].songs.len(), 1);
        assert_eq!(catalog[1].songs[0].name, "Track 1.mp3");
    }

    #[test]
    fn test_group_preserves_interleaved_order_and_duplicates() {
        let catalog = group_catalog(
            BASE,
            &entries(&["B/one", "A/one", "B/two", "A/one", "B/one"]),
        );
        assert_eq!(catalog[0].name, "B");
        assert_eq!(catalog[1].name, "A");
        // Duplicates are kept, order is insertion order.
        assert_eq!(
            catalog[0]
                .songs
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>(),
            vec!["one", "two", "one"]
        );
        assert_eq!(catalog[1].songs.len(), 2);
    }

    #[test]
    fn test_group_filters_placeholder_and_separator_less_entries() {
        let catalog = group_catalog(
            BASE,
            &entries(&["Album A/", "Album A/Track 1.mp3", "loose-file.mp3", "/nope"]),
        );
        // Placeholder surfaces the album, contributes no song.
        assert_eq!(catalog[0].name, "Album A");
        assert_eq!(catalog[0].songs.len(), 1);
        // Separator-less name becomes an empty album.
        assert_eq!(catalog[1].name, "loose-file.mp3");
        assert!(catalog[1].songs.is_empty());
        // Empty album segment is dropped entirely.
        assert_eq!(catalog.len(), 2);
        for album in &catalog {
            assert!(album.songs.iter().all(|s| !s.name.is_empty()));
        }
    }

    #[test]
    fn test_group_splits_on_first_separator_only() {
        let catalog = group_catalog(BASE, &entries(&["A/B/C.mp3"]));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "A");
        assert_eq!(catalog[0].songs[0].name, "B/C.mp3");
    }

    #[test]
    fn test_song_url_encodes_segments() {
        let url = song_url(BASE, "Album A", "Track 1.mp3");
        assert_eq!(
            url,
            "https://storage.example.com/bucket/Album%20A/Track%201.mp3"
        );
        // Separator inside a song name must not create a path segment.
        let url = song_url(BASE, "A", "B/C.mp3");
        assert_eq!(url, "https://storage.example.com/bucket/A/B%2FC.mp3");
    }

    #[test]
    fn test_song_url_injective_over_common_characters() {
        let albums = ["Album A", "Album-A", "Album_A", "Album A!", "Album (A)"];
        let songs = ["t 1.mp3", "t-1.mp3", "t_1.mp3", "t&1.mp3", "t+1.mp3"];
        let mut seen = std::collections::HashSet::new();
        for album in &albums {
            for song in &songs {
                assert!(
                    seen.insert(song_url(BASE, album, song)),
                    "collision for ({album}, {song})"
                );
            }
        }
    }

    #[test]
    fn test_find_by_url() {
        let catalog = group_catalog(BASE, &entries(&["A/one.mp3", "B/two.mp3"]));
        let url = song_url(BASE, "B", "two.mp3");
        let (album, song) = find_by_url(&catalog, &url).expect("song should be found");
        assert_eq!(album.name, "B");
        assert_eq!(song.name, "two.mp3");
        assert!(find_by_url(&catalog, "https://elsewhere/x").is_none());
    }

    #[test]
    fn test_next_prev_wrap_within_album() {
        let catalog = group_catalog(BASE, &entries(&["A/1", "A/2", "A/3", "B/1"]));
        let current = NowPlaying {
            album: "A".into(),
            song: "3".into(),
            url: song_url(BASE, "A", "3"),
        };
        let next = next_song(&catalog, &current).unwrap();
        assert_eq!((next.album.as_str(), next.song.as_str()), ("A", "1"));
        let prev = prev_song(&catalog, &current).unwrap();
        assert_eq!((prev.album.as_str(), prev.song.as_str()), ("A", "2"));
    }

    #[test]
    fn test_random_song_skips_empty_albums() {
        let catalog = group_catalog(BASE, &entries(&["Empty/", "A/only.mp3"]));
        for _ in 0..20 {
            let pick = random_song(&catalog).unwrap();
            assert_eq!(pick.album, "A");
            assert_eq!(pick.song, "only.mp3");
        }
        assert!(random_song(&group_catalog(BASE, &entries(&["Empty/"]))).is_none());
    }
}

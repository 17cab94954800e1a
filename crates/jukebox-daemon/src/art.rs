//! Cover art resolution: fetch a track's bytes, pull the embedded picture
//! out of its tag metadata, and hand back a displayable reference.
//!
//! Best-effort by contract: every failure path degrades to the configured
//! placeholder and is only logged.  Every outcome, the placeholder
//! included, is memoized by URL, so a URL hits the network at most once
//! per daemon lifetime.

use base64::Engine as _;
use lofty::file::TaggedFileExt;
use lofty::picture::{Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
enum ArtError {
    #[error("media fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("unrecognized audio container: {0}")]
    Probe(#[from] std::io::Error),
    #[error("tag metadata unreadable: {0}")]
    Tag(#[from] lofty::error::LoftyError),
}

pub struct ArtResolver {
    client: reqwest::Client,
    placeholder: String,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl ArtResolver {
    pub fn new(placeholder: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            placeholder,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the cover reference for a media URL.  Never fails: the
    /// placeholder is the answer for missing pictures and for fetch/parse
    /// errors alike.
    pub async fn resolve(&self, url: &str) -> String {
        if let Some(hit) = self.cache.read().await.get(url) {
            debug!("cover art cache hit: {}", url);
            return hit.clone();
        }

        let resolved = match self.fetch_and_extract(url).await {
            Ok(Some((data, mime))) => data_uri(&data, &mime),
            Ok(None) => {
                debug!("no embedded picture in {}", url);
                self.placeholder.clone()
            }
            Err(e) => {
                warn!("cover art for {} degraded to placeholder: {}", url, e);
                self.placeholder.clone()
            }
        };

        // Failed lookups are cached too; retrying would re-download the
        // whole track for the same answer.
        self.cache
            .write()
            .await
            .insert(url.to_string(), resolved.clone());
        resolved
    }

    async fn fetch_and_extract(&self, url: &str) -> Result<Option<(Vec<u8>, String)>, ArtError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        extract_picture(&bytes)
    }
}

/// Parse tag metadata from a whole in-memory buffer and return the first
/// suitable embedded picture as `(bytes, mime)`.
fn extract_picture(bytes: &[u8]) -> Result<Option<(Vec<u8>, String)>, ArtError> {
    let tagged = Probe::new(Cursor::new(bytes)).guess_file_type()?.read()?;
    for tag in tagged.tags() {
        if let Some(picture) = pick_picture(tag) {
            return Ok(Some((picture.data().to_vec(), mime_label(picture))));
        }
    }
    Ok(None)
}

/// Front cover if present, otherwise whatever picture comes first.
fn pick_picture(tag: &Tag) -> Option<&Picture> {
    tag.pictures()
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| tag.pictures().first())
}

fn mime_label(picture: &Picture) -> String {
    picture
        .mime_type()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

/// Displayable reference for a raw picture payload.
fn data_uri(data: &[u8], mime: &str) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use lofty::picture::MimeType;
    use lofty::tag::TagType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PLACEHOLDER: &str = "https://via.placeholder.com/150";

    fn picture(pic_type: PictureType, data: Vec<u8>) -> Picture {
        Picture::new_unchecked(pic_type, Some(MimeType::Jpeg), None, data)
    }

    #[test]
    fn test_pick_picture_prefers_front_cover() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.push_picture(picture(PictureType::Other, vec![1]));
        tag.push_picture(picture(PictureType::CoverFront, vec![2]));
        let picked = pick_picture(&tag).unwrap();
        assert_eq!(picked.pic_type(), PictureType::CoverFront);
        assert_eq!(picked.data(), &[2]);
    }

    #[test]
    fn test_pick_picture_falls_back_to_first() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.push_picture(picture(PictureType::Other, vec![7]));
        assert_eq!(pick_picture(&tag).unwrap().data(), &[7]);
    }

    #[test]
    fn test_pick_picture_none_without_pictures() {
        let tag = Tag::new(TagType::Id3v2);
        assert!(pick_picture(&tag).is_none());
    }

    #[test]
    fn test_data_uri_encoding() {
        assert_eq!(
            data_uri(&[0xFF, 0xD8, 0xFF], "image/jpeg"),
            "data:image/jpeg;base64,/9j/"
        );
    }

    #[test]
    fn test_extract_picture_rejects_non_audio_bytes() {
        assert!(extract_picture(b"definitely not an mp3").is_err());
    }

    /// Smallest valid RIFF/WAVE file: PCM fmt chunk + four bytes of silence.
    /// Parses cleanly and carries no tag, so no picture can be found.
    fn minimal_wav() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&40u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&44100u32.to_le_bytes());
        buf.extend_from_slice(&88200u32.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf
    }

    #[test]
    fn test_extract_picture_none_for_untagged_audio() {
        assert!(extract_picture(&minimal_wav()).unwrap().is_none());
    }

    /// Serve `body` from an ephemeral local server, counting requests.
    async fn serve_bytes(body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = hits.clone();
        let app = Router::new().route(
            "/track.mp3",
            get(move || {
                let hits = hits_handler.clone();
                let body = body.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    body
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/track.mp3", addr), hits)
    }

    #[tokio::test]
    async fn test_resolve_fetches_once_per_url() {
        let (url, hits) = serve_bytes(minimal_wav()).await;
        let resolver = ArtResolver::new(PLACEHOLDER.to_string());

        // Untagged audio degrades to the placeholder...
        assert_eq!(resolver.resolve(&url).await, PLACEHOLDER);
        // ...and the second resolution is served from the cache.
        assert_eq!(resolver.resolve(&url).await, PLACEHOLDER);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_caches_parse_failures() {
        let (url, hits) = serve_bytes(b"not audio at all".to_vec()).await;
        let resolver = ArtResolver::new(PLACEHOLDER.to_string());

        assert_eq!(resolver.resolve(&url).await, PLACEHOLDER);
        assert_eq!(resolver.resolve(&url).await, PLACEHOLDER);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_degrades_on_fetch_failure() {
        let (url, _hits) = serve_bytes(minimal_wav()).await;
        let resolver = ArtResolver::new(PLACEHOLDER.to_string());

        // 404 from the server
        let missing = url.replace("/track.mp3", "/missing.mp3");
        assert_eq!(resolver.resolve(&missing).await, PLACEHOLDER);

        // Connection refused
        assert_eq!(
            resolver.resolve("http://127.0.0.1:9/refused.mp3").await,
            PLACEHOLDER
        );
    }
}

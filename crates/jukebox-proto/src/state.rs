use crate::catalog::{Album, NowPlaying};
use crate::protocol::{PlaybackStatus, PlayerHealth, PlayerState, SelectionPhase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the shared player state and the selection lifecycle.
///
/// Every selection gets a monotonically increasing sequence number; a
/// cover-art resolution that completes for a stale sequence is discarded,
/// so the displayed cover always matches the latest selection even when
/// an earlier resolution finishes later.
pub struct StateManager {
    state: Arc<RwLock<PlayerState>>,
    latest_seq: AtomicU64,
    placeholder: String,
}

impl StateManager {
    pub fn new(albums: Vec<Album>, placeholder: String, default_volume: f32) -> Self {
        let state = PlayerState {
            rev: 1,
            albums,
            selection: SelectionPhase::Idle,
            current: None,
            cover_art: placeholder.clone(),
            volume: default_volume,
            playback_status: PlaybackStatus::Idle,
            is_paused: false,
            time_pos_secs: None,
            duration_secs: None,
            player_health: PlayerHealth::Absent,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            latest_seq: AtomicU64::new(0),
            placeholder,
        }
    }

    pub fn arc(&self) -> Arc<RwLock<PlayerState>> {
        Arc::clone(&self.state)
    }

    pub async fn get_state(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Replace the catalog (built once per daemon start).
    pub async fn set_albums(&self, albums: Vec<Album>) {
        let mut state = self.state.write().await;
        state.albums = albums;
        state.rev += 1;
    }

    pub async fn set_album_cover(&self, album: &str, cover: String) {
        let mut state = self.state.write().await;
        if let Some(a) = state.albums.iter_mut().find(|a| a.name == album) {
            a.cover = cover;
            state.rev += 1;
        }
    }

    // ── selection lifecycle ───────────────────────────────────────────────────

    /// Idle|Selected -> Selecting.  The current-track label updates
    /// synchronously; the previously displayed cover is kept while the new
    /// one resolves.  Returns the sequence number the resolution must
    /// present to `complete_selection`.
    pub async fn begin_selection(&self, now: NowPlaying) -> u64 {
        let seq = self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;
        state.selection = SelectionPhase::Selecting;
        state.current = Some(now);
        state.playback_status = PlaybackStatus::Connecting;
        state.time_pos_secs = None;
        state.duration_secs = None;
        state.rev += 1;
        seq
    }

    /// Selecting -> Selected, unless `seq` is stale (a newer selection
    /// started while this resolution was in flight).  Returns whether the
    /// cover was applied.
    pub async fn complete_selection(&self, seq: u64, cover: String) -> bool {
        if seq != self.latest_seq.load(Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.write().await;
        state.selection = SelectionPhase::Selected;
        state.cover_art = cover;
        state.rev += 1;
        true
    }

    /// any -> Idle: current cleared, cover reset to the placeholder.
    pub async fn set_stopped(&self) {
        // Invalidate in-flight resolutions as well.
        self.latest_seq.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.selection = SelectionPhase::Idle;
        state.current = None;
        state.cover_art = self.placeholder.clone();
        state.playback_status = PlaybackStatus::Idle;
        state.is_paused = false;
        state.time_pos_secs = None;
        state.duration_secs = None;
        state.rev += 1;
    }

    // ── playback status ───────────────────────────────────────────────────────

    pub async fn set_playback_status(&self, status: PlaybackStatus) {
        let mut state = self.state.write().await;
        state.is_paused = status == PlaybackStatus::Paused;
        state.playback_status = status;
        state.rev += 1;
    }

    pub async fn set_player_health(&self, health: PlayerHealth) {
        let mut state = self.state.write().await;
        state.player_health = health;
        state.rev += 1;
    }

    pub async fn set_volume(&self, volume: f32) {
        let mut state = self.state.write().await;
        state.volume = volume.clamp(0.0, 1.0);
        state.rev += 1;
    }

    pub async fn set_timeline(&self, time_pos_secs: Option<f64>, duration_secs: Option<f64>) {
        let mut state = self.state.write().await;
        state.time_pos_secs = time_pos_secs;
        state.duration_secs = duration_secs;
        state.rev += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEHOLDER: &str = "https://via.placeholder.com/150";

    fn manager() -> StateManager {
        StateManager::new(Vec::new(), PLACEHOLDER.to_string(), 0.5)
    }

    fn track(song: &str) -> NowPlaying {
        NowPlaying {
            album: "Album A".into(),
            song: song.into(),
            url: format!("https://media/{song}"),
        }
    }

    #[tokio::test]
    async fn test_selection_updates_label_synchronously() {
        let sm = manager();
        let seq = sm.begin_selection(track("Track 1.mp3")).await;
        let state = sm.get_state().await;
        assert_eq!(state.selection, SelectionPhase::Selecting);
        assert_eq!(state.current.as_ref().unwrap().song, "Track 1.mp3");
        assert_eq!(state.current.as_ref().unwrap().album, "Album A");
        // Cover untouched until resolution completes.
        assert_eq!(state.cover_art, PLACEHOLDER);

        assert!(sm.complete_selection(seq, "data:image/jpeg;base64,xx".into()).await);
        let state = sm.get_state().await;
        assert_eq!(state.selection, SelectionPhase::Selected);
        assert_eq!(state.cover_art, "data:image/jpeg;base64,xx");
    }

    #[tokio::test]
    async fn test_stale_resolution_is_discarded() {
        let sm = manager();
        let first = sm.begin_selection(track("one")).await;
        let second = sm.begin_selection(track("two")).await;

        // Second resolution lands first.
        assert!(sm.complete_selection(second, "cover-two".into()).await);
        // The slower first resolution must not clobber it.
        assert!(!sm.complete_selection(first, "cover-one".into()).await);

        let state = sm.get_state().await;
        assert_eq!(state.cover_art, "cover-two");
        assert_eq!(state.current.unwrap().song, "two");
    }

    #[tokio::test]
    async fn test_stop_resets_to_idle_and_invalidates_inflight() {
        let sm = manager();
        let seq = sm.begin_selection(track("one")).await;
        sm.set_stopped().await;

        assert!(!sm.complete_selection(seq, "cover-one".into()).await);
        let state = sm.get_state().await;
        assert_eq!(state.selection, SelectionPhase::Idle);
        assert!(state.current.is_none());
        assert_eq!(state.cover_art, PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_album_cover_bumps_rev_only_for_known_album() {
        let sm = StateManager::new(
            vec![Album {
                name: "A".into(),
                cover: PLACEHOLDER.into(),
                songs: Vec::new(),
            }],
            PLACEHOLDER.to_string(),
            0.5,
        );
        let before = sm.get_state().await.rev;
        sm.set_album_cover("A", "data:image/png;base64,yy".into()).await;
        let state = sm.get_state().await;
        assert_eq!(state.albums[0].cover, "data:image/png;base64,yy");
        assert!(state.rev > before);

        let before = state.rev;
        sm.set_album_cover("missing", "x".into()).await;
        assert_eq!(sm.get_state().await.rev, before);
    }
}

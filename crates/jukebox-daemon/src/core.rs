//! Daemon core: single event loop owning catalog, selection state, the art
//! resolver, and the mpv driver.  All external inputs (client commands, mpv
//! events, finished async work) funnel in through one mpsc channel.

use crate::art::ArtResolver;
use crate::listing;
use crate::mpv::{
    MpvDriver, MpvEvent, MpvHandle, OBS_CORE_IDLE, OBS_DURATION, OBS_PATH, OBS_PAUSE, OBS_TIME_POS,
};
use crate::BroadcastMessage;
use jukebox_proto::catalog::{self, Album, NowPlaying};
use jukebox_proto::config::Config;
use jukebox_proto::protocol::{Command, PlaybackStatus, PlayerHealth};
use jukebox_proto::state::StateManager;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum DaemonEvent {
    ClientCommand(Command),
    ClientConnected,
    ClientCountChanged(usize),
    /// Listing fetch finished (possibly with an empty catalog on failure).
    CatalogLoaded(Vec<Album>),
    /// Album-level cover prefetch finished for one album.
    AlbumCoverResolved { album: String, cover: String },
    /// Per-selection cover resolution finished.  `seq` identifies the
    /// selection it belongs to; stale results are dropped.
    CoverResolved { seq: u64, cover: String },
    Player(MpvEvent),
    PlayerGone,
}

pub struct DaemonCore {
    config: Config,
    state: Arc<StateManager>,
    art: Arc<ArtResolver>,
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

impl DaemonCore {
    pub fn new(
        config: Config,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let state = Arc::new(StateManager::new(
            Vec::new(),
            config.art.placeholder.clone(),
            config.mpv.default_volume,
        ));
        let art = Arc::new(ArtResolver::new(config.art.placeholder.clone()));
        let driver = MpvDriver::new(config.mpv.default_volume);

        // Mount: the listing fetch is its own async chain; a failure means
        // an empty catalog, never a startup error.
        let library = config.library.clone();
        let tx = event_tx.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let albums = match listing::fetch_catalog(&client, &library).await {
                Ok(albums) => albums,
                Err(e) => {
                    warn!("Catalog fetch failed, starting with an empty catalog: {:#}", e);
                    Vec::new()
                }
            };
            let _ = tx.send(DaemonEvent::CatalogLoaded(albums)).await;
        });

        Self {
            config,
            state,
            art,
            driver,
            handle: None,
            broadcast_tx,
            event_tx,
        }
    }

    pub fn state_manager(&self) -> Arc<StateManager> {
        self.state.clone()
    }

    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        while let Some(event) = event_rx.recv().await {
            match event {
                DaemonEvent::CatalogLoaded(mut albums) => {
                    for album in &mut albums {
                        album.cover = self.config.art.placeholder.clone();
                    }
                    info!(
                        "Catalog ready: {} albums / {} songs",
                        albums.len(),
                        albums.iter().map(|a| a.songs.len()).sum::<usize>()
                    );
                    self.state.set_albums(albums.clone()).await;
                    self.notify_state();
                    self.spawn_album_cover_prefetch(albums);
                }
                DaemonEvent::ClientCommand(cmd) => self.handle_command(cmd).await,
                DaemonEvent::ClientConnected => {}
                DaemonEvent::ClientCountChanged(count) => {
                    debug!("Connected clients: {}", count);
                }
                DaemonEvent::AlbumCoverResolved { album, cover } => {
                    self.state.set_album_cover(&album, cover).await;
                    self.notify_state();
                }
                DaemonEvent::CoverResolved { seq, cover } => {
                    if self.state.complete_selection(seq, cover).await {
                        self.notify_state();
                    } else {
                        debug!("Dropping stale cover resolution (seq {})", seq);
                    }
                }
                DaemonEvent::Player(evt) => self.handle_player_event(evt).await,
                DaemonEvent::PlayerGone => {
                    warn!("mpv connection lost");
                    self.handle = None;
                    self.state.set_player_health(PlayerHealth::Dead).await;
                    self.notify_state();
                }
            }
        }
        Ok(())
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Play {
                album_idx,
                song_idx,
            } => {
                let state = self.state.get_state().await;
                let Some(album) = state.albums.get(album_idx) else {
                    warn!("Play: no album at index {}", album_idx);
                    return;
                };
                let Some(song) = album.songs.get(song_idx) else {
                    warn!("Play: no song at index {} in {}", song_idx, album.name);
                    return;
                };
                let now = NowPlaying {
                    album: album.name.clone(),
                    song: song.name.clone(),
                    url: song.url.clone(),
                };
                self.start_playback(now).await;
            }
            Command::Stop => {
                if let Some(handle) = &self.handle {
                    let _ = handle.stop().await;
                }
                self.state.set_stopped().await;
                self.notify_state();
            }
            Command::Next => {
                let state = self.state.get_state().await;
                if let Some(next) = state
                    .current
                    .as_ref()
                    .and_then(|cur| catalog::next_song(&state.albums, cur))
                {
                    self.start_playback(next).await;
                }
            }
            Command::Prev => {
                let state = self.state.get_state().await;
                if let Some(prev) = state
                    .current
                    .as_ref()
                    .and_then(|cur| catalog::prev_song(&state.albums, cur))
                {
                    self.start_playback(prev).await;
                }
            }
            Command::Random => {
                let state = self.state.get_state().await;
                if let Some(pick) = catalog::random_song(&state.albums) {
                    self.start_playback(pick).await;
                }
            }
            Command::TogglePause => {
                if let Some(handle) = &self.handle {
                    let paused = handle.get_pause().await.unwrap_or(false);
                    if let Err(e) = handle.set_pause(!paused).await {
                        warn!("TogglePause failed: {}", e);
                    }
                }
            }
            Command::Volume { value } => {
                self.state.set_volume(value).await;
                self.driver.last_volume = value.clamp(0.0, 1.0);
                if let Some(handle) = &self.handle {
                    let _ = handle.set_volume(value).await;
                }
                self.notify_state();
            }
            Command::SeekRelative { seconds } => {
                if let Some(handle) = &self.handle {
                    let _ = handle.seek_relative(seconds).await;
                }
            }
            Command::SeekTo { seconds } => {
                if let Some(handle) = &self.handle {
                    let _ = handle.seek_to(seconds).await;
                }
            }
            Command::GetState => self.notify_state(),
        }
    }

    // ── selection flow ────────────────────────────────────────────────────────

    /// The current-track fields are visible to clients before mpv has even
    /// been told to load anything; the cover follows whenever its
    /// resolution lands.
    async fn start_playback(&mut self, now: NowPlaying) {
        info!("Playing: {} / {}", now.album, now.song);
        let seq = self.state.begin_selection(now.clone()).await;
        self.notify_state();

        let volume = self.state.get_state().await.volume;
        match self.ensure_player().await {
            Ok(handle) => {
                if let Err(e) = handle.load_url(&now.url, volume).await {
                    warn!("mpv loadfile failed: {}", e);
                    self.state.set_playback_status(PlaybackStatus::Error).await;
                    self.notify_state();
                }
            }
            Err(e) => {
                warn!("mpv unavailable: {}", e);
                self.state.set_player_health(PlayerHealth::Dead).await;
                self.state.set_playback_status(PlaybackStatus::Error).await;
                self.notify_state();
            }
        }

        self.spawn_cover_resolution(seq, now.url);
    }

    fn spawn_cover_resolution(&self, seq: u64, url: String) {
        let art = self.art.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let cover = art.resolve(&url).await;
            let _ = tx.send(DaemonEvent::CoverResolved { seq, cover }).await;
        });
    }

    /// Warm album covers from each album's first song, in listing order.
    /// Runs as one background chain so it never blocks a selection; the
    /// shared cache means a later selection of the same song is free.
    fn spawn_album_cover_prefetch(&self, albums: Vec<Album>) {
        let art = self.art.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            for album in albums {
                let Some(first) = album.songs.first() else {
                    continue;
                };
                let cover = art.resolve(&first.url).await;
                let _ = tx
                    .send(DaemonEvent::AlbumCoverResolved {
                        album: album.name,
                        cover,
                    })
                    .await;
            }
        });
    }

    // ── mpv ───────────────────────────────────────────────────────────────────

    async fn ensure_player(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() && handle.ping().await.is_ok() {
                return Ok(handle.clone());
            }
            self.state.set_player_health(PlayerHealth::Restarting).await;
        } else {
            self.state.set_player_health(PlayerHealth::Starting).await;
        }

        let (mpv_event_tx, mut mpv_event_rx) = mpsc::channel::<MpvEvent>(64);
        let handle = self.driver.spawn_and_connect(mpv_event_tx).await?;
        handle.observe_all_properties().await;

        // Bridge driver events into the core loop; channel closure means
        // the reader task died with the process.
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(evt) = mpv_event_rx.recv().await {
                if tx.send(DaemonEvent::Player(evt)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(DaemonEvent::PlayerGone).await;
        });

        self.state.set_player_health(PlayerHealth::Running).await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn handle_player_event(&mut self, evt: MpvEvent) {
        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_CORE_IDLE => {
                    if let Some(idle) = data.as_bool() {
                        let state = self.state.get_state().await;
                        let status = if idle {
                            // Keep Connecting while a loadfile is in flight.
                            if state.playback_status == PlaybackStatus::Connecting {
                                PlaybackStatus::Connecting
                            } else {
                                PlaybackStatus::Idle
                            }
                        } else if state.is_paused {
                            PlaybackStatus::Paused
                        } else {
                            PlaybackStatus::Playing
                        };
                        if status != state.playback_status {
                            self.state.set_playback_status(status).await;
                            self.notify_state();
                        }
                    }
                }
                OBS_PAUSE => {
                    if let Some(paused) = data.as_bool() {
                        let status = if paused {
                            PlaybackStatus::Paused
                        } else {
                            PlaybackStatus::Playing
                        };
                        self.state.set_playback_status(status).await;
                        self.notify_state();
                    }
                }
                OBS_PATH => {
                    if let Some(url) = data.as_str() {
                        self.on_track_change(url.to_string()).await;
                    }
                }
                OBS_TIME_POS | OBS_DURATION => {
                    let state = self.state.get_state().await;
                    let (mut time_pos, mut duration) =
                        (state.time_pos_secs, state.duration_secs);
                    if obs_id == OBS_TIME_POS {
                        time_pos = data.as_f64();
                    } else {
                        duration = data.as_f64();
                    }
                    self.state.set_timeline(time_pos, duration).await;
                    self.notify_state();
                }
                _ => {}
            }
        } else if evt.event_name() == Some("end-file") {
            let state = self.state.get_state().await;
            if state.playback_status == PlaybackStatus::Playing {
                self.state.set_playback_status(PlaybackStatus::Idle).await;
                self.notify_state();
            }
        }
    }

    /// The widget reported a new source URL (its track-change
    /// notification).  When it differs from the current selection (mpv
    /// advanced on its own), re-run the selection transition so the label
    /// updates immediately and the cover follows.
    async fn on_track_change(&mut self, url: String) {
        let state = self.state.get_state().await;
        if state
            .current
            .as_ref()
            .map(|cur| cur.url == url)
            .unwrap_or(false)
        {
            return;
        }
        let Some((album, song)) = catalog::find_by_url(&state.albums, &url) else {
            debug!("mpv reports a path outside the catalog: {}", url);
            return;
        };
        let now = NowPlaying {
            album: album.name.clone(),
            song: song.name.clone(),
            url,
        };
        let seq = self.state.begin_selection(now.clone()).await;
        self.notify_state();
        self.spawn_cover_resolution(seq, now.url);
    }

    fn notify_state(&self) {
        // No receivers is fine — nobody is connected yet.
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }
}

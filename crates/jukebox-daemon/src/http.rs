//! HTTP control API.  CORS is open so a browser page can render the
//! catalog and drive selection directly.

use crate::core::DaemonEvent;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use jukebox_proto::protocol::{Command, PlayerState};
use jukebox_proto::state::StateManager;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
}

#[derive(Serialize)]
struct VolumeStatus {
    volume: u8,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = HttpState {
            state_manager,
            event_tx,
        };

        let app = Router::new()
            .route("/api/state", get(get_state))
            .route("/api/play/:album/:song", get(play_song).post(play_song))
            .route("/api/stop", get(stop).post(stop))
            .route("/api/next", get(next_song).post(next_song))
            .route("/api/prev", get(prev_song).post(prev_song))
            .route("/api/random", get(random_song).post(random_song))
            .route("/api/pause", get(toggle_pause).post(toggle_pause))
            .route("/api/volume/:volume", get(set_volume).post(set_volume))
            .route("/api/volume", get(get_volume))
            .layer(CorsLayer::permissive())
            .with_state(app_state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<PlayerState> {
    Json(state.state_manager.get_state().await)
}

async fn send_command(state: &HttpState, cmd: Command) -> StatusCode {
    if state
        .event_tx
        .send(DaemonEvent::ClientCommand(cmd))
        .await
        .is_err()
    {
        error!("Failed to forward HTTP command");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn play_song(
    State(state): State<HttpState>,
    axum::extract::Path((album, song)): axum::extract::Path<(usize, usize)>,
) -> StatusCode {
    info!("HTTP API: Play album {} song {}", album, song);
    send_command(
        &state,
        Command::Play {
            album_idx: album,
            song_idx: song,
        },
    )
    .await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Stop");
    send_command(&state, Command::Stop).await
}

async fn next_song(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Next song");
    send_command(&state, Command::Next).await
}

async fn prev_song(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Previous song");
    send_command(&state, Command::Prev).await
}

async fn random_song(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Random song");
    send_command(&state, Command::Random).await
}

async fn toggle_pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Toggle pause");
    send_command(&state, Command::TogglePause).await
}

async fn set_volume(
    State(state): State<HttpState>,
    axum::extract::Path(volume): axum::extract::Path<i32>,
) -> StatusCode {
    let value = (volume as f32 / 100.0).clamp(0.0, 1.0);
    info!("HTTP API: Set volume to {}%", volume);
    send_command(&state, Command::Volume { value }).await
}

async fn get_volume(State(state): State<HttpState>) -> Json<VolumeStatus> {
    let player_state = state.state_manager.get_state().await;
    let volume = (player_state.volume * 100.0).round() as u8;
    Json(VolumeStatus { volume })
}

use crate::catalog::{Album, NowPlaying};
use serde::{Deserialize, Serialize};

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to
/// an incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Play { album_idx: usize, song_idx: usize },
    Stop,
    Next,
    Prev,
    Random,
    TogglePause,
    Volume { value: f32 },
    SeekRelative { seconds: f64 },
    SeekTo { seconds: f64 },
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: daemon version + full state snapshot.
    Hello {
        protocol_version: u32,
        daemon_rev: u64,
        state: PlayerState,
    },
    State {
        data: PlayerState,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// Detailed playback status — reflects actual mpv state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // nothing loaded / explicitly stopped
    Connecting, // loadfile sent, mpv buffering/connecting
    Playing,    // core-idle=false, audio flowing
    Paused,     // explicitly paused
    Error,      // failed to play (timeout or mpv error)
}

/// Where the current track sits in its selection lifecycle.
///
/// Transitions:
///   Idle|Selected -> Selecting   (user picks a song; label updates now)
///   Selecting     -> Selected    (cover art resolved, possibly to the
///                                 placeholder; there is no error state)
///   any           -> Idle        (Stop)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum SelectionPhase {
    #[default]
    Idle,
    Selecting,
    Selected,
}

/// Health of the mpv process as observed by the daemon.
///
/// Transitions:
///   Absent -> Starting -> Running -> Dead -> Restarting -> Starting ...
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum PlayerHealth {
    /// mpv process does not exist yet (before first use).
    #[default]
    Absent,
    /// Process is spawning / socket not yet available.
    Starting,
    /// Socket connected, IPC responding normally.
    Running,
    /// Connected but IPC is slow / returning errors.
    Degraded(String),
    /// Process exited or socket closed.
    Dead,
    /// Restarting after death.
    Restarting,
}

impl PlayerHealth {
    /// True when mpv is in an error/non-running state that users should notice.
    pub fn is_unhealthy(&self) -> bool {
        matches!(
            self,
            PlayerHealth::Degraded(_) | PlayerHealth::Dead | PlayerHealth::Restarting
        )
    }
}

/// Full state of the daemon.  `rev` is a monotonically increasing counter
/// incremented every time the state changes.  Clients can use it to detect
/// missed updates and request a resync.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerState {
    /// Monotonic revision counter — incremented on every state change.
    #[serde(default)]
    pub rev: u64,
    pub albums: Vec<Album>,
    #[serde(default)]
    pub selection: SelectionPhase,
    pub current: Option<NowPlaying>,
    /// Cover reference for the current track: a data URI, or the
    /// configured placeholder when nothing is embedded or resolution
    /// degraded.
    #[serde(default)]
    pub cover_art: String,
    pub volume: f32,
    pub playback_status: PlaybackStatus,
    #[serde(default)]
    pub is_paused: bool,
    pub time_pos_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    /// Health of the mpv process as tracked by the daemon.
    #[serde(default)]
    pub player_health: PlayerHealth,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

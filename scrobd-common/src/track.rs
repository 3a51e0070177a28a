//! Track model observed from the music player
//!
//! A `Track` is one sample of the player's state. Samples are value
//! objects: position, duration, and playback state may change from
//! sample to sample while the identity triple (name, artist, album)
//! stays fixed for the lifetime of a play.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Playback state reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// No track loaded, or playback halted
    Stopped,
    /// Track is currently playing
    Playing,
    /// Track is paused
    Paused,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
        }
    }
}

/// One observation of the currently loaded track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track title
    pub name: String,
    /// Artist name
    pub artist: String,
    /// Album name (may be empty)
    pub album: String,
    /// Total track duration
    pub duration: Duration,
    /// Current playback position within the track
    pub position: Duration,
    /// Playback state at sample time
    pub state: PlayerState,
}

impl Track {
    /// Two samples belong to the same play candidate when the identity
    /// triple matches. Position, duration, and state are ignored.
    pub fn same_play(&self, other: &Track) -> bool {
        self.name == other.name && self.artist == other.artist && self.album == other.album
    }
}

/// One poller delivery: either a track sample (None = stopped/no player)
/// or the error that prevented sampling.
#[derive(Debug, Clone)]
pub struct TrackUpdate {
    pub track: Option<Track>,
    pub error: Option<String>,
}

impl TrackUpdate {
    pub fn track(track: Option<Track>) -> Self {
        Self { track, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            track: None,
            error: Some(message.into()),
        }
    }
}

//! Public request and response types

/// Opaque token from `auth.getToken`, valid for 60 minutes
#[derive(Debug, Clone)]
pub struct Token {
    pub token: String,
}

/// Authenticated session from `auth.getSession`
#[derive(Debug, Clone)]
pub struct Session {
    /// Long-lived session key; store it, it does not expire
    pub key: String,
    /// Last.fm username that authorized the application
    pub username: String,
    pub subscriber: bool,
}

/// Parameters for `track.updateNowPlaying`
#[derive(Debug, Clone, Default)]
pub struct NowPlaying {
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Track length in seconds
    pub duration: Option<u64>,
    pub track_number: Option<u32>,
    /// MusicBrainz recording id
    pub mbid: Option<String>,
}

/// Server acknowledgement of a now-playing update, with any metadata
/// corrections applied
#[derive(Debug, Clone, Default)]
pub struct NowPlayingConfirmation {
    pub artist: String,
    pub track: String,
    pub album: String,
    pub ignored_code: u32,
    pub ignored_message: String,
}

/// One play record for `track.scrobble`
#[derive(Debug, Clone, Default)]
pub struct ScrobbleEntry {
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Track length in seconds
    pub duration: Option<u64>,
    pub track_number: Option<u32>,
    pub mbid: Option<String>,
    /// Unix seconds when playback of this track began
    pub timestamp: i64,
}

/// Per-entry outcome echoed back by the scrobble endpoint
#[derive(Debug, Clone, Default)]
pub struct ScrobbledTrack {
    pub artist: String,
    pub track: String,
    pub timestamp: i64,
    /// Non-zero when the service accepted the call but discarded this
    /// entry (too old, duplicate, filtered metadata)
    pub ignored_code: u32,
    pub ignored_message: String,
}

/// Response of one `track.scrobble` call
#[derive(Debug, Clone, Default)]
pub struct ScrobbleReceipt {
    pub accepted: u32,
    pub ignored: u32,
    pub tracks: Vec<ScrobbledTrack>,
}

impl ScrobbleReceipt {
    /// True when the service discarded at least one entry
    pub fn any_ignored(&self) -> bool {
        self.ignored > 0
    }
}

//! Scrobble eligibility rules
//!
//! Fixed by the remote service: a play counts once the track has run
//! for half its length or four minutes, whichever comes first, and
//! tracks under 30 seconds never count.

use std::time::Duration;

/// Minimum track length required for scrobbling
pub const MINIMUM_TRACK_DURATION: Duration = Duration::from_secs(30);

/// Upper bound on the play-time threshold
pub const MAX_SCROBBLE_THRESHOLD: Duration = Duration::from_secs(240);

/// Whether a play with the given track length and accumulated play
/// time is eligible to scrobble.
pub fn should_scrobble(track_duration: Duration, played: Duration) -> bool {
    match scrobble_threshold(track_duration) {
        Some(threshold) => played >= threshold,
        None => false,
    }
}

/// The play-time threshold for a track, or `None` when the track is
/// too short to ever scrobble.
pub fn scrobble_threshold(track_duration: Duration) -> Option<Duration> {
    if track_duration < MINIMUM_TRACK_DURATION {
        return None;
    }
    Some((track_duration / 2).min(MAX_SCROBBLE_THRESHOLD))
}

//! Submission seam between the queue drain loop and the remote API
//!
//! The engine talks to [`Submitter`]; the production implementation
//! wraps the Last.fm client. Remotely *ignored* entries count as
//! submitted — retrying them forever would never change the outcome.

use crate::error::Result;
use crate::queue::QueuedScrobble;
use async_trait::async_trait;
use scrobd_common::Track;
use scrobd_lastfm::{Client, NowPlaying, ScrobbleEntry};
use tracing::{debug, warn};

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Advisory now-playing update for a track that just started.
    async fn now_playing(&self, track: &Track) -> Result<()>;

    /// Submit a batch of queued scrobbles. `Ok` means every entry in
    /// the batch may be marked submitted.
    async fn submit(&self, batch: &[QueuedScrobble]) -> Result<()>;
}

/// Last.fm-backed submitter
pub struct LastFmSubmitter {
    client: Client,
}

impl LastFmSubmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Submitter for LastFmSubmitter {
    async fn now_playing(&self, track: &Track) -> Result<()> {
        let np = NowPlaying {
            artist: track.artist.clone(),
            track: track.name.clone(),
            album: (!track.album.is_empty()).then(|| track.album.clone()),
            duration: (track.duration.as_secs() > 0).then(|| track.duration.as_secs()),
            ..Default::default()
        };

        let confirmation = self.client.update_now_playing(&np).await?;
        if confirmation.ignored_code != 0 {
            debug!(
                code = confirmation.ignored_code,
                message = %confirmation.ignored_message,
                "now-playing update filtered by last.fm"
            );
        }
        Ok(())
    }

    async fn submit(&self, batch: &[QueuedScrobble]) -> Result<()> {
        let entries: Vec<ScrobbleEntry> = batch.iter().map(to_entry).collect();

        let receipt = if let [single] = entries.as_slice() {
            self.client.scrobble(single).await?
        } else {
            self.client.scrobble_batch(&entries).await?
        };

        if receipt.any_ignored() {
            // The call succeeded; the service just declined some plays
            // (too old, duplicate). Nothing a retry would fix.
            for track in receipt.tracks.iter().filter(|t| t.ignored_code != 0) {
                warn!(
                    track = %track.track,
                    artist = %track.artist,
                    code = track.ignored_code,
                    message = %track.ignored_message,
                    "scrobble ignored by last.fm"
                );
            }
        }

        Ok(())
    }
}

fn to_entry(qs: &QueuedScrobble) -> ScrobbleEntry {
    ScrobbleEntry {
        artist: qs.artist.clone(),
        track: qs.track_name.clone(),
        album: (!qs.album.is_empty()).then(|| qs.album.clone()),
        duration: (qs.duration.as_secs() > 0).then(|| qs.duration.as_secs()),
        timestamp: qs.timestamp.timestamp(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn queued_scrobble_maps_to_entry() {
        let qs = QueuedScrobble {
            id: 7,
            track_name: "Yesterday".to_string(),
            artist: "The Beatles".to_string(),
            album: "Help!".to_string(),
            duration: Duration::from_secs(125),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            submitted: false,
            error: String::new(),
        };

        let entry = to_entry(&qs);
        assert_eq!(entry.artist, "The Beatles");
        assert_eq!(entry.track, "Yesterday");
        assert_eq!(entry.album.as_deref(), Some("Help!"));
        assert_eq!(entry.duration, Some(125));
        assert_eq!(entry.timestamp, 1_700_000_000);
    }

    #[test]
    fn empty_album_and_zero_duration_are_omitted() {
        let qs = QueuedScrobble {
            id: 1,
            track_name: "t".to_string(),
            artist: "a".to_string(),
            album: String::new(),
            duration: Duration::ZERO,
            timestamp: Utc::now(),
            submitted: false,
            error: String::new(),
        };

        let entry = to_entry(&qs);
        assert!(entry.album.is_none());
        assert!(entry.duration.is_none());
    }
}

//! Now-playing updates and scrobble submission
//!
//! `track.scrobble` takes indexed parameters (`artist[0]`,
//! `timestamp[0]`, ...) for up to 50 entries per call. Anything past
//! 50 is truncated here; callers that page through a backlog resubmit
//! the remainder on their next cycle.

use crate::error::{Error, Result};
use crate::types::{
    NowPlaying, NowPlayingConfirmation, ScrobbleEntry, ScrobbleReceipt, ScrobbledTrack,
};
use crate::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Maximum entries the remote accepts per scrobble call
pub const MAX_BATCH_SIZE: usize = 50;

/// Text node that may carry a `corrected` attribute, e.g.
/// `<artist corrected="0">Name</artist>`
#[derive(Debug, Default, Deserialize)]
struct CorrectedText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct IgnoredNode {
    #[serde(rename = "@code", default)]
    code: u32,
    #[serde(rename = "$text", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NowPlayingDocument {
    nowplaying: NowPlayingNode,
}

#[derive(Debug, Deserialize)]
struct NowPlayingNode {
    #[serde(default)]
    artist: CorrectedText,
    #[serde(default)]
    track: CorrectedText,
    #[serde(default)]
    album: CorrectedText,
    #[serde(rename = "ignoredMessage", default)]
    ignored: IgnoredNode,
}

#[derive(Debug, Deserialize)]
struct ScrobblesDocument {
    scrobbles: ScrobblesNode,
}

#[derive(Debug, Deserialize)]
struct ScrobblesNode {
    #[serde(rename = "@accepted")]
    accepted: u32,
    #[serde(rename = "@ignored")]
    ignored: u32,
    #[serde(rename = "scrobble", default)]
    entries: Vec<ScrobbleNode>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleNode {
    #[serde(default)]
    artist: CorrectedText,
    #[serde(default)]
    track: CorrectedText,
    #[serde(default)]
    timestamp: String,
    #[serde(rename = "ignoredMessage", default)]
    ignored: IgnoredNode,
}

impl Client {
    /// Advisory "now listening" update (`track.updateNowPlaying`).
    /// Does not affect play counts; requires a session key.
    pub async fn update_now_playing(&self, np: &NowPlaying) -> Result<NowPlayingConfirmation> {
        let params = now_playing_params(np);
        let body = self.call("track.updateNowPlaying", params, true).await?;
        parse_now_playing_response(&body)
    }

    /// Submit a single play record.
    pub async fn scrobble(&self, entry: &ScrobbleEntry) -> Result<ScrobbleReceipt> {
        self.scrobble_batch(std::slice::from_ref(entry)).await
    }

    /// Submit up to [`MAX_BATCH_SIZE`] play records in one call.
    /// Longer batches are truncated; the response's counts tell the
    /// caller how much of the submitted window was accepted.
    pub async fn scrobble_batch(&self, entries: &[ScrobbleEntry]) -> Result<ScrobbleReceipt> {
        if entries.is_empty() {
            return Ok(ScrobbleReceipt::default());
        }

        let entries = if entries.len() > MAX_BATCH_SIZE {
            warn!(
                submitted = entries.len(),
                limit = MAX_BATCH_SIZE,
                "truncating scrobble batch"
            );
            &entries[..MAX_BATCH_SIZE]
        } else {
            entries
        };

        let params = batch_params(entries);
        let body = self.call("track.scrobble", params, true).await?;
        parse_scrobble_response(&body)
    }
}

fn now_playing_params(np: &NowPlaying) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("artist".to_string(), np.artist.clone());
    params.insert("track".to_string(), np.track.clone());

    if let Some(album) = &np.album {
        if !album.is_empty() {
            params.insert("album".to_string(), album.clone());
        }
    }
    if let Some(album_artist) = &np.album_artist {
        if !album_artist.is_empty() {
            params.insert("albumArtist".to_string(), album_artist.clone());
        }
    }
    if let Some(duration) = np.duration {
        if duration > 0 {
            params.insert("duration".to_string(), duration.to_string());
        }
    }
    if let Some(number) = np.track_number {
        if number > 0 {
            params.insert("trackNumber".to_string(), number.to_string());
        }
    }
    if let Some(mbid) = &np.mbid {
        if !mbid.is_empty() {
            params.insert("mbid".to_string(), mbid.clone());
        }
    }

    params
}

fn batch_params(entries: &[ScrobbleEntry]) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    for (i, entry) in entries.iter().enumerate() {
        params.insert(format!("artist[{}]", i), entry.artist.clone());
        params.insert(format!("track[{}]", i), entry.track.clone());
        params.insert(format!("timestamp[{}]", i), entry.timestamp.to_string());

        if let Some(album) = &entry.album {
            if !album.is_empty() {
                params.insert(format!("album[{}]", i), album.clone());
            }
        }
        if let Some(album_artist) = &entry.album_artist {
            if !album_artist.is_empty() {
                params.insert(format!("albumArtist[{}]", i), album_artist.clone());
            }
        }
        if let Some(duration) = entry.duration {
            if duration > 0 {
                params.insert(format!("duration[{}]", i), duration.to_string());
            }
        }
        if let Some(number) = entry.track_number {
            if number > 0 {
                params.insert(format!("trackNumber[{}]", i), number.to_string());
            }
        }
        if let Some(mbid) = &entry.mbid {
            if !mbid.is_empty() {
                params.insert(format!("mbid[{}]", i), mbid.clone());
            }
        }
    }

    params
}

fn parse_now_playing_response(body: &str) -> Result<NowPlayingConfirmation> {
    let doc: NowPlayingDocument =
        quick_xml::de::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;

    Ok(NowPlayingConfirmation {
        artist: doc.nowplaying.artist.value,
        track: doc.nowplaying.track.value,
        album: doc.nowplaying.album.value,
        ignored_code: doc.nowplaying.ignored.code,
        ignored_message: doc.nowplaying.ignored.message.trim().to_string(),
    })
}

fn parse_scrobble_response(body: &str) -> Result<ScrobbleReceipt> {
    let doc: ScrobblesDocument =
        quick_xml::de::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;

    let tracks = doc
        .scrobbles
        .entries
        .into_iter()
        .map(|node| ScrobbledTrack {
            artist: node.artist.value,
            track: node.track.value,
            timestamp: node.timestamp.trim().parse().unwrap_or(0),
            ignored_code: node.ignored.code,
            ignored_message: node.ignored.message.trim().to_string(),
        })
        .collect();

    Ok(ScrobbleReceipt {
        accepted: doc.scrobbles.accepted,
        ignored: doc.scrobbles.ignored,
        tracks,
    })
}

//! Player sources
//!
//! The daemon only needs one capability from the player: "what is
//! playing right now". [`PlayerSource`] is that seam; the Apple Music
//! adapter below queries the player over AppleScript in a single
//! subprocess call.

use crate::error::{Error, Result};
use async_trait::async_trait;
use scrobd_common::{PlayerState, Track};
use std::time::Duration;
use tokio::process::Command;

/// Capability consumed by the poller: sample the current track.
/// `Ok(None)` means the player is stopped or not running.
#[async_trait]
pub trait PlayerSource: Send + Sync {
    async fn current_track(&self) -> Result<Option<Track>>;
}

/// Apple Music adapter: one osascript invocation per sample.
///
/// The script checks that the Music process exists and reads the
/// current track in the same invocation, so a sample costs exactly one
/// subprocess spawn.
pub struct AppleMusicSource;

const CURRENT_TRACK_SCRIPT: &str = r#"
tell application "System Events"
	if not ((name of processes) contains "Music") then
		return "not_running"
	end if
end tell
tell application "Music"
	if player state is stopped then
		return "stopped"
	else
		set trackName to name of current track
		set trackArtist to artist of current track
		set trackAlbum to album of current track
		set trackDuration to duration of current track
		set playerPos to player position
		set playerState to player state as string

		return trackName & "|||" & trackArtist & "|||" & trackAlbum & "|||" & trackDuration & "|||" & playerPos & "|||" & playerState
	end if
end tell"#;

#[async_trait]
impl PlayerSource for AppleMusicSource {
    async fn current_track(&self) -> Result<Option<Track>> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(CURRENT_TRACK_SCRIPT)
            .output()
            .await
            .map_err(|e| Error::Player(format!("failed to run osascript: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Player(format!(
                "osascript failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result = stdout.trim();

        if result == "not_running" || result == "stopped" {
            return Ok(None);
        }

        parse_track_output(result).map(Some)
    }
}

/// Parse the `|||`-delimited osascript output into a Track.
fn parse_track_output(output: &str) -> Result<Track> {
    let parts: Vec<&str> = output.split("|||").collect();
    if parts.len() != 6 {
        return Err(Error::Player(format!(
            "expected 6 fields, got {}: {:?}",
            parts.len(),
            output
        )));
    }

    let duration_secs: f64 = parts[3]
        .trim()
        .parse()
        .map_err(|e| Error::Player(format!("bad duration {:?}: {}", parts[3], e)))?;
    let position_secs: f64 = parts[4]
        .trim()
        .parse()
        .map_err(|e| Error::Player(format!("bad position {:?}: {}", parts[4], e)))?;

    let state = match parts[5].trim() {
        "playing" => PlayerState::Playing,
        "paused" => PlayerState::Paused,
        "stopped" => PlayerState::Stopped,
        other => return Err(Error::Player(format!("unknown player state: {:?}", other))),
    };

    Ok(Track {
        name: parts[0].trim().to_string(),
        artist: parts[1].trim().to_string(),
        album: parts[2].trim().to_string(),
        duration: Duration::from_secs_f64(duration_secs.max(0.0)),
        position: Duration::from_secs_f64(position_secs.max(0.0)),
        state,
    })
}

//! Rich-presence sink
//!
//! Consumes the engine's event stream and mirrors the currently
//! playing track to a presence transport (Discord by default).
//! Connects lazily on the first playing track; if the transport is
//! unavailable the error is logged and the next update retries.
//! Identical consecutive activities are deduplicated so the transport
//! only sees genuine changes.

mod artwork;
#[cfg(unix)]
mod ipc;

pub use artwork::ArtworkLookup;
#[cfg(unix)]
pub use ipc::DiscordIpc;

use async_trait::async_trait;
use scrobd_common::events::Event;
use scrobd_common::{PlayerState, Track};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Activity payload pushed to the presence transport
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Activity {
    /// 2 = "Listening to ..."
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assets {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub large_image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub large_text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub small_image: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub small_text: String,
}

/// A connected presence channel
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    async fn set_activity(&mut self, activity: &Activity) -> std::io::Result<()>;
    async fn clear_activity(&mut self) -> std::io::Result<()>;
    async fn close(&mut self);
}

/// Factory for lazy (re-)connection to the presence channel
#[async_trait]
pub trait PresenceConnector: Send + Sync {
    async fn connect(&self) -> std::io::Result<Box<dyn PresenceTransport>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastActivity {
    name: String,
    artist: String,
    album: String,
}

/// The sink itself: owns the dedup state, the lazy connection, and the
/// artwork cache.
pub struct Presence {
    connector: Box<dyn PresenceConnector>,
    transport: Option<Box<dyn PresenceTransport>>,
    last: Option<LastActivity>,
    artwork: ArtworkLookup,
    /// Shown as the activity name ("Listening to <player_name>")
    player_name: String,
}

impl Presence {
    pub fn new(connector: Box<dyn PresenceConnector>, player_name: impl Into<String>) -> Self {
        Self {
            connector,
            transport: None,
            last: None,
            artwork: ArtworkLookup::new(),
            player_name: player_name.into(),
        }
    }

    /// Consume events until shutdown. Lagging behind the bus is fine;
    /// presence only ever cares about the newest state.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<Event>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("starting presence sink");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.disconnect().await;
                        info!("presence sink stopped");
                        return;
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(Event::PlayerUpdate(update)) => {
                            if update.error.is_some() {
                                continue;
                            }
                            self.handle_track(update.track.as_ref()).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            debug!(missed, "presence sink lagged behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            self.disconnect().await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_track(&mut self, track: Option<&Track>) {
        let Some(track) = track.filter(|t| t.state == PlayerState::Playing) else {
            if self.last.take().is_some() {
                self.clear().await;
            }
            return;
        };

        let current = LastActivity {
            name: track.name.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
        };
        if self.last.as_ref() == Some(&current) {
            return;
        }

        if self.transport.is_none() {
            match self.connector.connect().await {
                Ok(transport) => self.transport = Some(transport),
                Err(e) => {
                    warn!(error = %e, "presence channel not available");
                    return;
                }
            }
        }

        let activity = self.build_activity(track).await;
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.set_activity(&activity).await {
                warn!(error = %e, "failed to set presence activity");
                // Drop the connection; the next update reconnects.
                self.transport = None;
                return;
            }
        }

        self.last = Some(current);
    }

    async fn build_activity(&self, track: &Track) -> Activity {
        let now = chrono::Utc::now().timestamp();
        let start = now - track.position.as_secs() as i64;
        let end = start + track.duration.as_secs() as i64;

        let large_image = self.artwork.lookup(&track.artist, &track.album).await;

        Activity {
            kind: 2,
            name: self.player_name.clone(),
            details: track.name.clone(),
            state: format!("by {}", track.artist),
            timestamps: Some(Timestamps {
                start: Some(start),
                end: Some(end),
            }),
            assets: Some(Assets {
                large_image,
                large_text: track.album.clone(),
                small_image: "scrobd".to_string(),
                small_text: "scrobd".to_string(),
            }),
        }
    }

    async fn clear(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.clear_activity().await {
                warn!(error = %e, "failed to clear presence activity");
                self.transport = None;
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Set(String),
        Clear,
    }

    struct RecordingTransport {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    #[async_trait]
    impl PresenceTransport for RecordingTransport {
        async fn set_activity(&mut self, activity: &Activity) -> std::io::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Set(activity.details.clone()));
            Ok(())
        }

        async fn clear_activity(&mut self) -> std::io::Result<()> {
            self.calls.lock().unwrap().push(Call::Clear);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct RecordingConnector {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    #[async_trait]
    impl PresenceConnector for RecordingConnector {
        async fn connect(&self) -> std::io::Result<Box<dyn PresenceTransport>> {
            if self.fail {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no socket",
                ));
            }
            Ok(Box::new(RecordingTransport {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn presence(fail: bool) -> (Presence, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let connector = RecordingConnector {
            calls: Arc::clone(&calls),
            fail,
        };
        (
            Presence::new(Box::new(connector), "Apple Music"),
            calls,
        )
    }

    fn playing(name: &str) -> Track {
        Track {
            name: name.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration: Duration::from_secs(180),
            position: Duration::from_secs(30),
            state: PlayerState::Playing,
        }
    }

    #[tokio::test]
    async fn sets_activity_on_playing_track() {
        let (mut presence, calls) = presence(false);
        presence.handle_track(Some(&playing("Song"))).await;
        assert_eq!(calls.lock().unwrap().as_slice(), &[Call::Set("Song".into())]);
    }

    #[tokio::test]
    async fn dedupes_identical_activity() {
        let (mut presence, calls) = presence(false);
        presence.handle_track(Some(&playing("Song"))).await;
        presence.handle_track(Some(&playing("Song"))).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        presence.handle_track(Some(&playing("Other"))).await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clears_on_pause_and_stop() {
        let (mut presence, calls) = presence(false);
        presence.handle_track(Some(&playing("Song"))).await;

        let mut paused = playing("Song");
        paused.state = PlayerState::Paused;
        presence.handle_track(Some(&paused)).await;

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[Call::Set("Song".into()), Call::Clear]
        );

        // Already cleared: a stop changes nothing further.
        presence.handle_track(None).await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn connect_failure_retries_on_next_update() {
        let (mut presence, calls) = presence(true);
        presence.handle_track(Some(&playing("Song"))).await;
        assert!(calls.lock().unwrap().is_empty());
        assert!(presence.last.is_none());
    }

    #[test]
    fn activity_serializes_without_empty_fields() {
        let activity = Activity {
            kind: 2,
            name: "Apple Music".to_string(),
            details: "Song".to_string(),
            state: "by Artist".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], 2);
        assert_eq!(json["details"], "Song");
        assert!(json.get("timestamps").is_none());
        assert!(json.get("assets").is_none());
    }
}

//! Periodic player sampling
//!
//! A single loop over a ticker: sample the [`PlayerSource`], wrap the
//! result in a [`TrackUpdate`], and hand it to the engine over a
//! bounded channel. Delivery is best-effort (`try_send`): if the
//! handler is behind, the sample is dropped and the next tick
//! supersedes it.

use crate::player::PlayerSource;
use scrobd_common::TrackUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Default per-sample deadline for the player query
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Poller {
    player: Arc<dyn PlayerSource>,
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(player: Arc<dyn PlayerSource>, interval: Duration) -> Self {
        Self {
            player,
            interval,
            timeout: POLL_TIMEOUT,
        }
    }

    /// Run until `shutdown` flips true. The first sample happens
    /// immediately, before the first tick.
    pub async fn run(
        &self,
        updates: mpsc::Sender<TrackUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval = ?self.interval, "starting poller");

        let mut ticker = tokio::time::interval(self.interval);
        // First tick fires immediately; that is the synchronous
        // startup sample.
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poller stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.poll(&updates).await;
                }
            }
        }
    }

    async fn poll(&self, updates: &mpsc::Sender<TrackUpdate>) {
        let update = match tokio::time::timeout(self.timeout, self.player.current_track()).await {
            Ok(Ok(track)) => {
                if let Some(track) = &track {
                    debug!(
                        track = %track.name,
                        artist = %track.artist,
                        state = %track.state,
                        "poll update"
                    );
                }
                TrackUpdate::track(track)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "player query failed");
                TrackUpdate::error(e.to_string())
            }
            Err(_) => {
                debug!(timeout = ?self.timeout, "player query timed out");
                TrackUpdate::error("player query timed out")
            }
        };

        // Drop-on-full: the next tick supersedes this sample anyway.
        if updates.try_send(update).is_err() {
            debug!("updates channel full, dropping sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::player::PlayerSource;
    use async_trait::async_trait;
    use scrobd_common::{PlayerState, Track};
    use std::sync::Mutex;

    /// Scripted player: returns queued responses in order, then None.
    struct ScriptedPlayer {
        responses: Mutex<Vec<Result<Option<Track>>>>,
    }

    impl ScriptedPlayer {
        fn new(responses: Vec<Result<Option<Track>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl PlayerSource for ScriptedPlayer {
        async fn current_track(&self) -> Result<Option<Track>> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(None)
            } else {
                responses.remove(0)
            }
        }
    }

    fn playing(name: &str) -> Track {
        Track {
            name: name.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration: Duration::from_secs(180),
            position: Duration::ZERO,
            state: PlayerState::Playing,
        }
    }

    #[tokio::test]
    async fn delivers_initial_sample_immediately() {
        let player = Arc::new(ScriptedPlayer::new(vec![Ok(Some(playing("Song")))]));
        let poller = Poller::new(player, Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { poller.run(tx, stop_rx).await });

        let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no update before timeout")
            .unwrap();
        assert_eq!(update.track.unwrap().name, "Song");

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn converts_player_errors_into_error_updates() {
        let player = Arc::new(ScriptedPlayer::new(vec![Err(Error::Player(
            "osascript failed".to_string(),
        ))]));
        let poller = Poller::new(player, Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { poller.run(tx, stop_rx).await });

        let update = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no update before timeout")
            .unwrap();
        assert!(update.track.is_none());
        assert!(update.error.unwrap().contains("osascript failed"));

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn keeps_ticking_after_samples() {
        let player = Arc::new(ScriptedPlayer::new(vec![
            Ok(Some(playing("One"))),
            Ok(Some(playing("Two"))),
        ]));
        let poller = Poller::new(player, Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { poller.run(tx, stop_rx).await });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.track.unwrap().name, "One");
        assert_eq!(second.track.unwrap().name, "Two");

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

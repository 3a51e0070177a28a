//! The engine: binds poller, accountant, queue, and submitter
//!
//! Four long-lived tasks cooperate over channels and shared state:
//!
//! - the **poller** samples the player onto a bounded channel
//! - the **update handler** applies each sample to the accountant and
//!   fans it out to sinks; a genuine track change also fires an async
//!   now-playing update
//! - the **eligibility ticker** (5 s) turns qualifying plays into
//!   queue entries, exactly once per play
//! - the **queue drainer** pushes pending entries to the remote,
//!   starting with an immediate drain to flush anything left over from
//!   a previous run
//!
//! The first shutdown signal cancels all tasks through a watch
//! channel; the engine then performs one final drain, flushes the
//! accountant, and prunes the queue. A second signal forces exit.

use crate::error::{Error, Result};
use crate::player::PlayerSource;
use crate::poller::Poller;
use crate::queue::{Scrobble, ScrobbleQueue};
use crate::rules::should_scrobble;
use crate::state::PlayTracker;
use crate::submit::Submitter;
use scrobd_common::events::{Event, EventBus};
use scrobd_common::{PlayerState, TrackUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the poller → handler channel; absorbs short bursts.
const UPDATES_CHANNEL_CAPACITY: usize = 10;

/// Cadence of the eligibility check.
const ELIGIBILITY_INTERVAL: Duration = Duration::from_secs(5);

/// Largest batch one drain cycle submits (remote batch limit).
const DRAIN_BATCH_SIZE: u32 = 50;

/// Submitted rows older than this are pruned at shutdown.
const SUBMITTED_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Engine configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// How often to sample the player
    pub poll_interval: Duration,
    /// How often to drain the scrobble queue
    pub process_interval: Duration,
    /// Play-state persistence file (None disables persistence)
    pub state_file: Option<PathBuf>,
    /// Scrobble queue database path
    pub queue_db: PathBuf,
}

/// The scrobbler engine
pub struct Daemon {
    config: DaemonConfig,
    player: Arc<dyn PlayerSource>,
    submitter: Arc<dyn Submitter>,
    tracker: PlayTracker,
    queue: ScrobbleQueue,
    events: EventBus,
    shutdown: watch::Sender<bool>,
}

impl Daemon {
    pub async fn new(
        config: DaemonConfig,
        player: Arc<dyn PlayerSource>,
        submitter: Arc<dyn Submitter>,
    ) -> Result<Self> {
        let tracker = PlayTracker::new(config.state_file.clone())?;
        let queue = ScrobbleQueue::open(&config.queue_db).await?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            player,
            submitter,
            tracker,
            queue,
            events: EventBus::new(64),
            shutdown,
        })
    }

    /// Event stream consumed by sinks (rich presence, UI, tooling).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The durable queue (introspection and tests).
    pub fn queue(&self) -> &ScrobbleQueue {
        &self.queue
    }

    /// The play accountant (introspection and tests).
    pub fn tracker(&self) -> &PlayTracker {
        &self.tracker
    }

    /// Request a graceful shutdown from outside the signal handler.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Watch endpoint that flips true when shutdown is requested.
    /// Sinks use it to stop alongside the engine.
    pub fn shutdown_watch(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until shutdown, then tear down in order: final drain,
    /// accountant flush, queue pruning.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!("starting daemon");

        let (updates_tx, updates_rx) = mpsc::channel(UPDATES_CHANNEL_CAPACITY);
        let mut tasks = Vec::new();

        // Poller
        {
            let daemon = Arc::clone(&self);
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let poller = Poller::new(Arc::clone(&daemon.player), daemon.config.poll_interval);
                poller.run(updates_tx, shutdown).await;
            }));
        }

        // Update handler
        {
            let daemon = Arc::clone(&self);
            let shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                daemon.handle_updates(updates_rx, shutdown).await;
            }));
        }

        // Eligibility ticker
        {
            let daemon = Arc::clone(&self);
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(ELIGIBILITY_INTERVAL);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        _ = ticker.tick() => {
                            if let Err(e) = daemon.check_and_scrobble().await {
                                error!(error = %e, "eligibility check failed");
                            }
                        }
                    }
                }
            }));
        }

        // Queue drainer (first tick fires immediately: startup drain)
        {
            let daemon = Arc::clone(&self);
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(daemon.config.process_interval);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        _ = ticker.tick() => {
                            daemon.drain_cycle().await;
                        }
                    }
                }
            }));
        }

        // Signal handler: not joined, aborted once tasks finish.
        let signals = tokio::spawn(watch_signals(self.shutdown.clone()));

        for task in tasks {
            let _ = task.await;
        }
        signals.abort();

        self.teardown().await;
        info!("daemon stopped");
        Ok(())
    }

    async fn teardown(&self) {
        info!("processing final scrobbles before shutdown");
        self.drain_cycle().await;

        if let Err(e) = self.tracker.flush() {
            warn!(error = %e, "failed to flush play state");
        }

        match self.queue.cleanup(SUBMITTED_RETENTION).await {
            Ok(deleted) if deleted > 0 => debug!(deleted, "pruned submitted scrobbles"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "queue cleanup failed"),
        }

        self.queue.close().await;
    }

    /// Consume poller updates until shutdown, then apply whatever is
    /// already buffered so no observed sample is lost.
    async fn handle_updates(
        &self,
        mut updates: mpsc::Receiver<TrackUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        while let Ok(update) = updates.try_recv() {
                            if let Err(e) = self.handle_update(update).await {
                                error!(error = %e, "failed to handle track update");
                            }
                        }
                        return;
                    }
                }
                update = updates.recv() => {
                    let Some(update) = update else { return };
                    if let Err(e) = self.handle_update(update).await {
                        error!(error = %e, "failed to handle track update");
                    }
                }
            }
        }
    }

    /// Apply one poller observation: fan out to sinks, then drive the
    /// accountant.
    pub async fn handle_update(&self, update: TrackUpdate) -> Result<()> {
        self.events.emit(Event::PlayerUpdate(update.clone()));

        if let Some(message) = &update.error {
            // Sinks already saw the disconnected state; accounting is
            // untouched.
            debug!(error = %message, "track update error");
            return Ok(());
        }

        let current = self.tracker.snapshot();

        let track = match update.track {
            Some(track) if track.state != PlayerState::Stopped => track,
            _ => {
                if current.track.is_some() {
                    info!("music stopped");
                    self.tracker.reset()?;
                }
                return Ok(());
            }
        };

        let track_changed = match &current.track {
            Some(current_track) => !current_track.same_play(&track),
            None => true,
        };

        if track_changed {
            info!(track = %track.name, artist = %track.artist, "track changed");
            self.tracker.set_track(track.clone())?;
            self.events.emit(Event::TrackStarted {
                track: track.clone(),
                timestamp: chrono::Utc::now(),
            });

            // Advisory; never blocks state progression.
            let submitter = Arc::clone(&self.submitter);
            tokio::spawn(async move {
                if let Err(e) = submitter.now_playing(&track).await {
                    warn!(error = %e, "failed to update now playing");
                }
            });

            return Ok(());
        }

        self.tracker.update_position(track)?;
        Ok(())
    }

    /// Enqueue the current play if it crossed its threshold. Runs on
    /// the eligibility cadence; a play that already fired is a no-op.
    pub async fn check_and_scrobble(&self) -> Result<()> {
        let state = self.tracker.snapshot();

        let Some(track) = &state.track else {
            return Ok(());
        };
        if state.scrobbled {
            return Ok(());
        }

        let played = self.tracker.played_duration();
        if !should_scrobble(track.duration, played) {
            return Ok(());
        }

        info!(
            track = %track.name,
            artist = %track.artist,
            played = ?played,
            "scrobbling track"
        );

        let scrobble = Scrobble {
            track: track.name.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            duration: track.duration,
            // The remote records when the play *started*, not when it
            // crossed the threshold.
            timestamp: state.play_started,
        };
        self.queue.add(&scrobble).await?;
        self.tracker.mark_scrobbled()?;

        self.events.emit(Event::ScrobbleQueued {
            artist: scrobble.artist,
            track: scrobble.track,
            timestamp: scrobble.timestamp,
        });

        Ok(())
    }

    /// One drain cycle plus aged-out-failure pruning. Errors are
    /// logged, never propagated: the next cycle retries.
    async fn drain_cycle(&self) {
        if let Err(e) = self.drain_queue().await {
            error!(error = %e, "queue drain failed");
        }

        match self.queue.cleanup_old_failed().await {
            Ok(deleted) if deleted > 0 => {
                warn!(deleted, "dropped scrobbles past the 14-day acceptance window");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to clean up aged-out scrobbles"),
        }
    }

    /// Submit up to one batch of pending scrobbles.
    pub async fn drain_queue(&self) -> Result<()> {
        let pending = self.queue.pending(DRAIN_BATCH_SIZE).await?;
        if pending.is_empty() {
            return Ok(());
        }

        info!(count = pending.len(), "processing pending scrobbles");

        match self.submitter.submit(&pending).await {
            Ok(()) => {
                let ids: Vec<i64> = pending.iter().map(|s| s.id).collect();
                self.queue.mark_submitted_batch(&ids).await?;
                info!(count = pending.len(), "scrobbled successfully");
                self.events.emit(Event::ScrobblesSubmitted {
                    count: pending.len(),
                });
            }
            Err(e) => {
                match &e {
                    Error::LastFm(lfm) if lfm.is_auth_failure() => {
                        // Keep running: plays keep queueing so nothing
                        // is lost while the user re-authenticates.
                        error!(error = %lfm, "last.fm session rejected; run `scrobd auth`");
                    }
                    _ => warn!(count = pending.len(), error = %e, "failed to scrobble"),
                }

                let message = e.to_string();
                for scrobble in &pending {
                    if let Err(mark_err) = self.queue.mark_error(scrobble.id, &message).await {
                        error!(id = scrobble.id, error = %mark_err, "failed to record scrobble error");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Wait for SIGINT/SIGTERM and request shutdown; a second signal
/// forces exit.
#[cfg(unix)]
async fn watch_signals(shutdown: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
        error!("failed to install SIGTERM handler");
        return;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received, initiating graceful shutdown");
    let _ = shutdown.send(true);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    warn!("second shutdown signal received, forcing exit");
    std::process::exit(1);
}

#[cfg(not(unix))]
async fn watch_signals(shutdown: watch::Sender<bool>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received, initiating graceful shutdown");
        let _ = shutdown.send(true);
    }
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("second shutdown signal received, forcing exit");
        std::process::exit(1);
    }
}

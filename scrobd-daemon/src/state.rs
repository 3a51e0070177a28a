//! Play accounting state
//!
//! Converts the poller's noisy track samples into per-play accounting:
//! when a play started, how much of it has actually been heard across
//! pause/resume cycles, and whether it already produced a queue entry.
//!
//! State is persisted as a small JSON file so a daemon restart resumes
//! accounting mid-play. Track changes and scrobble flips persist
//! immediately; pure position updates are coalesced to at most one
//! write per second, with a guaranteed flush at shutdown. Writes go
//! through a temp file and rename, so a crash never leaves a torn
//! file.

use crate::error::Result;
use chrono::{DateTime, Utc};
use scrobd_common::{PlayerState, Track};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Accounting record for the current play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayState {
    /// Currently observed track (None when stopped)
    pub track: Option<Track>,
    /// When the current unpaused segment began
    pub start_time: DateTime<Utc>,
    /// When the play first entered Playing. Never moves for the
    /// lifetime of the play; this is the scrobble timestamp.
    pub play_started: DateTime<Utc>,
    /// Whether this play already produced its queue entry
    pub scrobbled: bool,
    /// Set while paused; cleared on resume
    pub paused_at: Option<DateTime<Utc>>,
    /// Play time accumulated across completed segments
    pub total_play_time: Duration,
}

impl Default for PlayState {
    fn default() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            track: None,
            start_time: epoch,
            play_started: epoch,
            scrobbled: false,
            paused_at: None,
            total_play_time: Duration::ZERO,
        }
    }
}

/// Effective play time of `state` as observed at `now`.
///
/// Paused plays are frozen at the pause instant; playing plays include
/// the in-flight segment.
pub fn played_duration_at(state: &PlayState, now: DateTime<Utc>) -> Duration {
    if let Some(paused_at) = state.paused_at {
        let segment = (paused_at - state.start_time).to_std().unwrap_or_default();
        return state.total_play_time + segment;
    }

    if let Some(track) = &state.track {
        if track.state == PlayerState::Playing {
            let segment = (now - state.start_time).to_std().unwrap_or_default();
            return state.total_play_time + segment;
        }
    }

    state.total_play_time
}

struct Inner {
    state: PlayState,
    dirty: bool,
    last_persist: Instant,
}

/// Thread-safe play accountant with throttled persistence
///
/// Mutated by the state-handler task, read by the eligibility task.
/// The mutex is held only for in-memory bookkeeping and the (rare,
/// small) file write; nothing awaits while holding it.
pub struct PlayTracker {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    persist_interval: Duration,
}

impl PlayTracker {
    /// Create a tracker, restoring prior state from `path` when the
    /// file exists. A corrupt state file is discarded with a warning:
    /// the daemon starts fresh rather than refusing to run.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        Self::with_persist_interval(path, Duration::from_secs(1))
    }

    fn with_persist_interval(path: Option<PathBuf>, persist_interval: Duration) -> Result<Self> {
        let state = match &path {
            Some(p) => match std::fs::read(p) {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "discarding corrupt state file");
                        PlayState::default()
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => PlayState::default(),
                Err(e) => return Err(e.into()),
            },
            None => PlayState::default(),
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                dirty: false,
                last_persist: Instant::now(),
            }),
            path,
            persist_interval,
        })
    }

    /// Begin accounting a new play of `track`.
    pub fn set_track(&self, track: Track) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        inner.state = PlayState {
            track: Some(track),
            start_time: now,
            play_started: now,
            scrobbled: false,
            paused_at: None,
            total_play_time: Duration::ZERO,
        };
        self.persist(&mut inner)
    }

    /// Apply one poller observation of the current track.
    ///
    /// Handles every transition: first observation, track change,
    /// pause, resume, stop. Same-track playing samples only refresh
    /// the stored position and are persisted lazily.
    pub fn update_position(&self, track: Track) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        let same_play = match &inner.state.track {
            Some(current) => current.same_play(&track),
            None => false,
        };

        if !same_play {
            // New play, or the previous one was discarded: either way
            // accounting starts over. A play that never crossed its
            // threshold before the switch is gone for good.
            let now = Utc::now();
            inner.state = PlayState {
                track: Some(track),
                start_time: now,
                play_started: now,
                scrobbled: false,
                paused_at: None,
                total_play_time: Duration::ZERO,
            };
            return self.persist(&mut inner);
        }

        match track.state {
            PlayerState::Playing => {
                if let Some(paused_at) = inner.state.paused_at {
                    // Resume: bank the segment that ended at the pause.
                    let segment = (paused_at - inner.state.start_time)
                        .to_std()
                        .unwrap_or_default();
                    inner.state.total_play_time += segment;
                    inner.state.start_time = Utc::now();
                    inner.state.paused_at = None;
                    inner.state.track = Some(track);
                    self.persist(&mut inner)
                } else {
                    inner.state.track = Some(track);
                    self.throttled_persist(&mut inner)
                }
            }
            PlayerState::Paused => {
                if inner.state.paused_at.is_none() {
                    inner.state.paused_at = Some(Utc::now());
                    inner.state.track = Some(track);
                    self.persist(&mut inner)
                } else {
                    inner.state.track = Some(track);
                    self.throttled_persist(&mut inner)
                }
            }
            PlayerState::Stopped => {
                inner.state = PlayState::default();
                self.persist(&mut inner)
            }
        }
    }

    /// Record that the current play produced its queue entry.
    pub fn mark_scrobbled(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state.scrobbled = true;
        self.persist(&mut inner)
    }

    /// Clear all accounting (player stopped or disappeared).
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = PlayState::default();
        self.persist(&mut inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PlayState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Effective play time of the current play as of now.
    pub fn played_duration(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        played_duration_at(&inner.state, Utc::now())
    }

    /// Write any coalesced state to disk. Called at shutdown.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.dirty {
            self.persist(&mut inner)?;
        }
        Ok(())
    }

    /// Unconditional write; clears the dirty flag.
    fn persist(&self, inner: &mut Inner) -> Result<()> {
        let Some(path) = &self.path else {
            inner.dirty = false;
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(&inner.state)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, path)?;

        inner.dirty = false;
        inner.last_persist = Instant::now();
        Ok(())
    }

    /// Write only when the persist interval has elapsed; otherwise
    /// remember that state is ahead of disk.
    fn throttled_persist(&self, inner: &mut Inner) -> Result<()> {
        if inner.last_persist.elapsed() >= self.persist_interval {
            self.persist(inner)
        } else {
            inner.dirty = true;
            Ok(())
        }
    }
}

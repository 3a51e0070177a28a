//! Configuration loading and data directory resolution
//!
//! Resolution priority for the config file path:
//! 1. Explicit path (command-line argument, highest priority)
//! 2. `SCROBD_CONFIG` environment variable
//! 3. `~/.config/scrobd/config.toml`
//!
//! Last.fm credentials may additionally be overridden through
//! `SCROBD_LASTFM_API_KEY`, `SCROBD_LASTFM_API_SECRET`, and
//! `SCROBD_LASTFM_SESSION_KEY`, which take precedence over the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between player polls (1..=60)
    pub poll_interval: u64,
    /// Seconds between queue drain cycles
    pub process_interval: u64,
    pub lastfm: LastFmConfig,
    pub logging: LoggingConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: debug, info, warn, error
    pub level: String,
    /// Log file path; empty logs to stderr
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Publish the current track as Discord rich presence
    pub enabled: bool,
    /// Discord application id used for the presence connection
    pub app_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: 3,
            process_interval: 30,
            lastfm: LastFmConfig::default(),
            logging: LoggingConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: String::new(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
        }
    }
}

impl Config {
    /// Load configuration following the resolution priority order.
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit_path);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Write the configuration back to its resolved location.
    /// Used by the auth flow to persist a freshly minted session key.
    pub fn save(&self, explicit_path: Option<&Path>) -> Result<()> {
        let path = resolve_config_path(explicit_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SCROBD_LASTFM_API_KEY") {
            self.lastfm.api_key = key;
        }
        if let Ok(secret) = std::env::var("SCROBD_LASTFM_API_SECRET") {
            self.lastfm.api_secret = secret;
        }
        if let Ok(session) = std::env::var("SCROBD_LASTFM_SESSION_KEY") {
            self.lastfm.session_key = session;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval < 1 || self.poll_interval > 60 {
            return Err(Error::Config(format!(
                "poll_interval must be within 1..=60 seconds (got {})",
                self.poll_interval
            )));
        }
        if self.process_interval < 1 {
            return Err(Error::Config(
                "process_interval must be at least 1 second".to_string(),
            ));
        }

        const LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
        if !self.logging.level.is_empty() && !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::Config(format!(
                "invalid log level {:?} (must be one of: debug, info, warn, error)",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// The daemon can only submit scrobbles with full credentials.
    pub fn validate_lastfm(&self) -> Result<()> {
        if self.lastfm.api_key.is_empty() || self.lastfm.api_secret.is_empty() {
            return Err(Error::Config(
                "last.fm API key and secret are required; run `scrobd auth`".to_string(),
            ));
        }
        if self.lastfm.session_key.is_empty() {
            return Err(Error::Config(
                "no last.fm session key; run `scrobd auth` to authorize".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SCROBD_CONFIG") {
        return PathBuf::from(path);
    }
    config_dir().join("config.toml")
}

/// Per-user configuration directory (`~/.config/scrobd` or platform
/// equivalent)
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("scrobd"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user data directory holding the queue database and play state
/// (`~/.local/share/scrobd` or platform equivalent)
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("scrobd"))
        .unwrap_or_else(|| PathBuf::from("."))
}

//! # Last.fm API 2.0 client (scrobd-lastfm)
//!
//! Implements the subset of the Last.fm web service the daemon needs:
//! the two-step token authentication flow, advisory now-playing
//! updates, and scrobble submission in batches of up to 50.
//!
//! Every request is signed (MD5 over the alphabetically ordered
//! parameters plus the shared secret) and POSTed form-encoded.
//! Transient failures are retried with exponential backoff; the error
//! taxonomy ([`Error`]) tells callers which failures are worth
//! retrying at their own cadence.
//!
//! ```no_run
//! use scrobd_lastfm::{Client, ClientConfig};
//!
//! # async fn example() -> Result<(), scrobd_lastfm::Error> {
//! let client = Client::new(ClientConfig {
//!     api_key: "key".into(),
//!     api_secret: "secret".into(),
//!     ..Default::default()
//! })?;
//!
//! let token = client.auth_get_token().await?;
//! println!("authorize at: {}", client.auth_url(&token.token));
//! # Ok(())
//! # }
//! ```

mod auth;
mod error;
mod scrobble;
mod signature;
mod transport;
mod types;

pub use error::{Error, Result};
pub use types::{
    NowPlaying, NowPlayingConfirmation, ScrobbleEntry, ScrobbleReceipt, ScrobbledTrack, Session,
    Token,
};

use std::time::Duration;

/// Default Last.fm API endpoint
pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Page where the user authorizes an auth token
const AUTH_PAGE_URL: &str = "https://www.last.fm/api/auth/";

const USER_AGENT: &str = concat!("scrobd/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client construction parameters
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Last.fm API key (required)
    pub api_key: String,
    /// Last.fm shared secret (required)
    pub api_secret: String,
    /// Session key for authenticated operations
    pub session_key: Option<String>,
    /// Override the API endpoint (used by tests)
    pub base_url: Option<String>,
    /// Per-request timeout (default 30 s)
    pub timeout: Option<Duration>,
}

/// Last.fm API client
///
/// Credentials are immutable after construction apart from the session
/// key, which the auth flow fills in once the user has authorized the
/// application.
pub struct Client {
    api_key: String,
    api_secret: String,
    session_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("api_key is required".to_string()));
        }
        if config.api_secret.is_empty() {
            return Err(Error::Config("api_secret is required".to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key,
            api_secret: config.api_secret,
            session_key: config.session_key.filter(|k| !k.is_empty()),
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http,
        })
    }

    /// Install the session key obtained from the auth flow
    pub fn set_session_key(&mut self, key: impl Into<String>) {
        self.session_key = Some(key.into());
    }

    /// Whether authenticated operations (now-playing, scrobble) are usable
    pub fn has_session(&self) -> bool {
        self.session_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_credentials() {
        assert!(Client::new(ClientConfig::default()).is_err());
        assert!(Client::new(ClientConfig {
            api_key: "key".into(),
            ..Default::default()
        })
        .is_err());
        assert!(Client::new(ClientConfig {
            api_key: "key".into(),
            api_secret: "secret".into(),
            ..Default::default()
        })
        .is_ok());
    }

    #[test]
    fn empty_session_key_counts_as_absent() {
        let client = Client::new(ClientConfig {
            api_key: "key".into(),
            api_secret: "secret".into(),
            session_key: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert!(!client.has_session());
    }

    #[test]
    fn set_session_key_enables_authenticated_ops() {
        let mut client = Client::new(ClientConfig {
            api_key: "key".into(),
            api_secret: "secret".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(!client.has_session());
        client.set_session_key("d580d57f32848f5dcf574d1ce18d78b2");
        assert!(client.has_session());
    }
}

//! Error taxonomy for Last.fm API operations
//!
//! The variants mirror how callers must react, not the wire shape:
//! transient and rate-limit failures are retryable, auth failures need
//! the user, bad requests need a code change (or a config fix), and
//! everything else is terminal for the attempt.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Client misconfiguration (missing credentials, bad base URL)
    #[error("lastfm: configuration error: {0}")]
    Config(String),

    /// Connection failures, timeouts, and other transport-level errors
    #[error("lastfm: network error: {0}")]
    Network(String),

    /// HTTP 5xx from the API frontend
    #[error("lastfm: server error: HTTP {0}")]
    Server(u16),

    /// Service offline / temporarily unavailable (codes 11, 16)
    #[error("lastfm: service unavailable ({code}): {message}")]
    Transient { code: u32, message: String },

    /// Rate limit exceeded (code 29)
    #[error("lastfm: rate limited: {message}")]
    RateLimited { message: String },

    /// Credentials or session rejected (codes 4, 9, 10, 14, 15).
    /// Not retryable; the user must (re-)authenticate.
    #[error("lastfm: authentication failed ({code}): {message}")]
    AuthInvalid { code: u32, message: String },

    /// Malformed request (codes 2, 3, 5, 6, 7, 13)
    #[error("lastfm: bad request ({code}): {message}")]
    BadRequest { code: u32, message: String },

    /// Any other documented API failure (e.g. code 8, operation failed)
    #[error("lastfm: API error ({code}): {message}")]
    Api { code: u32, message: String },

    /// Operation requires a session key but none is set
    #[error("lastfm: session key required")]
    NoSession,

    /// Response body did not parse as the expected XML document
    #[error("lastfm: failed to parse response: {0}")]
    Parse(String),
}

impl Error {
    /// Build the right variant for a `status="failed"` response.
    pub(crate) fn from_api_code(code: u32, message: String) -> Self {
        match code {
            11 | 16 => Error::Transient { code, message },
            29 => Error::RateLimited { message },
            4 | 9 | 10 | 14 | 15 => Error::AuthInvalid { code, message },
            2 | 3 | 5 | 6 | 7 | 13 => Error::BadRequest { code, message },
            _ => Error::Api { code, message },
        }
    }

    /// Whether the transport retry loop should attempt again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Server(_) | Error::Transient { .. } | Error::RateLimited { .. }
        )
    }

    /// Whether the failure means the user must re-authenticate.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::AuthInvalid { .. } | Error::NoSession)
    }

    /// Code 14: the token exists but the user has not approved it yet.
    /// The interactive auth flow polls on this.
    pub fn is_unauthorized_token(&self) -> bool {
        matches!(self, Error::AuthInvalid { code: 14, .. })
    }
}

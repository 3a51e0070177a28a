//! Error types for the scrobd daemon

use thiserror::Error;

/// Convenience Result type using the daemon Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the daemon crate
#[derive(Error, Debug)]
pub enum Error {
    /// Queue database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Play state persistence errors
    #[error("State error: {0}")]
    State(String),

    /// Player adapter errors (subprocess failures, parse failures)
    #[error("Player error: {0}")]
    Player(String),

    /// Last.fm client errors
    #[error(transparent)]
    LastFm(#[from] scrobd_lastfm::Error),

    /// Shared foundation errors (config, IO wrappers)
    #[error(transparent)]
    Common(#[from] scrobd_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State file serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

//! Common error types for scrobd

use thiserror::Error;

/// Common result type for scrobd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared across the scrobd crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

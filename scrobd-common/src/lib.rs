//! # scrobd shared foundation (scrobd-common)
//!
//! Types shared between the daemon and its tooling: the track model
//! observed from the player, the event bus that fans updates out to
//! sinks, configuration loading, and the common error type.

pub mod config;
pub mod error;
pub mod events;
pub mod track;

pub use error::{Error, Result};
pub use track::{PlayerState, Track, TrackUpdate};

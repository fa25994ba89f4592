//! Error types for the relay engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the moderation and archival engine.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Nostr SDK error.
    #[error("Nostr SDK error: {0}")]
    NostrSdk(#[from] nostr_sdk::client::Error),

    /// Shared core error (identifier parsing, metrics server).
    #[error(transparent)]
    Core(#[from] chronicle_core::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Root registry error.
    #[error("Registry error: {0}")]
    Registry(String),

    /// Trust network could not be rebuilt.
    #[error("Trust network error: {0}")]
    Trust(String),

    /// Host storage hook error.
    #[error("Store error: {0}")]
    Store(String),

    /// Publishing to a remote relay failed.
    #[error("Publish to {url} failed: {reason}")]
    Publish {
        /// Destination relay.
        url: String,
        /// Why the relay did not take the event.
        reason: String,
    },

    /// A remote operation did not finish in time.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

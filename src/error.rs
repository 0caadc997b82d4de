//! Error Taxonomy
//!
//! Fatal-at-construction configuration problems, fatal auth rejections,
//! transient network failures (retried internally), recoverable protocol
//! errors (recorded and logged, never surfaced), and terminal reconnect
//! exhaustion all have distinct types; [`ClientError`] is the composed
//! surface the public API returns.

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::replay::ReplayError;

/// Top-level error returned by [`crate::Client`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid configuration; raised at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Connection lifecycle failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Replay failure.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// `start()` called more than once.
    #[error("client already started")]
    AlreadyStarted,
}

//! Error types for the realtime client.

use thiserror::Error;

/// Result alias used throughout the livegate crates.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Failure classes surfaced by the realtime subsystem.
///
/// The taxonomy matters more than the payloads: authorization failures are
/// fatal to the owning component and feed the shared session signal, while
/// transport failures are absorbed by the next heartbeat tick or a backoff
/// reconnect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// The server no longer accepts the session credentials.
    #[error("session unauthorized")]
    Unauthorized,

    /// Network-level failure: connect error, timeout, dropped body, 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered but the payload made no sense.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The component was torn down and no longer accepts work.
    #[error("client closed: {0}")]
    Closed(String),
}

impl LiveError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    /// Whether this failure means the session itself is dead.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

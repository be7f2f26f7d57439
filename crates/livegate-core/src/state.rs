//! State vocabulary for the two realtime components.
//!
//! Each state value is owned by exactly one task and published through a watch
//! channel; observers read, never write.

/// Reason a stream connection was closed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The server rejected the session; re-login is required.
    Unauthorized,
    /// The client itself was shut down.
    Shutdown,
}

/// Lifecycle of the notification stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Stream open and delivering events.
    Open,
    /// Connection lost while still authenticated; a retry is scheduled.
    /// `attempt` counts consecutive failures since the stream was last open.
    Reconnecting { attempt: u32 },
    /// Terminally closed; only a fresh connect revives the client.
    Closed { reason: CloseReason },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether a connection attempt is running or scheduled. Connect requests
    /// are no-ops in any live state.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Reconnecting { .. })
    }
}

/// Lifecycle of the presence heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Not started; no timer.
    Idle,
    /// Heartbeat timer running.
    Active,
    /// Tab hidden; timer paused, session still considered alive.
    Suspended,
    /// A heartbeat was rejected; terminal until the next start after re-login.
    Unauthenticated,
}

impl PresenceState {
    /// Whether the session still looks authenticated from this state. Drives
    /// the decision to send the best-effort offline signal on stop.
    pub fn is_session_alive(&self) -> bool {
        matches!(self, Self::Active | Self::Suspended)
    }
}

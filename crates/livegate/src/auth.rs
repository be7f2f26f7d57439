//! Shared session authentication signal.
//!
//! Thin adapter over the application's session layer: a boolean authenticated
//! flag observable through a watch channel, plus lifecycle events for code
//! that cares about edges. The realtime components treat the flag as ground
//! truth and feed back into it in exactly one case: a server-side session
//! rejection reported through [`SessionGate::expire`].

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Session lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session became authenticated.
    LoggedIn,
    /// The session ended by explicit logout.
    LoggedOut,
    /// The server rejected the session credentials. Emitted at most once per
    /// authenticated session, however many requests fail concurrently.
    Expired,
}

/// Cloneable handle to the authentication signal.
#[derive(Debug, Clone)]
pub struct SessionGate {
    authenticated: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionGate {
    /// Create a gate in the unauthenticated state.
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// Create a gate with a known initial state.
    pub fn with_state(authenticated: bool) -> Self {
        let (tx, _) = watch::channel(authenticated);
        let (events, _) = broadcast::channel(16);
        Self {
            authenticated: tx,
            events,
        }
    }

    /// Current authentication state.
    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Observe authentication transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// Observe session lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Mark the session authenticated (login completed).
    pub fn login(&self) {
        if self.transition(true) {
            info!("session authenticated");
            let _ = self.events.send(SessionEvent::LoggedIn);
        }
    }

    /// Mark the session unauthenticated (explicit logout).
    pub fn logout(&self) {
        if self.transition(false) {
            info!("session logged out");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    /// Record a server-side session rejection.
    ///
    /// Only the actual authenticated-to-unauthenticated transition emits
    /// [`SessionEvent::Expired`]; repeated rejections from requests already in
    /// flight collapse into that single signal.
    pub fn expire(&self) {
        if self.transition(false) {
            warn!("session expired by server");
            let _ = self.events.send(SessionEvent::Expired);
        }
    }

    /// Flip the watch value; true when the value actually changed.
    fn transition(&self, value: bool) -> bool {
        self.authenticated.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl Default for SessionGate {
    fn default() -> Self {
        Self::new()
    }
}

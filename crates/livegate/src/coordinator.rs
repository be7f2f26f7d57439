//! Authentication-driven coordinator.
//!
//! The one place allowed to drive the presence manager and the stream client,
//! keyed purely off the shared authentication signal: a login edge brings the
//! stream up before the first heartbeat, a logout edge closes the stream
//! before presence stops, and teardown runs both stop paths no matter what
//! the signal says. Everything else (expiry detection, reconnection) lives in
//! the components themselves.

use crate::api::LiveApi;
use crate::auth::SessionGate;
use crate::config::LiveConfig;
use crate::presence::PresenceManager;
use crate::stream::NotificationClient;
use livegate_core::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns both realtime components and the watcher task that reacts to
/// authentication edges.
pub struct SessionCoordinator {
    gate: SessionGate,
    presence: PresenceManager,
    notifications: NotificationClient,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    /// Build both components and start watching the authentication signal.
    ///
    /// A session already authenticated at spawn time is treated as a login
    /// edge, so embedding this after a restored session works the same as
    /// watching a fresh login.
    pub fn spawn(gate: SessionGate, api: Arc<dyn LiveApi>, config: LiveConfig) -> Self {
        let presence = PresenceManager::spawn(api.clone(), gate.clone(), &config);
        let notifications = NotificationClient::spawn(api, gate.clone(), &config);
        let cancel = CancellationToken::new();

        let watcher = AuthWatcher {
            auth: gate.subscribe(),
            presence: presence.clone(),
            notifications: notifications.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(watcher.run());

        Self {
            gate,
            presence,
            notifications,
            cancel,
        }
    }

    /// The authentication signal this coordinator watches.
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// The presence heartbeat component.
    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    /// The notification stream component.
    pub fn notifications(&self) -> &NotificationClient {
        &self.notifications
    }

    /// Forward a tab visibility change to the presence manager.
    pub async fn set_visibility(&self, hidden: bool) -> Result<()> {
        self.presence.set_visibility(hidden).await
    }

    /// Tear everything down, regardless of the current authentication state.
    /// Stream first, then presence, same order as a logout edge.
    pub async fn shutdown(&self) {
        info!("realtime coordinator shutting down");
        self.cancel.cancel();
        if let Err(e) = self.notifications.shutdown().await {
            debug!(error = %e, "stream client already gone");
        }
        if let Err(e) = self.presence.shutdown().await {
            debug!(error = %e, "presence manager already gone");
        }
    }
}

struct AuthWatcher {
    auth: watch::Receiver<bool>,
    presence: PresenceManager,
    notifications: NotificationClient,
    cancel: CancellationToken,
}

impl AuthWatcher {
    async fn run(mut self) {
        let mut authenticated = false;
        loop {
            let current = *self.auth.borrow_and_update();
            if current != authenticated {
                authenticated = current;
                if current {
                    self.on_login().await;
                } else {
                    self.on_logout().await;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = self.auth.changed() => {
                    if changed.is_err() {
                        // Gate dropped; treat like a logout and stop watching.
                        if authenticated {
                            self.on_logout().await;
                        }
                        break;
                    }
                }
            }
        }
        debug!("auth watcher stopped");
    }

    /// Login edge: connect the stream, then start heartbeating.
    async fn on_login(&self) {
        info!("session authenticated; bringing realtime up");
        if let Err(e) = self.notifications.connect().await {
            warn!(error = %e, "stream connect failed");
        }
        if let Err(e) = self.presence.start().await {
            warn!(error = %e, "presence start failed");
        }
    }

    /// Logout edge: close the stream, then stop heartbeating. Both calls are
    /// safe whatever state their component is in, which matters when this
    /// edge was triggered by an expiry the components already reacted to.
    async fn on_logout(&self) {
        info!("session ended; tearing realtime down");
        if let Err(e) = self.notifications.disconnect().await {
            warn!(error = %e, "stream disconnect failed");
        }
        if let Err(e) = self.presence.stop().await {
            warn!(error = %e, "presence stop failed");
        }
    }
}

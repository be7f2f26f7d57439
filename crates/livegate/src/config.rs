//! Client configuration.

use crate::backoff::ReconnectPolicy;
use std::time::Duration;

/// Default heartbeat cadence. Two missed beats still fit inside the server's
/// five-minute presence TTL, so a single dropped request never flips the user
/// offline.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// Tunables for the realtime client.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Interval between presence heartbeats while the tab is visible.
    pub heartbeat_interval: Duration,
    /// Delay schedule for stream reconnection.
    pub reconnect: ReconnectPolicy,
    /// Capacity of the broadcast channel carrying feed events.
    pub event_capacity: usize,
    /// Capacity of the per-component command channels.
    pub command_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            event_capacity: 64,
            command_capacity: 32,
        }
    }
}

impl LiveConfig {
    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

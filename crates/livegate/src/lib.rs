//! livegate: realtime presence and notification client for the livegate
//! ticketing backend.
//!
//! Two long-lived components, coordinated by a shared authentication signal:
//!
//! - [`PresenceManager`] - periodic "this client is online" heartbeat with
//!   tab-visibility suspension and session-loss detection
//! - [`NotificationClient`] - authenticated push stream feeding a local
//!   notification list, with optimistic mark-read/delete and bounded-backoff
//!   reconnection
//! - [`SessionCoordinator`] - drives both off [`SessionGate`] login/logout
//!   edges and owns unconditional teardown
//!
//! The backend seam is the [`LiveApi`] trait; [`HttpLiveApi`] is the
//! reqwest/SSE implementation riding the ambient cookie session. Tests
//! substitute scripted implementations.
//!
//! ## Example
//!
//! ```no_run
//! use livegate::{HttpLiveApi, LiveConfig, SessionCoordinator, SessionGate};
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn run() -> livegate::Result<()> {
//! let gate = SessionGate::new();
//! let api = HttpLiveApi::new(Url::parse("https://api.example.com/api/").unwrap())?;
//! let realtime = SessionCoordinator::spawn(gate.clone(), Arc::new(api), LiveConfig::default());
//!
//! // After the login flow completes:
//! gate.login();
//!
//! let mut notifications = realtime.notifications().notifications();
//! notifications.changed().await.ok();
//! println!("unread: {}", notifications.borrow().unread_count());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod backoff;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod presence;
pub mod sse;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{EventStream, LiveApi};
pub use auth::{SessionEvent, SessionGate};
pub use backoff::ReconnectPolicy;
pub use config::{DEFAULT_HEARTBEAT_INTERVAL, LiveConfig};
pub use coordinator::SessionCoordinator;
pub use http::HttpLiveApi;
pub use presence::PresenceManager;
pub use sse::{SseEvent, SseParser};
pub use stream::{FeedEvent, NotificationClient};

pub use livegate_core::{
    CloseReason, ConnectionState, Ingest, LiveError, Notification, NotificationSnapshot,
    NotificationStore, PresenceState, Result,
};

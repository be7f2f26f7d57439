//! livegate-core: domain types for the livegate realtime client.
//!
//! This crate holds the runtime-free pieces of the realtime subsystem: the
//! notification model, the local list state, and the state vocabulary shared
//! between the presence and stream components.
//!
//! ## Core Types
//!
//! - [`Notification`] - A single push-delivered notification
//! - [`NotificationStore`] - Ordered, de-duplicated local list with optimistic
//!   mutation and rollback
//! - [`NotificationSnapshot`] - Immutable list view published to observers
//!
//! ## State
//!
//! - [`ConnectionState`] - Notification stream lifecycle
//! - [`PresenceState`] - Presence heartbeat lifecycle
//!
//! ## Errors
//!
//! - [`LiveError`] - Failure taxonomy shared by the client crates

pub mod error;
pub mod notification;
pub mod state;
pub mod store;

pub use error::{LiveError, Result};
pub use notification::Notification;
pub use state::{CloseReason, ConnectionState, PresenceState};
pub use store::{Ingest, NotificationSnapshot, NotificationStore};

//! Backend seam for the realtime components.

use async_trait::async_trait;
use futures::stream::BoxStream;
use livegate_core::{Notification, Result};

/// Stream of push-delivered notifications for one open connection.
///
/// Yields until the connection drops. A transport failure surfaces as one
/// `Err` item, after which the stream is finished either way; the caller's
/// reconnect loop takes it from there.
pub type EventStream = BoxStream<'static, Result<Notification>>;

/// Operations the realtime subsystem needs from the backend.
///
/// Authentication is ambient: every call rides on the session transport
/// established at login (cookies on the HTTP implementation), so no credential
/// appears in any signature. Implementations map an authorization rejection to
/// [`livegate_core::LiveError::Unauthorized`].
#[async_trait]
pub trait LiveApi: Send + Sync {
    /// Report "this client is online". Idempotent on the server side; a lost
    /// beat is repaired by the next one.
    async fn heartbeat(&self) -> Result<()>;

    /// Best-effort "going offline" signal so the server can drop the presence
    /// entry before its TTL expires.
    async fn go_offline(&self) -> Result<()>;

    /// Open the server-push notification stream.
    async fn open_stream(&self) -> Result<EventStream>;

    /// Fetch the current notification list (connect/reconnect snapshot).
    async fn fetch_notifications(&self) -> Result<Vec<Notification>>;

    /// Confirm a notification as read.
    async fn mark_read(&self, id: u64) -> Result<()>;

    /// Delete a notification.
    async fn delete(&self, id: u64) -> Result<()>;
}

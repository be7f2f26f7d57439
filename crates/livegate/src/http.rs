//! HTTP transport for the livegate backend.
//!
//! Implements [`LiveApi`] over reqwest. The session is ambient: the client
//! carries an in-memory cookie store populated at login, so presence and
//! notification calls never see a credential. A 401/403 answer anywhere maps
//! to [`LiveError::Unauthorized`] and lets the owning component run its
//! session-expiry path.

use crate::api::{EventStream, LiveApi};
use crate::sse::SseParser;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use livegate_core::{LiveError, Notification, Result};
use reqwest::StatusCode;
use std::collections::VecDeque;
use tracing::{debug, warn};
use url::Url;

/// SSE event type carrying a notification payload. Untyped events are treated
/// the same; anything else on the stream is ignored.
const NOTIFICATION_EVENT: &str = "notification";

/// reqwest-backed implementation of [`LiveApi`].
#[derive(Debug, Clone)]
pub struct HttpLiveApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpLiveApi {
    /// Create a transport rooted at `base_url` with its own cookie store.
    pub fn new(base_url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| LiveError::transport(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a transport over an existing client, typically to share the
    /// cookie jar with the login flow.
    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self {
            client,
            base_url: ensure_dir_url(base_url),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| LiveError::protocol(format!("bad endpoint {path}: {e}")))
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).send().await.map_err(request_error)?;
        check_status(response.status())
    }
}

#[async_trait]
impl LiveApi for HttpLiveApi {
    async fn heartbeat(&self) -> Result<()> {
        self.post_empty("presence/connect").await
    }

    async fn go_offline(&self) -> Result<()> {
        self.post_empty("presence/disconnect").await
    }

    async fn open_stream(&self) -> Result<EventStream> {
        let url = self.endpoint("notifications/stream")?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status())?;

        let state = StreamState {
            body: response.bytes_stream().boxed(),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            done: false,
        };
        Ok(futures::stream::unfold(state, next_notification).boxed())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        let url = self.endpoint("notifications")?;
        let response = self.client.get(url).send().await.map_err(request_error)?;
        check_status(response.status())?;
        response
            .json()
            .await
            .map_err(|e| LiveError::protocol(format!("bad notification list: {e}")))
    }

    async fn mark_read(&self, id: u64) -> Result<()> {
        self.post_empty(&format!("notifications/{id}/read")).await
    }

    async fn delete(&self, id: u64) -> Result<()> {
        let url = self.endpoint(&format!("notifications/{id}"))?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status())
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    pending: VecDeque<Notification>,
    done: bool,
}

/// Pull body chunks through the SSE parser until a notification falls out.
///
/// Malformed payloads are logged and skipped so one bad event cannot kill the
/// connection; only transport failures end the stream, as a final `Err` item.
async fn next_notification(mut state: StreamState) -> Option<(Result<Notification>, StreamState)> {
    loop {
        if let Some(notification) = state.pending.pop_front() {
            return Some((Ok(notification), state));
        }
        if state.done {
            return None;
        }
        match state.body.next().await {
            Some(Ok(chunk)) => {
                for event in state.parser.feed(&chunk) {
                    if !event.event.is_empty() && event.event != NOTIFICATION_EVENT {
                        debug!(event = %event.event, "ignoring non-notification stream event");
                        continue;
                    }
                    match serde_json::from_str::<Notification>(&event.data) {
                        Ok(notification) => state.pending.push_back(notification),
                        Err(e) => warn!(error = %e, "dropping malformed notification event"),
                    }
                }
            }
            Some(Err(e)) => {
                state.done = true;
                return Some((Err(request_error(e)), state));
            }
            None => return None,
        }
    }
}

/// Map an HTTP status to the client failure taxonomy.
fn check_status(status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(LiveError::Unauthorized);
    }
    Err(LiveError::transport(format!("unexpected status {status}")))
}

fn request_error(e: reqwest::Error) -> LiveError {
    LiveError::transport(e.to_string())
}

/// `Url::join` treats a path without a trailing slash as a file and replaces
/// its last segment, so normalize the base to directory form once.
fn ensure_dir_url(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

//! Notification stream client.
//!
//! Owns the push connection and the local notification list. While the
//! session is authenticated it keeps the stream alive through a bounded
//! exponential backoff, ingests events as idempotent upserts, and applies
//! mark-as-read/delete optimistically with rollback when the server rejects
//! the confirmation.
//!
//! Structure mirrors the presence manager: one task owns all state and is
//! driven through commands from a cloneable [`NotificationClient`] handle.
//! Each connection session runs on a separate link task; updates from a link
//! carry the generation they belong to, so anything arriving after a
//! disconnect or teardown is discarded instead of resurrecting stale state.

use crate::api::{EventStream, LiveApi};
use crate::auth::SessionGate;
use crate::backoff::ReconnectPolicy;
use crate::config::LiveConfig;
use futures::StreamExt;
use livegate_core::{
    CloseReason, ConnectionState, Ingest, LiveError, Notification, NotificationSnapshot,
    NotificationStore, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Feed-side events surfaced to the embedding application.
///
/// Mutation failures ride this channel (plus a log line) because the
/// optimistic operations already reported success to their caller by the time
/// the server answers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A new notification entered the list.
    Arrived { id: u64 },
    /// A mark-as-read confirmation failed; the read flag was rolled back.
    MarkReadFailed { id: u64, reason: String },
    /// A delete confirmation failed; the notification was restored.
    DeleteFailed { id: u64, reason: String },
}

enum StreamCmd {
    Connect { done: oneshot::Sender<()> },
    Disconnect { done: oneshot::Sender<()> },
    MarkRead { id: u64, done: oneshot::Sender<()> },
    Delete { id: u64, done: oneshot::Sender<bool> },
    Shutdown { done: oneshot::Sender<()> },
}

/// Messages a link task sends its owner, tagged with the link's generation.
enum LinkUpdate {
    /// The stream opened.
    Opened,
    /// Snapshot fetched right after open.
    Snapshot(Vec<Notification>),
    /// One push event.
    Event(Notification),
    /// Transport loss; the link retries after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// The server rejected the session. The link is done.
    Unauthorized,
    /// The auth signal went false. The link is done.
    LoggedOut,
}

/// Result of one spawned mutation confirmation.
struct MutationOutcome {
    generation: u64,
    kind: MutationKind,
    result: Result<()>,
}

enum MutationKind {
    MarkRead { id: u64 },
    Delete { removed: Notification },
}

#[derive(Debug, PartialEq)]
enum CommandResult {
    Continue,
    Stop,
}

/// Cloneable handle to the notification stream client.
#[derive(Clone)]
pub struct NotificationClient {
    cmd_tx: mpsc::Sender<StreamCmd>,
    state_rx: watch::Receiver<ConnectionState>,
    snapshot_rx: watch::Receiver<NotificationSnapshot>,
    events_tx: broadcast::Sender<FeedEvent>,
}

impl NotificationClient {
    /// Spawn the client task. The task lives until [`shutdown`] or until the
    /// last handle is dropped.
    ///
    /// [`shutdown`]: NotificationClient::shutdown
    pub fn spawn(api: Arc<dyn LiveApi>, gate: SessionGate, config: &LiveConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (link_tx, link_rx) = mpsc::channel(config.event_capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel(config.command_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (snapshot_tx, snapshot_rx) = watch::channel(NotificationSnapshot::default());
        let (events_tx, _) = broadcast::channel(config.event_capacity);

        let task = StreamTask {
            api,
            gate,
            reconnect: config.reconnect.clone(),
            store: NotificationStore::new(),
            state_tx,
            snapshot_tx,
            events_tx: events_tx.clone(),
            link_tx,
            outcome_tx,
            generation: 0,
            link: None,
        };
        tokio::spawn(task.run(cmd_rx, link_rx, outcome_rx));

        Self {
            cmd_tx,
            state_rx,
            snapshot_rx,
            events_tx,
        }
    }

    /// Open the push connection and start maintaining it. No-op while a
    /// connection is open, connecting or retrying.
    pub async fn connect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StreamCmd::Connect { done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("stream task gone"))
    }

    /// Close the connection and clear the session-local list.
    ///
    /// Safe to call when already disconnected. Once this resolves, no event
    /// that was in flight will be processed.
    pub async fn disconnect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StreamCmd::Disconnect { done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("stream task gone"))
    }

    /// Optimistically mark a notification read, then confirm with the server.
    ///
    /// Resolves as soon as the local flag is flipped; a rejected confirmation
    /// rolls the flag back and surfaces [`FeedEvent::MarkReadFailed`].
    /// Unknown ids are a no-op.
    pub async fn mark_read(&self, id: u64) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StreamCmd::MarkRead { id, done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("stream task gone"))
    }

    /// Optimistically delete a notification.
    ///
    /// Returns `true` once the notification is removed locally, before the
    /// server confirms; a rejected confirmation restores it at its old
    /// position and surfaces [`FeedEvent::DeleteFailed`]. Returns `false` for
    /// unknown ids.
    pub async fn delete(&self, id: u64) -> Result<bool> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StreamCmd::Delete { id, done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("stream task gone"))
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Observe connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Latest notification list view.
    pub fn current_notifications(&self) -> NotificationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Observe notification list changes.
    pub fn notifications(&self) -> watch::Receiver<NotificationSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to feed events.
    pub fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.events_tx.subscribe()
    }

    /// Tear the client down for good.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(StreamCmd::Shutdown { done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("stream task gone"))
    }

    async fn send(&self, cmd: StreamCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| LiveError::closed("stream task not running"))
    }
}

struct LinkHandle {
    cancel: CancellationToken,
}

struct StreamTask {
    api: Arc<dyn LiveApi>,
    gate: SessionGate,
    reconnect: ReconnectPolicy,
    store: NotificationStore,
    state_tx: watch::Sender<ConnectionState>,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
    events_tx: broadcast::Sender<FeedEvent>,
    link_tx: mpsc::Sender<(u64, LinkUpdate)>,
    outcome_tx: mpsc::Sender<MutationOutcome>,
    /// Bumped whenever the current connection session is invalidated; updates
    /// and confirmation results tagged with an older value are discarded.
    generation: u64,
    link: Option<LinkHandle>,
}

impl StreamTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<StreamCmd>,
        mut link_rx: mpsc::Receiver<(u64, LinkUpdate)>,
        mut outcome_rx: mpsc::Receiver<MutationOutcome>,
    ) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd) == CommandResult::Stop {
                                break;
                            }
                        }
                        // Every handle dropped: same teardown as shutdown.
                        None => {
                            self.teardown(CloseReason::Shutdown);
                            break;
                        }
                    }
                }

                Some((generation, update)) = link_rx.recv() => {
                    self.handle_link_update(generation, update);
                }

                Some(outcome) = outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }
            }
        }
        debug!("notification stream task stopped");
    }

    fn handle_command(&mut self, cmd: StreamCmd) -> CommandResult {
        match cmd {
            StreamCmd::Connect { done } => {
                self.connect();
                let _ = done.send(());
                CommandResult::Continue
            }
            StreamCmd::Disconnect { done } => {
                self.disconnect();
                let _ = done.send(());
                CommandResult::Continue
            }
            StreamCmd::MarkRead { id, done } => {
                self.mark_read(id);
                let _ = done.send(());
                CommandResult::Continue
            }
            StreamCmd::Delete { id, done } => {
                let removed = self.delete(id);
                let _ = done.send(removed);
                CommandResult::Continue
            }
            StreamCmd::Shutdown { done } => {
                self.teardown(CloseReason::Shutdown);
                let _ = done.send(());
                CommandResult::Stop
            }
        }
    }

    fn connect(&mut self) {
        if self.state().is_live() {
            debug!("stream already connecting or open");
            return;
        }
        self.generation += 1;
        let cancel = CancellationToken::new();
        self.link = Some(LinkHandle {
            cancel: cancel.clone(),
        });
        self.set_state(ConnectionState::Connecting);

        let link = Link {
            api: self.api.clone(),
            auth: self.gate.subscribe(),
            reconnect: self.reconnect.clone(),
            generation: self.generation,
            updates: self.link_tx.clone(),
            cancel,
            session: Uuid::new_v4(),
        };
        tokio::spawn(link.run());
    }

    fn disconnect(&mut self) {
        // Invalidate first: an event already queued from the link must not be
        // ingested after this command resolves.
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
        if !matches!(self.state(), ConnectionState::Disconnected) {
            info!("notification stream disconnected");
        }
        self.store.clear();
        self.publish_snapshot();
        self.set_state(ConnectionState::Disconnected);
    }

    fn teardown(&mut self, reason: CloseReason) {
        self.generation += 1;
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
        self.store.clear();
        self.publish_snapshot();
        self.set_state(ConnectionState::Closed { reason });
    }

    fn mark_read(&mut self, id: u64) {
        // No local change (unknown id or already read) means nothing to
        // confirm and nothing that could need a rollback.
        if !self.store.mark_read(id) {
            trace!(id, "mark-read ignored");
            return;
        }
        self.publish_snapshot();
        self.spawn_confirmation(MutationKind::MarkRead { id });
    }

    fn delete(&mut self, id: u64) -> bool {
        let Some(removed) = self.store.remove(id) else {
            trace!(id, "delete ignored; unknown id");
            return false;
        };
        self.publish_snapshot();
        self.spawn_confirmation(MutationKind::Delete { removed });
        true
    }

    fn spawn_confirmation(&self, kind: MutationKind) {
        let api = self.api.clone();
        let tx = self.outcome_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = match &kind {
                MutationKind::MarkRead { id } => api.mark_read(*id).await,
                MutationKind::Delete { removed } => api.delete(removed.id).await,
            };
            let _ = tx
                .send(MutationOutcome {
                    generation,
                    kind,
                    result,
                })
                .await;
        });
    }

    fn handle_link_update(&mut self, generation: u64, update: LinkUpdate) {
        if generation != self.generation {
            trace!("discarding update from superseded link");
            return;
        }
        match update {
            LinkUpdate::Opened => {
                info!("notification stream open");
                self.set_state(ConnectionState::Open);
            }
            LinkUpdate::Snapshot(items) => {
                debug!(count = items.len(), "applying notification snapshot");
                self.store.sync(items);
                self.publish_snapshot();
            }
            LinkUpdate::Event(notification) => {
                let id = notification.id;
                if self.store.ingest(notification) == Ingest::Inserted {
                    let _ = self.events_tx.send(FeedEvent::Arrived { id });
                }
                self.publish_snapshot();
            }
            LinkUpdate::Retrying { attempt, delay } => {
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "stream lost; reconnecting"
                );
                self.set_state(ConnectionState::Reconnecting { attempt });
            }
            LinkUpdate::Unauthorized => {
                warn!("stream rejected; session expired");
                self.link = None;
                self.generation += 1;
                self.store.clear();
                self.publish_snapshot();
                self.set_state(ConnectionState::Closed {
                    reason: CloseReason::Unauthorized,
                });
                self.gate.expire();
            }
            LinkUpdate::LoggedOut => {
                debug!("auth signal lost; stream abandoned");
                self.link = None;
                self.generation += 1;
                self.store.clear();
                self.publish_snapshot();
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn handle_outcome(&mut self, outcome: MutationOutcome) {
        if outcome.generation != self.generation {
            trace!("discarding confirmation from superseded session");
            return;
        }
        match (outcome.kind, outcome.result) {
            (MutationKind::MarkRead { .. }, Ok(())) | (MutationKind::Delete { .. }, Ok(())) => {}
            (MutationKind::MarkRead { id }, Err(e)) => {
                warn!(id, error = %e, "mark-read rejected; rolling back");
                if self.store.set_read(id, false) {
                    self.publish_snapshot();
                }
                let _ = self.events_tx.send(FeedEvent::MarkReadFailed {
                    id,
                    reason: e.to_string(),
                });
            }
            (MutationKind::Delete { removed }, Err(e)) => {
                let id = removed.id;
                warn!(id, error = %e, "delete rejected; restoring notification");
                self.store.restore(removed);
                self.publish_snapshot();
                let _ = self.events_tx.send(FeedEvent::DeleteFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(self.store.snapshot());
    }

    fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "stream state changed");
                *current = state;
                true
            }
        });
    }
}

enum PumpEnd {
    /// Transport loss; the link retries.
    Lost,
    /// Cancelled, logged out or rejected; the link exits.
    Done,
}

/// One connection session: open, pump, retry on loss. Exits when cancelled,
/// when the session signal goes false, or when the server rejects the session.
struct Link {
    api: Arc<dyn LiveApi>,
    auth: watch::Receiver<bool>,
    reconnect: ReconnectPolicy,
    generation: u64,
    updates: mpsc::Sender<(u64, LinkUpdate)>,
    cancel: CancellationToken,
    session: Uuid,
}

impl Link {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if !*self.auth.borrow_and_update() {
                self.send(LinkUpdate::LoggedOut).await;
                return;
            }

            match self.open().await {
                Ok(stream) => {
                    attempt = 0;
                    match self.pump(stream).await {
                        PumpEnd::Done => return,
                        PumpEnd::Lost => {}
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    self.send(LinkUpdate::Unauthorized).await;
                    return;
                }
                Err(e) => {
                    debug!(session = %self.session, error = %e, "stream open failed");
                }
            }

            // Lost or failed to open: back off, then try again. There is no
            // attempt cap; only cancellation or a dead session ends the loop.
            let delay = self.reconnect.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            self.send(LinkUpdate::Retrying { attempt, delay }).await;
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                changed = self.auth.changed() => {
                    if changed.is_err() {
                        self.send(LinkUpdate::LoggedOut).await;
                        return;
                    }
                    // Value change is handled at the top of the loop.
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Open the stream, then fetch the snapshot that reconciles the local
    /// list. A failed snapshot is not fatal while the stream itself is live;
    /// the list converges from events until the next reconnect.
    async fn open(&mut self) -> Result<EventStream> {
        let stream = self.api.open_stream().await?;
        info!(session = %self.session, "notification stream connected");
        self.send(LinkUpdate::Opened).await;

        match self.api.fetch_notifications().await {
            Ok(items) => self.send(LinkUpdate::Snapshot(items)).await,
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                warn!(session = %self.session, error = %e, "snapshot fetch failed; relying on events");
            }
        }
        Ok(stream)
    }

    async fn pump(&mut self, mut stream: EventStream) -> PumpEnd {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return PumpEnd::Done,

                changed = self.auth.changed() => {
                    if changed.is_err() || !*self.auth.borrow_and_update() {
                        self.send(LinkUpdate::LoggedOut).await;
                        return PumpEnd::Done;
                    }
                }

                item = stream.next() => {
                    match item {
                        Some(Ok(notification)) => {
                            self.send(LinkUpdate::Event(notification)).await;
                        }
                        Some(Err(e)) => {
                            warn!(session = %self.session, error = %e, "stream error");
                            return PumpEnd::Lost;
                        }
                        None => {
                            debug!(session = %self.session, "stream ended by server");
                            return PumpEnd::Lost;
                        }
                    }
                }
            }
        }
    }

    async fn send(&self, update: LinkUpdate) {
        // Owner gone means shutdown; nothing left to report to.
        let _ = self.updates.send((self.generation, update)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, item, settle};

    fn test_config() -> LiveConfig {
        LiveConfig::default().with_reconnect(ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: false,
        })
    }

    fn spawn_client(api: &Arc<MockApi>, gate: &SessionGate) -> NotificationClient {
        let api: Arc<dyn LiveApi> = api.clone();
        NotificationClient::spawn(api, gate.clone(), &test_config())
    }

    fn listed_ids(client: &NotificationClient) -> Vec<u64> {
        client
            .current_notifications()
            .items
            .iter()
            .map(|n| n.id)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_stream_and_syncs_snapshot() {
        let api = Arc::new(MockApi::new());
        api.set_snapshot(vec![item(1, 10), item(2, 20)]);
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert_eq!(client.current_state(), ConnectionState::Open);
        assert_eq!(listed_ids(&client), vec![2, 1]);
        assert_eq!(api.stream_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_a_noop_while_live() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        client.connect().await.unwrap();
        settle().await;
        assert_eq!(api.stream_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_events_upsert_and_announce_new_arrivals() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);
        let mut events = client.events();

        client.connect().await.unwrap();
        settle().await;

        api.push_event(item(5, 50));
        api.push_event(item(3, 30));
        settle().await;
        assert_eq!(listed_ids(&client), vec![5, 3]);

        // Redelivery of id 5: replaced in place, no second arrival event.
        api.push_event(item(5, 50).with_read(true));
        settle().await;
        assert_eq!(listed_ids(&client), vec![5, 3]);
        assert!(client.current_notifications().items[0].is_read);

        assert!(matches!(
            events.try_recv().unwrap(),
            FeedEvent::Arrived { id: 5 }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            FeedEvent::Arrived { id: 3 }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unread_count_follows_the_list() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;

        api.push_event(item(1, 10));
        api.push_event(item(2, 20).with_read(true));
        settle().await;
        assert_eq!(client.current_notifications().unread_count(), 1);

        client.mark_read(1).await.unwrap();
        assert_eq!(client.current_notifications().unread_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_read_rolls_back_when_rejected() {
        let api = Arc::new(MockApi::new());
        api.set_mutation_delay(Duration::from_millis(50));
        api.fail_next_mark_read(LiveError::transport("503"));
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);
        let mut events = client.events();

        client.connect().await.unwrap();
        settle().await;
        api.push_event(item(1, 10));
        settle().await;

        client.mark_read(1).await.unwrap();
        // Optimistic flip is visible before the server answers.
        assert!(client.current_notifications().items[0].is_read);

        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;
        assert!(!client.current_notifications().items[0].is_read);
        assert_eq!(client.current_notifications().unread_count(), 1);
        let rollback = events.try_recv().unwrap();
        assert!(matches!(rollback, FeedEvent::MarkReadFailed { id: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_read_unknown_id_is_a_noop() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        client.mark_read(404).await.unwrap();
        settle().await;
        assert_eq!(api.mark_read_calls(), Vec::<u64>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_and_restores_on_rejection() {
        let api = Arc::new(MockApi::new());
        api.set_mutation_delay(Duration::from_millis(50));
        api.fail_next_delete(LiveError::transport("503"));
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);
        let mut events = client.events();

        client.connect().await.unwrap();
        settle().await;
        api.push_event(item(1, 10));
        api.push_event(item(2, 20));
        api.push_event(item(3, 30));
        settle().await;

        assert!(client.delete(2).await.unwrap());
        assert_eq!(listed_ids(&client), vec![3, 1]);

        tokio::time::advance(Duration::from_millis(50)).await;
        settle().await;
        // Rejected: restored at its ordinal position.
        assert_eq!(listed_ids(&client), vec![3, 2, 1]);
        let rollback = events.try_recv().unwrap();
        assert!(matches!(rollback, FeedEvent::DeleteFailed { id: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_confirmed_stays_deleted() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        api.push_event(item(1, 10));
        settle().await;

        assert!(client.delete(1).await.unwrap());
        settle().await;
        assert!(listed_ids(&client).is_empty());
        assert_eq!(api.delete_calls(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_unknown_id_returns_false() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert!(!client.delete(404).await.unwrap());
        settle().await;
        assert!(api.delete_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_stream_reconnects_with_backoff() {
        let api = Arc::new(MockApi::new());
        api.set_snapshot(vec![item(1, 10)]);
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert_eq!(api.stream_opens(), 1);

        api.end_stream();
        settle().await;
        // Loss is visible as a retrying state before the backoff elapses.
        assert_eq!(
            client.current_state(),
            ConnectionState::Reconnecting { attempt: 1 }
        );

        // First retry fires after the 1s base delay.
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 2);
        assert_eq!(client.current_state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_back_off_exponentially() {
        let api = Arc::new(MockApi::new());
        api.set_open_error(LiveError::transport("connect refused"));
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert_eq!(api.stream_opens(), 1);

        // attempt 1 after 1s
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 2);

        // attempt 2 after 2s more
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 3);

        // attempt 3 after 4s more
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 4);

        // Recovery resets the schedule and reopens.
        api.clear_open_error();
        tokio::time::advance(Duration::from_secs(8)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 5);
        assert_eq!(client.current_state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_the_retry_loop() {
        let api = Arc::new(MockApi::new());
        api.set_open_error(LiveError::transport("connect refused"));
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        let opens_before = api.stream_opens();

        gate.logout();
        settle().await;
        assert_eq!(client.current_state(), ConnectionState::Disconnected);

        // No further attempts once the session signal is false.
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(api.stream_opens(), opens_before);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_open_expires_session() {
        let api = Arc::new(MockApi::new());
        api.fail_next_open(LiveError::Unauthorized);
        let gate = SessionGate::with_state(true);
        let mut events = gate.events();
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert!(!gate.is_authenticated());
        assert_eq!(
            client.current_state(),
            ConnectionState::Closed {
                reason: CloseReason::Unauthorized
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            crate::auth::SessionEvent::Expired
        );

        // Closed, not retrying.
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(api.stream_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_list_and_blocks_late_events() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        api.push_event(item(1, 10));
        settle().await;
        assert_eq!(listed_ids(&client), vec![1]);

        client.disconnect().await.unwrap();
        assert_eq!(client.current_state(), ConnectionState::Disconnected);
        assert!(listed_ids(&client).is_empty());

        // An event still sitting in the pipe must not resurrect the list.
        api.push_event(item(2, 20));
        settle().await;
        assert!(listed_ids(&client).is_empty());
        assert_eq!(client.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_disconnected_is_safe() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(client.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_snapshot_replaces_stale_list() {
        let api = Arc::new(MockApi::new());
        api.set_snapshot(vec![item(1, 10), item(2, 20)]);
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert_eq!(listed_ids(&client), vec![2, 1]);

        // Server-side state moved on while we were away.
        api.set_snapshot(vec![item(2, 20), item(9, 90)]);
        api.end_stream();
        settle().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(listed_ids(&client), vec![9, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_snapshot_fetch_keeps_stream_alive() {
        let api = Arc::new(MockApi::new());
        api.fail_next_fetch(LiveError::transport("504"));
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        assert_eq!(client.current_state(), ConnectionState::Open);
        assert!(listed_ids(&client).is_empty());

        // Events still flow and build the list.
        api.push_event(item(7, 70));
        settle().await;
        assert_eq!(listed_ids(&client), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_for_good() {
        let api = Arc::new(MockApi::new());
        let gate = SessionGate::with_state(true);
        let client = spawn_client(&api, &gate);

        client.connect().await.unwrap();
        settle().await;
        client.shutdown().await.unwrap();
        assert_eq!(
            client.current_state(),
            ConnectionState::Closed {
                reason: CloseReason::Shutdown
            }
        );
        assert!(client.connect().await.is_err());
    }
}

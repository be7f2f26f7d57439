//! Test doubles shared by the component tests.

use crate::api::{EventStream, LiveApi};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use futures::channel::mpsc as stream_mpsc;
use livegate_core::{LiveError, Notification, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Let spawned tasks and timers catch up under a paused clock.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Notification fixture with a deterministic timestamp offset.
pub(crate) fn item(id: u64, secs: i64) -> Notification {
    Notification::new(id, format!("n{id}"), "body", base() + chrono::TimeDelta::seconds(secs))
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

type EventSender = stream_mpsc::UnboundedSender<Result<Notification>>;

/// Scriptable in-memory [`LiveApi`].
///
/// Counters answer "how many times", queues script "what the next call
/// returns" (empty queue means success), and the stream side hands out a
/// channel per open so tests can push events, drop the connection, or let the
/// pump see an error.
pub(crate) struct MockApi {
    heartbeats: AtomicUsize,
    offline_calls: AtomicUsize,
    stream_opens: AtomicUsize,
    ops: Mutex<Vec<&'static str>>,
    heartbeat_delay: Mutex<Option<Duration>>,
    mutation_delay: Mutex<Option<Duration>>,
    heartbeat_failures: Mutex<VecDeque<LiveError>>,
    offline_failures: Mutex<VecDeque<LiveError>>,
    open_failures: Mutex<VecDeque<LiveError>>,
    fetch_failures: Mutex<VecDeque<LiveError>>,
    mark_read_failures: Mutex<VecDeque<LiveError>>,
    delete_failures: Mutex<VecDeque<LiveError>>,
    /// While set, every open fails with a clone of this error.
    open_error: Mutex<Option<LiveError>>,
    snapshot: Mutex<Vec<Notification>>,
    stream_tx: Mutex<Option<EventSender>>,
    mark_read_ids: Mutex<Vec<u64>>,
    delete_ids: Mutex<Vec<u64>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            heartbeats: AtomicUsize::new(0),
            offline_calls: AtomicUsize::new(0),
            stream_opens: AtomicUsize::new(0),
            ops: Mutex::new(Vec::new()),
            heartbeat_delay: Mutex::new(None),
            mutation_delay: Mutex::new(None),
            heartbeat_failures: Mutex::new(VecDeque::new()),
            offline_failures: Mutex::new(VecDeque::new()),
            open_failures: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            mark_read_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
            open_error: Mutex::new(None),
            snapshot: Mutex::new(Vec::new()),
            stream_tx: Mutex::new(None),
            mark_read_ids: Mutex::new(Vec::new()),
            delete_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn offline_calls(&self) -> usize {
        self.offline_calls.load(Ordering::SeqCst)
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    /// Calls in arrival order, for asserting cross-component sequencing.
    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    pub fn mark_read_calls(&self) -> Vec<u64> {
        self.mark_read_ids.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<u64> {
        self.delete_ids.lock().unwrap().clone()
    }

    pub fn fail_next_heartbeat(&self, err: LiveError) {
        self.heartbeat_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_offline(&self, err: LiveError) {
        self.offline_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_open(&self, err: LiveError) {
        self.open_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_fetch(&self, err: LiveError) {
        self.fetch_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_mark_read(&self, err: LiveError) {
        self.mark_read_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_delete(&self, err: LiveError) {
        self.delete_failures.lock().unwrap().push_back(err);
    }

    pub fn set_open_error(&self, err: LiveError) {
        *self.open_error.lock().unwrap() = Some(err);
    }

    pub fn clear_open_error(&self) {
        *self.open_error.lock().unwrap() = None;
    }

    pub fn set_heartbeat_delay(&self, delay: Duration) {
        *self.heartbeat_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_mutation_delay(&self, delay: Duration) {
        *self.mutation_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_snapshot(&self, items: Vec<Notification>) {
        *self.snapshot.lock().unwrap() = items;
    }

    /// Push one event into the currently open stream, if any.
    pub fn push_event(&self, notification: Notification) {
        if let Some(tx) = self.stream_tx.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send(Ok(notification));
        }
    }

    /// Close the current stream from the server side (clean EOF).
    pub fn end_stream(&self) {
        self.stream_tx.lock().unwrap().take();
    }

    fn record(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }

    fn pop(queue: &Mutex<VecDeque<LiveError>>) -> Result<()> {
        match queue.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LiveApi for MockApi {
    async fn heartbeat(&self) -> Result<()> {
        self.record("heartbeat");
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        let delay = *self.heartbeat_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::pop(&self.heartbeat_failures)
    }

    async fn go_offline(&self) -> Result<()> {
        self.record("offline");
        self.offline_calls.fetch_add(1, Ordering::SeqCst);
        Self::pop(&self.offline_failures)
    }

    async fn open_stream(&self) -> Result<EventStream> {
        self.record("open_stream");
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_error.lock().unwrap().clone() {
            return Err(err);
        }
        Self::pop(&self.open_failures)?;
        let (tx, rx) = stream_mpsc::unbounded();
        *self.stream_tx.lock().unwrap() = Some(tx);
        Ok(rx.boxed())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        self.record("fetch");
        Self::pop(&self.fetch_failures)?;
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn mark_read(&self, id: u64) -> Result<()> {
        self.record("mark_read");
        self.mark_read_ids.lock().unwrap().push(id);
        let delay = *self.mutation_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::pop(&self.mark_read_failures)
    }

    async fn delete(&self, id: u64) -> Result<()> {
        self.record("delete");
        self.delete_ids.lock().unwrap().push(id);
        let delay = *self.mutation_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Self::pop(&self.delete_failures)
    }
}

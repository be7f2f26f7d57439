//! Presence heartbeat manager.
//!
//! Reports "this client is online" on a fixed cadence while the session is
//! authenticated and the tab is visible. The server keeps a TTL per entry, so
//! missed beats degrade gracefully; the interesting work here is the state
//! machine: suspend/resume on visibility, a terminal state when the server
//! rejects a beat, and a best-effort offline signal on the way out.
//!
//! The machine runs on its own task and is driven purely through commands;
//! callers hold a cheap cloneable [`PresenceManager`] handle and observe state
//! through a watch channel.

use crate::api::LiveApi;
use crate::auth::SessionGate;
use crate::config::LiveConfig;
use livegate_core::{LiveError, PresenceState, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

enum PresenceCmd {
    Start,
    Stop { done: oneshot::Sender<()> },
    Visibility { hidden: bool },
    Shutdown { done: oneshot::Sender<()> },
}

/// Result of one spawned heartbeat call, tagged with the session generation it
/// belongs to.
struct BeatOutcome {
    generation: u64,
    result: Result<()>,
}

#[derive(Debug, PartialEq)]
enum CommandResult {
    Continue,
    Stop,
}

/// Cloneable handle controlling the presence heartbeat task.
#[derive(Debug, Clone)]
pub struct PresenceManager {
    cmd_tx: mpsc::Sender<PresenceCmd>,
    state_rx: watch::Receiver<PresenceState>,
}

impl PresenceManager {
    /// Spawn the manager task. The task lives until [`shutdown`] or until the
    /// last handle is dropped.
    ///
    /// [`shutdown`]: PresenceManager::shutdown
    pub fn spawn(api: Arc<dyn LiveApi>, gate: SessionGate, config: &LiveConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (beat_tx, beat_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(PresenceState::Idle);

        let task = PresenceTask {
            api,
            gate,
            period: config.heartbeat_interval,
            state_tx,
            beat_tx,
            next_beat: None,
            hidden: false,
            generation: 0,
            offline_sent: false,
        };
        tokio::spawn(task.run(cmd_rx, beat_rx));

        Self { cmd_tx, state_rx }
    }

    /// Begin heartbeating: one beat immediately, then one per interval.
    /// No-op when already started.
    pub async fn start(&self) -> Result<()> {
        self.send(PresenceCmd::Start).await
    }

    /// Stop heartbeating and send the one best-effort offline signal if the
    /// session was still considered alive.
    ///
    /// Safe to call from any state and repeatedly. Resolves once the timer is
    /// cleared, after which no further beats fire.
    pub async fn stop(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PresenceCmd::Stop { done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("presence task gone"))
    }

    /// Report a tab visibility change. Hidden suspends the timer; visible
    /// resumes with an immediate beat and a fresh interval.
    pub async fn set_visibility(&self, hidden: bool) -> Result<()> {
        self.send(PresenceCmd::Visibility { hidden }).await
    }

    /// Current presence state.
    pub fn current_state(&self) -> PresenceState {
        *self.state_rx.borrow()
    }

    /// Observe presence state transitions.
    pub fn state(&self) -> watch::Receiver<PresenceState> {
        self.state_rx.clone()
    }

    /// Tear the task down, attempting the offline signal first.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PresenceCmd::Shutdown { done: done_tx }).await?;
        done_rx
            .await
            .map_err(|_| LiveError::closed("presence task gone"))
    }

    async fn send(&self, cmd: PresenceCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| LiveError::closed("presence task not running"))
    }
}

struct PresenceTask {
    api: Arc<dyn LiveApi>,
    gate: SessionGate,
    period: Duration,
    state_tx: watch::Sender<PresenceState>,
    beat_tx: mpsc::Sender<BeatOutcome>,
    /// Deadline of the next beat; `None` while idle, suspended or expired.
    next_beat: Option<Instant>,
    hidden: bool,
    /// Bumped whenever the current run is invalidated so in-flight beat
    /// results from a superseded run are discarded.
    generation: u64,
    /// Whether the offline signal already went out for the current run.
    offline_sent: bool,
}

impl PresenceTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PresenceCmd>,
        mut beat_rx: mpsc::Receiver<BeatOutcome>,
    ) {
        loop {
            let deadline = self.next_beat.unwrap_or_else(far_future);
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await == CommandResult::Stop {
                                break;
                            }
                        }
                        // Every handle dropped: same teardown as shutdown.
                        None => {
                            self.teardown().await;
                            break;
                        }
                    }
                }

                Some(outcome) = beat_rx.recv() => {
                    self.handle_outcome(outcome);
                }

                _ = tokio::time::sleep_until(deadline), if self.next_beat.is_some() => {
                    self.fire_beat();
                    self.next_beat = Some(Instant::now() + self.period);
                }
            }
        }
        debug!("presence task stopped");
    }

    async fn handle_command(&mut self, cmd: PresenceCmd) -> CommandResult {
        match cmd {
            PresenceCmd::Start => {
                self.start();
                CommandResult::Continue
            }
            PresenceCmd::Stop { done } => {
                self.stop();
                let _ = done.send(());
                CommandResult::Continue
            }
            PresenceCmd::Visibility { hidden } => {
                self.set_visibility(hidden);
                CommandResult::Continue
            }
            PresenceCmd::Shutdown { done } => {
                self.teardown().await;
                let _ = done.send(());
                CommandResult::Stop
            }
        }
    }

    fn start(&mut self) {
        match self.state() {
            PresenceState::Active | PresenceState::Suspended => {
                debug!("presence already started");
            }
            PresenceState::Idle | PresenceState::Unauthenticated => {
                self.generation += 1;
                self.offline_sent = false;
                if self.hidden {
                    // Tab already hidden: hold the first beat until it shows.
                    info!("presence started while hidden; waiting for visibility");
                    self.set_state(PresenceState::Suspended);
                } else {
                    info!(period_secs = self.period.as_secs(), "presence heartbeat started");
                    self.set_state(PresenceState::Active);
                    self.fire_beat();
                    self.next_beat = Some(Instant::now() + self.period);
                }
            }
        }
    }

    fn stop(&mut self) {
        let state = self.state();
        // Invalidate in-flight beats first: nothing may mutate the machine
        // after stop resolves.
        self.generation += 1;
        self.next_beat = None;
        if state.is_session_alive() {
            self.fire_offline();
        }
        if state != PresenceState::Idle {
            info!("presence heartbeat stopped");
        }
        self.set_state(PresenceState::Idle);
    }

    fn set_visibility(&mut self, hidden: bool) {
        if self.hidden == hidden {
            return;
        }
        self.hidden = hidden;
        match (self.state(), hidden) {
            (PresenceState::Active, true) => {
                debug!("tab hidden; presence suspended");
                self.next_beat = None;
                self.set_state(PresenceState::Suspended);
            }
            (PresenceState::Suspended, false) => {
                // Resume with an immediate beat and a full fresh interval, not
                // the remainder of the pre-suspend one.
                debug!("tab visible; presence resumed");
                self.set_state(PresenceState::Active);
                self.fire_beat();
                self.next_beat = Some(Instant::now() + self.period);
            }
            _ => {}
        }
    }

    /// Final teardown for shutdown and handle-drop: best-effort offline
    /// signal, awaited inline because the task exits right after.
    async fn teardown(&mut self) {
        self.next_beat = None;
        self.generation += 1;
        if self.state().is_session_alive() && !self.offline_sent {
            self.offline_sent = true;
            if let Err(e) = self.api.go_offline().await {
                debug!(error = %e, "offline signal failed during shutdown");
            }
        }
        self.set_state(PresenceState::Idle);
    }

    fn fire_beat(&self) {
        trace!(generation = self.generation, "sending heartbeat");
        let api = self.api.clone();
        let tx = self.beat_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = api.heartbeat().await;
            let _ = tx.send(BeatOutcome { generation, result }).await;
        });
    }

    fn fire_offline(&mut self) {
        if self.offline_sent {
            return;
        }
        self.offline_sent = true;
        let api = self.api.clone();
        tokio::spawn(async move {
            // Best effort; failure only means the server waits out the TTL.
            if let Err(e) = api.go_offline().await {
                debug!(error = %e, "offline signal failed");
            }
        });
    }

    fn handle_outcome(&mut self, outcome: BeatOutcome) {
        if outcome.generation != self.generation {
            trace!("discarding heartbeat result from superseded run");
            return;
        }
        match outcome.result {
            Ok(()) => trace!("heartbeat acknowledged"),
            Err(e) if e.is_unauthorized() => {
                warn!("heartbeat rejected; session expired");
                self.next_beat = None;
                self.generation += 1;
                self.set_state(PresenceState::Unauthenticated);
                self.gate.expire();
            }
            Err(e) => {
                // Transient: the fixed cadence already rate-limits retries.
                warn!(error = %e, "heartbeat failed; retrying on next tick");
            }
        }
    }

    fn state(&self) -> PresenceState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: PresenceState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "presence state changed");
                *current = state;
                true
            }
        });
    }
}

/// A deadline far enough out to mean "never"; keeps the sleep arm simple when
/// no beat is scheduled.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

//! Room Actor
//!
//! One tokio task per room owns that room's [`Game`]. Requests arrive on a
//! bounded mpsc queue and are applied one at a time; the reply goes back to
//! the caller on a oneshot channel, while state and events fan out to every
//! subscriber on a broadcast channel.
//!
//! The actor also arms a wall-clock deadline for every open wait. When a
//! deadline passes it applies `Expire` for that wait, which the game ignores
//! if the wait has since closed or reopened.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::game::command::{apply_command, Applied, Command, CommandError};
use crate::game::state::{Game, GameRules};
use crate::game::wait::{self, WaitKind};
use crate::network::protocol::{ServerMessage, StateUpdate};
use crate::network::store::RoomStore;

// =============================================================================
// CONFIG
// =============================================================================

/// Per-room settings.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Programming phase timeout.
    pub programming_timeout: Duration,
    /// Power-down answer timeout.
    pub power_down_timeout: Duration,
    /// Respawn choice timeout.
    pub respawn_timeout: Duration,
    /// Option card loss timeout.
    pub card_loss_timeout: Duration,
    /// Damage-prevention window timeout.
    pub damage_prevention_timeout: Duration,
    /// Inbound request queue capacity.
    pub queue_capacity: usize,
    /// Outbound broadcast capacity.
    pub broadcast_capacity: usize,
    /// How long a room without subscribers survives.
    pub abandon_after: Duration,
    /// Game rules.
    pub rules: GameRules,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            programming_timeout: Duration::from_secs(90),
            power_down_timeout: Duration::from_secs(30),
            respawn_timeout: Duration::from_secs(30),
            card_loss_timeout: Duration::from_secs(30),
            damage_prevention_timeout: Duration::from_secs(15),
            queue_capacity: 64,
            broadcast_capacity: 128,
            abandon_after: Duration::from_secs(300),
            rules: GameRules::default(),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    let value = std::env::var(key).ok()?;
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            warn!(key, value, "ignoring non-numeric setting");
            None
        }
    }
}

impl RoomConfig {
    /// Defaults overridden by `ROBORACE_*_SECS` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(d) = env_secs("ROBORACE_PROGRAMMING_SECS") {
            config.programming_timeout = d;
        }
        if let Some(d) = env_secs("ROBORACE_POWER_DOWN_SECS") {
            config.power_down_timeout = d;
        }
        if let Some(d) = env_secs("ROBORACE_RESPAWN_SECS") {
            config.respawn_timeout = d;
        }
        if let Some(d) = env_secs("ROBORACE_CARD_LOSS_SECS") {
            config.card_loss_timeout = d;
        }
        if let Some(d) = env_secs("ROBORACE_DAMAGE_PREVENTION_SECS") {
            config.damage_prevention_timeout = d;
        }
        if let Some(d) = env_secs("ROBORACE_ABANDON_SECS") {
            config.abandon_after = d;
        }
        config
    }

    /// Timeout for one kind of wait.
    pub fn timeout(&self, kind: WaitKind) -> Duration {
        match kind {
            WaitKind::Cards => self.programming_timeout,
            WaitKind::PowerDown => self.power_down_timeout,
            WaitKind::Respawn => self.respawn_timeout,
            WaitKind::OptionCardLoss => self.card_loss_timeout,
            WaitKind::DamagePrevention => self.damage_prevention_timeout,
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Room errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// The room task has stopped.
    #[error("room closed")]
    Closed,

    /// The game rejected the command.
    #[error(transparent)]
    Rejected(#[from] CommandError),
}

/// Requests processed by the room task.
#[derive(Debug)]
pub enum RoomRequest {
    /// Apply a command.
    Apply {
        /// Command to apply
        command: Command,
        /// Outcome for the caller
        reply: oneshot::Sender<Result<Applied, CommandError>>,
    },
    /// Current public state.
    State {
        /// State for the caller
        reply: oneshot::Sender<StateUpdate>,
    },
    /// Stop the room.
    Shutdown,
}

/// Cheap, cloneable access to a room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: String,
    requests: mpsc::Sender<RoomRequest>,
    updates: broadcast::Sender<ServerMessage>,
}

impl RoomHandle {
    /// Room code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Apply a command and wait for the outcome.
    pub async fn apply(&self, command: Command) -> Result<Applied, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(RoomRequest::Apply { command, reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        Ok(rx.await.map_err(|_| RoomError::Closed)??)
    }

    /// Current public state.
    pub async fn state(&self) -> Result<StateUpdate, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(RoomRequest::State { reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Receive every state and event broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.updates.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Ask the room task to stop.
    pub async fn shutdown(&self) {
        let _ = self.requests.send(RoomRequest::Shutdown).await;
    }

    /// Room task has stopped.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

// =============================================================================
// ACTOR
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    wall: DateTime<Utc>,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        let wall = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or_else(Utc::now);
        Self { at: Instant::now() + timeout, wall }
    }
}

/// The task that owns one game.
pub struct RoomActor {
    game: Game,
    config: RoomConfig,
    requests: mpsc::Receiver<RoomRequest>,
    updates: broadcast::Sender<ServerMessage>,
    store: Arc<dyn RoomStore>,
    deadlines: BTreeMap<(WaitKind, u64), Deadline>,
}

/// Spawn a room task around a game.
pub fn spawn_room(game: Game, config: RoomConfig, store: Arc<dyn RoomStore>) -> (RoomHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::channel(config.queue_capacity);
    let (update_tx, _) = broadcast::channel(config.broadcast_capacity);

    let handle = RoomHandle {
        code: game.room_code.clone(),
        requests: request_tx,
        updates: update_tx.clone(),
    };
    let actor = RoomActor {
        game,
        config,
        requests: request_rx,
        updates: update_tx,
        store,
        deadlines: BTreeMap::new(),
    };
    let task = tokio::spawn(actor.run());
    (handle, task)
}

impl RoomActor {
    async fn run(mut self) {
        info!(room = %self.game.room_code, "room opened");
        self.sync_deadlines();
        self.persist();

        loop {
            let next = self.deadlines.values().map(|d| d.at).min();
            let timer = sleep_until(next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)));

            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(RoomRequest::Apply { command, reply }) => {
                            let result = self.apply(command);
                            let _ = reply.send(result);
                        }
                        Some(RoomRequest::State { reply }) => {
                            let _ = reply.send(self.state_update());
                        }
                        Some(RoomRequest::Shutdown) | None => break,
                    }
                }
                _ = timer, if next.is_some() => {
                    self.fire_expired();
                }
            }
        }

        info!(room = %self.game.room_code, round = self.game.round_number, "room closed");
        let _ = self.updates.send(ServerMessage::Shutdown {
            reason: format!("room {} closed", self.game.room_code),
        });
    }

    fn apply(&mut self, command: Command) -> Result<Applied, CommandError> {
        let name = command.name();
        let result = apply_command(&mut self.game, &command);
        match &result {
            Ok(Applied::Changed) => self.publish(),
            Ok(Applied::Ignored) => debug!(room = %self.game.room_code, command = name, "command had no effect"),
            Err(err) => warn!(room = %self.game.room_code, command = name, %err, "command rejected"),
        }
        result
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();
        let due: Vec<(WaitKind, u64)> = self
            .deadlines
            .iter()
            .filter(|(_, d)| d.at <= now)
            .map(|(key, _)| *key)
            .collect();

        for (kind, serial) in due {
            self.deadlines.remove(&(kind, serial));
            info!(room = %self.game.room_code, %kind, serial, "wait deadline passed");
            if let Err(err) = self.apply(Command::Expire { kind, serial }) {
                error!(room = %self.game.room_code, %kind, %err, "expiry failed");
            }
        }
    }

    /// Arm a deadline for every newly opened wait, drop those that closed.
    fn sync_deadlines(&mut self) {
        let open = wait::open_waits(&self.game);
        self.deadlines.retain(|key, _| open.contains(key));
        for key in open {
            let timeout = self.config.timeout(key.0);
            self.deadlines.entry(key).or_insert_with(|| Deadline::after(timeout));
        }
    }

    fn reported_deadline(&self) -> Option<DateTime<Utc>> {
        let kind = wait::compute_waiting_on(&self.game)?.kind;
        self.deadlines
            .iter()
            .find(|((k, _), _)| *k == kind)
            .map(|(_, d)| d.wall)
    }

    fn state_update(&self) -> StateUpdate {
        StateUpdate {
            room_code: self.game.room_code.clone(),
            snapshot: self.game.public_snapshot(),
            state_hash: hex::encode(self.game.compute_hash()),
            deadline: self.reported_deadline(),
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.game.room_code, &self.game.snapshot()) {
            error!(room = %self.game.room_code, %err, "failed to persist snapshot");
        }
    }

    /// Send events and the new state to every subscriber.
    fn publish(&mut self) {
        self.sync_deadlines();
        self.persist();

        let events = self.game.take_events();
        if !events.is_empty() {
            let _ = self.updates.send(ServerMessage::Events {
                room_code: self.game.room_code.clone(),
                events,
            });
        }
        let _ = self.updates.send(ServerMessage::State(self.state_update()));
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Shared bot state: the single upstream session and its registries.
//!
//! One [`Bot`] exists per process. It owns the room and user registries,
//! the handler and command tables (built once at startup and injected),
//! the outbound send handle, and the two task scopes: a process-lifetime
//! tracker for background work and a connection-scoped tracker that is
//! cancelled and replaced on every socket loss.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use ps_proto::{Rank, RoomId, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::client::{Outbound, OutboundLine};
use crate::commands::{ActiveCommands, CommandRegistry};
use crate::config::Config;
use crate::db::Database;
use crate::handlers::HandlerRegistry;
use crate::repeats::RepeatScheduler;
use crate::state::{self, RoomState};

const OUTBOUND_CAPACITY: usize = 512;

/// A user seen anywhere on the connection.
#[derive(Debug, Clone, Default)]
pub struct UserEntry {
    /// Display form of the name, sigils stripped.
    pub name: String,
    /// Global rank, as last observed outside any room.
    pub global_rank: Rank,
}

/// One connection attempt's task scope. Every task spawned through it is
/// cancelled together when the socket is lost.
#[derive(Clone)]
pub struct ConnScope {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl ConnScope {
    fn new(shutdown: &CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: shutdown.child_token(),
        }
    }

    /// Spawn a task that dies with this scope.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = fut => {}
            }
        });
    }
}

/// The single upstream session.
pub struct Bot {
    pub config: Config,
    pub db: Database,
    pub http: reqwest::Client,
    /// Outbound send path (throttled by the connection's event loop).
    pub outbound: Outbound,
    /// Live rooms, keyed by normalized id. Evicted explicitly on `deinit`.
    pub rooms: DashMap<RoomId, Arc<RoomState>>,
    /// Users seen on the connection, keyed by normalized id.
    pub users: DashMap<UserId, UserEntry>,
    /// Protocol handler table (message type -> handlers).
    pub handlers: HandlerRegistry,
    /// Chat command table (name/alias -> command).
    pub commands: CommandRegistry,
    /// In-flight commands, keyed by target context.
    pub active: ActiveCommands,
    /// Live repeat jobs.
    pub repeats: RepeatScheduler,
    /// Tracker for process-lifetime tasks (repeat jobs, recurring tasks).
    pub lifetime: TaskTracker,
    /// Process-wide cancellation; fires on the termination signal.
    pub shutdown: CancellationToken,
    conn: RwLock<ConnScope>,
    own_id: UserId,
    started_at: Instant,
}

impl Bot {
    /// Build the session state. Returns the receiving half of the outbound
    /// channel; the connection's event loop drains it.
    pub fn new(
        config: Config,
        db: Database,
        handlers: HandlerRegistry,
        commands: CommandRegistry,
    ) -> (Arc<Bot>, mpsc::Receiver<OutboundLine>) {
        let (outbound, outbound_rx) = Outbound::channel(OUTBOUND_CAPACITY);
        let shutdown = CancellationToken::new();
        let own_id = UserId::new(&config.login.username);

        let bot = Arc::new(Bot {
            own_id,
            db,
            http: reqwest::Client::new(),
            outbound,
            rooms: DashMap::new(),
            users: DashMap::new(),
            handlers,
            commands,
            active: ActiveCommands::default(),
            repeats: RepeatScheduler::default(),
            lifetime: TaskTracker::new(),
            conn: RwLock::new(ConnScope::new(&shutdown)),
            shutdown,
            started_at: Instant::now(),
            config,
        });

        (bot, outbound_rx)
    }

    /// The bot's own normalized user id.
    pub fn own_id(&self) -> &UserId {
        &self.own_id
    }

    /// How long the process has been up.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The current connection task scope.
    pub fn conn_tasks(&self) -> ConnScope {
        self.conn.read().clone()
    }

    /// Cancel every task spawned through the connection scope, wait for
    /// them to finish, and install a fresh scope for the next attempt.
    pub async fn reset_conn_scope(&self) {
        let old = {
            let mut scope = self.conn.write();
            std::mem::replace(&mut *scope, ConnScope::new(&self.shutdown))
        };
        old.token.cancel();
        old.tracker.close();
        old.tracker.wait().await;
    }

    /// Get or create the room with this id.
    pub fn room(&self, id: &RoomId) -> Arc<RoomState> {
        self.rooms
            .entry(id.clone())
            .or_insert_with(|| {
                let webhook_url = self
                    .config
                    .rooms
                    .iter()
                    .find(|block| RoomId::new(&block.name) == *id)
                    .and_then(|block| block.webhook_url.clone());
                Arc::new(RoomState::new(id.clone(), webhook_url))
            })
            .clone()
    }

    /// Look up a room without creating it.
    pub fn get_room(&self, id: &RoomId) -> Option<Arc<RoomState>> {
        self.rooms.get(id).map(|r| r.clone())
    }

    /// Drop a room from the registry (the `deinit` path).
    pub fn remove_room(&self, id: &RoomId) -> Option<Arc<RoomState>> {
        self.rooms.remove(id).map(|(_, room)| room)
    }

    /// Rooms currently containing the user. Computed on demand rather than
    /// stored, so there is nothing to go stale.
    pub fn rooms_of(&self, user: &UserId) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().contains(user))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Record a user's display name from its raw wire form.
    pub fn note_user(&self, raw: &str) -> UserId {
        let (_, name) = Rank::split(raw.trim());
        let name = name.split('@').next().unwrap_or(name);
        let user = UserId::new(raw);
        self.users
            .entry(user.clone())
            .or_default()
            .name = name.to_string();
        user
    }

    /// Record a user's global rank from a context that carries it
    /// (private messages, the login acknowledgement).
    pub fn note_global_rank(&self, raw: &str) -> UserId {
        let (rank, name) = Rank::split(raw.trim());
        let user = UserId::new(raw);
        let mut entry = self.users.entry(user.clone()).or_default();
        entry.name = name.to_string();
        entry.global_rank = rank;
        user
    }

    /// Decode one frame and route its contents: room metadata is applied
    /// directly, messages are appended in order to the owning room's queue.
    pub fn ingest_frame(self: &Arc<Self>, raw: &str) {
        let frame = ps_proto::decode_frame(raw);
        let room_id = frame.room.unwrap_or_else(RoomId::global);
        let room = self.room(&room_id);

        if let Some(language) = &frame.language {
            room.set_language(language);
        }

        for msg in frame.messages {
            state::enqueue(self, &room, msg);
        }
    }
}

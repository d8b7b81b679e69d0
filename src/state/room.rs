//! Live room state.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use ps_proto::{Rank, RoomId, ServerMessage, UserId};

/// Capacity of the rolling buffer of recent message bodies.
pub const MESSAGE_BUFFER_CAPACITY: usize = 50;

/// One member of a room's roster.
#[derive(Debug, Clone)]
pub struct RoomMember {
    /// Display form of the name, rank sigil stripped.
    pub name: String,
    /// The member's rank within this room.
    pub rank: Rank,
}

/// Mutable room metadata.
#[derive(Debug, Default)]
pub struct RoomMeta {
    pub title: String,
    pub language: Option<String>,
    pub roster: HashMap<UserId, RoomMember>,
    /// The bot's own rank in this room.
    pub own_rank: Rank,
    /// Webhook endpoint associated with this room, if configured.
    pub webhook_url: Option<String>,
}

/// The room's private message queue plus its consumer flag.
///
/// `running` may only change under this lock; the pop-or-exit decision in
/// the consumer and the spawn decision in `enqueue` race otherwise.
#[derive(Debug, Default)]
pub(crate) struct RoomQueue {
    pub items: VecDeque<ServerMessage>,
    pub running: bool,
}

/// State for one live room.
///
/// Rooms are owned by the [`Bot`](crate::bot::Bot) registry and evicted
/// explicitly on a `deinit` protocol event.
pub struct RoomState {
    id: RoomId,
    meta: Mutex<RoomMeta>,
    buffer: Mutex<VecDeque<String>>,
    pub(crate) queue: Mutex<RoomQueue>,
}

impl RoomState {
    pub fn new(id: RoomId, webhook_url: Option<String>) -> Self {
        Self {
            id,
            meta: Mutex::new(RoomMeta { webhook_url, ..RoomMeta::default() }),
            buffer: Mutex::new(VecDeque::with_capacity(MESSAGE_BUFFER_CAPACITY)),
            queue: Mutex::new(RoomQueue::default()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn title(&self) -> String {
        self.meta.lock().title.clone()
    }

    pub fn set_title(&self, title: &str) {
        self.meta.lock().title = title.to_string();
    }

    pub fn language(&self) -> Option<String> {
        self.meta.lock().language.clone()
    }

    pub fn set_language(&self, language: &str) {
        self.meta.lock().language = Some(language.to_string());
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.meta.lock().webhook_url.clone()
    }

    /// The bot's own rank here, as last reported by the roster.
    pub fn own_rank(&self) -> Rank {
        self.meta.lock().own_rank
    }

    /// Whether the bot holds a staff rank in this room.
    pub fn is_staff(&self) -> bool {
        self.own_rank() >= Rank::Driver
    }

    pub fn member_rank(&self, user: &UserId) -> Option<Rank> {
        self.meta.lock().roster.get(user).map(|m| m.rank)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.meta.lock().roster.contains_key(user)
    }

    pub fn member_count(&self) -> usize {
        self.meta.lock().roster.len()
    }

    /// Insert or update a roster entry from its raw wire form.
    /// Returns the normalized id.
    pub fn upsert_member(&self, raw: &str, own_id: &UserId) -> UserId {
        let (rank, name) = Rank::split(raw.trim());
        let name = name.split('@').next().unwrap_or(name);
        let user = UserId::new(raw);
        let mut meta = self.meta.lock();
        if user == *own_id {
            meta.own_rank = rank;
        }
        meta.roster
            .insert(user.clone(), RoomMember { name: name.to_string(), rank });
        user
    }

    pub fn remove_member(&self, user: &UserId) {
        self.meta.lock().roster.remove(user);
    }

    /// Replace the whole roster (sent on room join).
    pub fn reset_roster(&self) {
        self.meta.lock().roster.clear();
    }

    /// Record a chat body in the rolling buffer, evicting the oldest entry
    /// once the buffer is full.
    pub fn note_body(&self, body: &str) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == MESSAGE_BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(body.to_string());
    }

    /// Whether the rolling buffer currently holds this exact text.
    pub fn buffer_contains(&self, text: &str) -> bool {
        self.buffer.lock().iter().any(|body| body == text)
    }
}

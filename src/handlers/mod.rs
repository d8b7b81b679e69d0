//! Protocol message handlers.
//!
//! Contains the [`Handler`] trait and the registry mapping each message
//! type to its ordered list of handlers. The registry is built once at
//! startup by [`register_builtin`] plus whatever the embedding code adds,
//! then injected into the bot; nothing registers itself at a distance.

mod chat;
mod global;
mod room_state;

pub use chat::{ChatHandler, PmHandler};
pub use global::{ChallengeHandler, UpdateUserHandler};
pub use room_state::{RoomLifecycleHandler, RosterHandler};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ps_proto::ServerMessage;

use crate::bot::Bot;
use crate::error::HandlerResult;
use crate::state::RoomState;

/// A callback invoked for every protocol message of its subscribed types.
///
/// Handlers for one message run concurrently with each other; messages
/// within one room run strictly in order (see [`crate::state`]).
#[async_trait]
pub trait Handler: Send + Sync {
    /// Message types this handler subscribes to.
    fn message_types(&self) -> &'static [&'static str];

    /// Minimum number of params a message must carry before this handler
    /// is invoked; underfilled messages are dropped before dispatch.
    fn min_params(&self) -> usize {
        0
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult;
}

/// Registry of protocol handlers, keyed by message type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under every message type it subscribes to.
    /// Handlers for one type are kept in registration order.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        for message_type in handler.message_types() {
            self.handlers
                .entry(message_type)
                .or_default()
                .push(Arc::clone(&handler));
        }
    }

    /// Handlers registered for a message type.
    pub fn get(&self, message_type: &str) -> &[Arc<dyn Handler>] {
        self.handlers
            .get(message_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct message types with at least one handler.
    pub fn type_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Register the handlers the session engine itself needs.
pub fn register_builtin(registry: &mut HandlerRegistry) {
    registry.register(Arc::new(RoomLifecycleHandler));
    registry.register(Arc::new(RosterHandler));
    registry.register(Arc::new(ChallengeHandler));
    registry.register(Arc::new(UpdateUserHandler));
    registry.register(Arc::new(ChatHandler));
    registry.register(Arc::new(PmHandler));
}

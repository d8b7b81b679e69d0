//! The context object handed to command callbacks.

use std::sync::Arc;

use ps_proto::{RoomId, UserId};
use tokio::sync::mpsc;

use crate::client::Outbound;
use crate::state::RoomState;

/// Where a command invocation is anchored: a room, or one user's PM
/// conversation. Also the key for the active-command registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Room(RoomId),
    Pm(UserId),
}

/// Everything a command callback gets to work with.
pub struct CommandContext {
    /// The invocation's target context.
    pub target: Target,
    /// Room the triggering message arrived in (`None` for PMs).
    pub room: Option<Arc<RoomState>>,
    /// For room-parametrized commands: the room being operated on. Equals
    /// `room` for in-room invocations; resolved from the first argument
    /// for PM invocations.
    pub target_room: Option<Arc<RoomState>>,
    /// Normalized id of the invoking user.
    pub user: UserId,
    /// Display name of the invoking user.
    pub user_name: String,
    /// Raw argument text after the command token.
    pub arg: String,
    /// Follow-up chat lines, present for commands that consume input.
    pub input: Option<mpsc::Receiver<String>>,
    pub(crate) outbound: Outbound,
}

impl CommandContext {
    /// The argument text split on commas, trimmed, empties dropped.
    pub fn args(&self) -> Vec<&str> {
        self.arg
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// Send a plain-text reply into the invocation's context.
    pub async fn reply(&self, text: &str) {
        match &self.target {
            Target::Room(room) => self.outbound.send_room(room, text).await,
            Target::Pm(user) => self.outbound.send_pm(user, text).await,
        }
    }

    /// Send an HTML reply into the invocation's context.
    pub async fn reply_html(&self, html: &str) {
        match &self.target {
            Target::Room(room) => {
                self.outbound
                    .send_room(room, &format!("/addhtmlbox {html}"))
                    .await;
            }
            Target::Pm(user) => {
                self.outbound
                    .send_global(&format!("/pminfobox {user},{html}"))
                    .await;
            }
        }
    }
}

//! Chat and private-message handlers: the front door of command dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use ps_proto::{ServerMessage, UserId};

use crate::bot::Bot;
use crate::commands::{self, Target};
use crate::error::HandlerResult;
use crate::handlers::Handler;
use crate::state::RoomState;

/// Room chat lines: `c:` (timestamped) and `c`.
pub struct ChatHandler;

#[async_trait]
impl Handler for ChatHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["c:", "c"]
    }

    fn min_params(&self) -> usize {
        2
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        // Chat text may contain the field separator; stitch the tail back.
        let (raw_user, text) = match msg.command() {
            "c:" => (msg.param(1).unwrap_or(""), msg.text_from(2)),
            _ => (msg.param(0).unwrap_or(""), msg.text_from(1)),
        };
        if raw_user.is_empty() || text.is_empty() {
            return Ok(());
        }

        room.note_body(&text);
        // The chat prefix reflects the speaker's current room rank.
        let user = room.upsert_member(raw_user, bot.own_id());
        bot.note_user(raw_user);

        if user == *bot.own_id() {
            return Ok(());
        }

        // Running commands that consume input see every line in their
        // context, command-shaped or not.
        bot.active
            .route_line(&Target::Room(room.id().clone()), &text);

        commands::handle_chat(bot, room, raw_user, &text).await
    }
}

/// Private messages addressed to the bot.
pub struct PmHandler;

#[async_trait]
impl Handler for PmHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["pm"]
    }

    fn min_params(&self) -> usize {
        3
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        let sender_raw = msg.param(0).unwrap_or("");
        let receiver = UserId::new(msg.param(1).unwrap_or(""));
        let text = msg.text_from(2);

        // PM sender prefixes carry the global rank.
        let sender = bot.note_global_rank(sender_raw);
        if sender == *bot.own_id() || receiver != *bot.own_id() || text.is_empty() {
            return Ok(());
        }

        bot.active.route_line(&Target::Pm(sender.clone()), &text);

        commands::handle_pm(bot, sender_raw, &text).await
    }
}

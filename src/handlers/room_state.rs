//! Handlers that keep the room registry current.

use std::sync::Arc;

use async_trait::async_trait;
use ps_proto::{ServerMessage, UserId};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::error::HandlerResult;
use crate::handlers::Handler;
use crate::state::RoomState;

/// Room lifecycle: `init`, `title`, `users`, `deinit`.
pub struct RoomLifecycleHandler;

#[async_trait]
impl Handler for RoomLifecycleHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["init", "title", "users", "deinit"]
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        match msg.command() {
            "init" => {
                // A fresh join; whatever roster we held is stale.
                room.reset_roster();
                info!(room = %room.id(), kind = msg.param(0).unwrap_or(""), "joined room");
            }
            "title" => {
                room.set_title(msg.param(0).unwrap_or(""));
            }
            "users" => {
                // Single param: "<count>,entry,entry,...".
                let list = msg.param(0).unwrap_or("");
                let own_id = bot.own_id().clone();
                room.reset_roster();
                for raw in list.split(',').skip(1) {
                    if raw.is_empty() {
                        continue;
                    }
                    let user = room.upsert_member(raw, &own_id);
                    bot.note_user(raw);
                    debug!(room = %room.id(), user = %user, "roster entry");
                }
            }
            "deinit" => {
                info!(room = %room.id(), "left room");
                bot.remove_room(room.id());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Roster churn: joins, leaves and renames.
pub struct RosterHandler;

#[async_trait]
impl Handler for RosterHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["J", "j", "join", "L", "l", "leave", "N", "n", "name"]
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        let raw = msg.param(0).unwrap_or("");
        match msg.command() {
            "J" | "j" | "join" => {
                room.upsert_member(raw, bot.own_id());
                bot.note_user(raw);
            }
            "L" | "l" | "leave" => {
                room.remove_member(&UserId::new(raw));
            }
            "N" | "n" | "name" => {
                // params: new raw name, old normalized id.
                if let Some(old) = msg.param(1) {
                    room.remove_member(&UserId::new(old));
                }
                room.upsert_member(raw, bot.own_id());
                bot.note_user(raw);
            }
            _ => {}
        }
        Ok(())
    }
}

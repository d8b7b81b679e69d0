//! Handlers for connection-level (global room) messages.

use std::sync::Arc;

use async_trait::async_trait;
use ps_proto::{ServerMessage, UserId};
use tracing::{error, info};

use crate::bot::Bot;
use crate::client::login;
use crate::error::HandlerResult;
use crate::handlers::Handler;
use crate::state::RoomState;

/// Answers the server's login challenge.
pub struct ChallengeHandler;

#[async_trait]
impl Handler for ChallengeHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["challstr"]
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        // The challenge itself contains the separator; stitch it back.
        let challenge = msg.text_from(0);
        if let Err(e) = login::answer_challenge(bot, &challenge).await {
            // Credentials that the auth endpoint keeps rejecting will not
            // get better by reconnecting.
            error!(error = %e, "login failed; shutting down");
            bot.shutdown.cancel();
            return Err(e.into());
        }
        Ok(())
    }
}

/// Reacts to login state changes: picks the avatar and joins the
/// configured rooms once the server confirms our identity.
pub struct UpdateUserHandler;

#[async_trait]
impl Handler for UpdateUserHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["updateuser"]
    }

    fn min_params(&self) -> usize {
        2
    }

    async fn handle(
        &self,
        bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        let raw_name = msg.param(0).unwrap_or("");
        let named = msg.param(1) == Some("1");
        if !named || UserId::new(raw_name) != *bot.own_id() {
            return Ok(());
        }

        bot.note_global_rank(raw_name);
        info!(name = raw_name.trim(), "logged in");

        if let Some(avatar) = &bot.config.login.avatar {
            bot.outbound.send_global(&format!("/avatar {avatar}")).await;
        }
        for block in bot.config.autojoin_rooms() {
            bot.outbound
                .send_global(&format!("/join {}", block.name))
                .await;
        }
        Ok(())
    }
}

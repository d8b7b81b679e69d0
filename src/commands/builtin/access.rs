//! Commands editing per-room command ranks.

use std::sync::Arc;

use async_trait::async_trait;
use ps_proto::Rank;

use crate::bot::Bot;
use crate::commands::{Command, CommandContext, CommandSpec};
use crate::error::{CommandError, CommandResult};

/// Override the required rank of an editable command in one room.
pub struct SetRankCommand;

const SET_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("setrank", "access");
    spec.default_rank = Rank::Owner;
    spec.room_scoped = true;
    // Room authority only: a global staffer passing through does not get
    // to rewire a room's permissions.
    spec.ignore_global_rank = true;
    spec
};

#[async_trait]
impl Command for SetRankCommand {
    fn spec(&self) -> &CommandSpec {
        &SET_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let args = ctx.args();
        let [token, rank_text] = args.as_slice() else {
            let prefix = bot.config.commands.prefix;
            ctx.reply(&format!("Usage: {prefix}setrank command, rank")).await;
            return Ok(());
        };

        let Some(command) = bot.commands.get(&token.to_lowercase()) else {
            ctx.reply("No such command.").await;
            return Ok(());
        };
        let Some(key) = command.spec().rank_key else {
            ctx.reply("That command's rank cannot be changed.").await;
            return Ok(());
        };
        let Ok(rank) = rank_text.parse::<Rank>() else {
            ctx.reply("Unrecognized rank.").await;
            return Ok(());
        };

        let room = ctx
            .target_room
            .as_ref()
            .ok_or_else(|| CommandError::Internal("room-scoped command without a room".into()))?;
        bot.db.ranks().set(room.id(), key, rank).await?;
        ctx.reply(&format!("Commands under \"{key}\" here now require rank {rank} or higher."))
            .await;
        Ok(())
    }
}

/// Restore an editable command's default rank in one room.
pub struct ResetRankCommand;

const RESET_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("resetrank", "access");
    spec.default_rank = Rank::Owner;
    spec.room_scoped = true;
    spec.ignore_global_rank = true;
    spec
};

#[async_trait]
impl Command for ResetRankCommand {
    fn spec(&self) -> &CommandSpec {
        &RESET_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let args = ctx.args();
        let [token] = args.as_slice() else {
            let prefix = bot.config.commands.prefix;
            ctx.reply(&format!("Usage: {prefix}resetrank command")).await;
            return Ok(());
        };

        let Some(command) = bot.commands.get(&token.to_lowercase()) else {
            ctx.reply("No such command.").await;
            return Ok(());
        };
        let Some(key) = command.spec().rank_key else {
            ctx.reply("That command's rank cannot be changed.").await;
            return Ok(());
        };

        let room = ctx
            .target_room
            .as_ref()
            .ok_or_else(|| CommandError::Internal("room-scoped command without a room".into()))?;
        if bot.db.ranks().clear(room.id(), key).await? {
            ctx.reply(&format!("Commands under \"{key}\" here use their default rank again."))
                .await;
        } else {
            ctx.reply("No override was set here.").await;
        }
        Ok(())
    }
}

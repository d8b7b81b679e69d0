//! Commands managing repeat jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use ps_proto::Rank;

use crate::bot::Bot;
use crate::commands::{Command, CommandContext, CommandSpec};
use crate::error::{CommandError, CommandResult};
use crate::repeats::{self, Repeat, expiry_for_iterations};

/// Schedule a recurring broadcast in a room.
pub struct RepeatCommand;

const REPEAT_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("repeat", "repeats");
    spec.aliases = &["addrepeat"];
    spec.default_rank = Rank::Driver;
    spec.rank_key = Some("repeat");
    spec.room_scoped = true;
    spec
};

#[async_trait]
impl Command for RepeatCommand {
    fn spec(&self) -> &CommandSpec {
        &REPEAT_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let args = ctx.args();
        if args.len() < 2 {
            ctx.reply(&usage(&bot)).await;
            return Ok(());
        }

        let message = args[0].to_string();
        let Ok(minutes) = args[1].parse::<u64>() else {
            ctx.reply(&usage(&bot)).await;
            return Ok(());
        };
        if minutes == 0 {
            ctx.reply("The interval must be at least one minute.").await;
            return Ok(());
        }

        let interval = Duration::from_secs(minutes * 60);
        let created_at = Utc::now();

        // Optional expiry: a max iteration count and/or an end date; with
        // both, the job runs until the later of the two.
        let mut from_iterations: Option<DateTime<Utc>> = None;
        let mut from_date: Option<DateTime<Utc>> = None;
        for extra in &args[2..] {
            if let Ok(iterations) = extra.parse::<u32>() {
                if iterations == 0 {
                    ctx.reply("The iteration count must be positive.").await;
                    return Ok(());
                }
                from_iterations = Some(expiry_for_iterations(created_at, interval, iterations));
            } else if let Ok(date) = NaiveDate::parse_from_str(extra, "%Y-%m-%d") {
                let midnight = date.and_time(NaiveTime::MIN);
                from_date = Some(DateTime::from_naive_utc_and_offset(midnight, Utc));
            } else {
                ctx.reply(&format!("Unrecognized expiry \"{extra}\"; use a count or YYYY-MM-DD."))
                    .await;
                return Ok(());
            }
        }
        let expires_at = match (from_date, from_iterations) {
            (Some(date), Some(iterations)) => Some(date.max(iterations)),
            (date, iterations) => date.or(iterations),
        };

        let room = ctx
            .target_room
            .as_ref()
            .ok_or_else(|| CommandError::Internal("room-scoped command without a room".into()))?;

        let repeat = Repeat {
            room: room.id().clone(),
            message,
            interval,
            created_at,
            expires_at,
        };
        repeats::start(&bot, repeat).await?;
        ctx.reply("Repeat scheduled.").await;
        Ok(())
    }
}

/// Stop a repeat job and delete its persisted definition.
pub struct StopRepeatCommand;

const STOP_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("stoprepeat", "repeats");
    spec.aliases = &["unrepeat"];
    spec.default_rank = Rank::Driver;
    spec.rank_key = Some("repeat");
    spec.room_scoped = true;
    spec
};

#[async_trait]
impl Command for StopRepeatCommand {
    fn spec(&self) -> &CommandSpec {
        &STOP_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let message = ctx.arg.trim();
        if message.is_empty() {
            let prefix = bot.config.commands.prefix;
            ctx.reply(&format!("Usage: {prefix}stoprepeat message")).await;
            return Ok(());
        }
        let room = ctx
            .target_room
            .as_ref()
            .ok_or_else(|| CommandError::Internal("room-scoped command without a room".into()))?;

        if repeats::cancel(&bot, room.id(), message).await? {
            ctx.reply("Repeat stopped.").await;
        } else {
            ctx.reply("No repeat with that message is running here.").await;
        }
        Ok(())
    }
}

/// List the repeat jobs running in a room.
pub struct ListRepeatsCommand;

const LIST_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("repeats", "repeats");
    spec.default_rank = Rank::Driver;
    spec.rank_key = Some("repeat");
    spec.room_scoped = true;
    spec
};

#[async_trait]
impl Command for ListRepeatsCommand {
    fn spec(&self) -> &CommandSpec {
        &LIST_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let room = ctx
            .target_room
            .as_ref()
            .ok_or_else(|| CommandError::Internal("room-scoped command without a room".into()))?;

        let jobs = bot.repeats.list(room.id());
        if jobs.is_empty() {
            ctx.reply("No repeats are running here.").await;
            return Ok(());
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|job| {
                format!("\"{}\" every {} min", job.message, job.interval.as_secs() / 60)
            })
            .collect();
        ctx.reply(&lines.join("; ")).await;
        Ok(())
    }
}

fn usage(bot: &Bot) -> String {
    let prefix = bot.config.commands.prefix;
    format!("Usage: {prefix}repeat message, minutes[, count or YYYY-MM-DD]")
}

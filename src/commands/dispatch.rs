//! Command recognition, permission resolution, and dispatch.

use std::sync::Arc;

use ps_proto::{Rank, RoomId, UserId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bot::Bot;
use crate::commands::{CommandContext, PmPolicy, Target};
use crate::error::HandlerResult;
use crate::state::RoomState;

/// The one denial sent for every PM-side refusal: insufficient rank, an
/// unknown room, or a room the invoker is not inside. Identical on purpose,
/// so a probe cannot learn which check failed.
const ACCESS_DENIED_REPLY: &str = "You are not allowed to do that.";

/// Capacity of the follow-up line channel for input-consuming commands.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Entry point for room chat lines.
pub async fn handle_chat(
    bot: &Arc<Bot>,
    room: &Arc<RoomState>,
    raw_user: &str,
    text: &str,
) -> HandlerResult {
    let Some(body) = text.strip_prefix(bot.config.commands.prefix) else {
        return Ok(());
    };
    dispatch(bot, Origin::Room(Arc::clone(room)), raw_user, body).await
}

/// Entry point for private-message lines.
pub async fn handle_pm(bot: &Arc<Bot>, raw_user: &str, text: &str) -> HandlerResult {
    let prefix = bot.config.commands.prefix;
    match text.strip_prefix(prefix) {
        Some(body) => dispatch(bot, Origin::Pm, raw_user, body).await,
        None => {
            // Raw protocol commands pasted into the PM window are not ours
            // to answer; anything else gets pointed at the command table.
            if !text.starts_with('/') && !text.starts_with('!') {
                let user = UserId::new(raw_user);
                bot.outbound
                    .send_pm(&user, &format!("Hi! I only speak commands; try {prefix}help."))
                    .await;
            }
            Ok(())
        }
    }
}

enum Origin {
    Room(Arc<RoomState>),
    Pm,
}

async fn dispatch(bot: &Arc<Bot>, origin: Origin, raw_user: &str, body: &str) -> HandlerResult {
    let mut parts = body.splitn(2, char::is_whitespace);
    let token = parts.next().unwrap_or("").to_lowercase();
    let mut arg = parts.next().unwrap_or("").trim().to_string();
    let user = UserId::new(raw_user);
    let is_pm = matches!(origin, Origin::Pm);

    let Some(command) = bot.commands.get(&token) else {
        if is_pm && !token.is_empty() {
            bot.outbound.send_pm(&user, "Invalid command.").await;
        }
        return Ok(());
    };
    let spec = command.spec().clone();

    if is_pm && spec.pm == PmPolicy::Never {
        bot.outbound
            .send_pm(&user, "That command cannot be used in private messages.")
            .await;
        return Ok(());
    }

    // Effective required rank: the static default, replaced by the room's
    // persisted override (editable commands, room invocations only), then
    // by the PM-specific rank for PM invocations.
    let mut required = spec.default_rank;
    if let (Origin::Room(room), Some(key)) = (&origin, spec.rank_key) {
        if let Some(rank) = bot.db.ranks().get(room.id(), key).await? {
            required = rank;
        }
    }
    if is_pm && let PmPolicy::Rank(rank) = spec.pm {
        required = rank;
    }

    // Room-parametrized commands invoked from PM name their room as the
    // first argument; the bot and the invoker must both be inside it.
    let target_room = if spec.room_scoped {
        match &origin {
            Origin::Room(room) => Some(Arc::clone(room)),
            Origin::Pm => {
                let (first, rest) = split_first_arg(&arg);
                let resolved = first
                    .and_then(|name| bot.get_room(&RoomId::new(name)))
                    .filter(|room| room.contains(&user));
                match resolved {
                    Some(room) => {
                        arg = rest;
                        Some(room)
                    }
                    None => {
                        bot.outbound.send_pm(&user, ACCESS_DENIED_REPLY).await;
                        return Ok(());
                    }
                }
            }
        }
    } else {
        None
    };

    // The invoker's rank: their rank in the relevant room, lifted by the
    // global rank unless the command opts out of that.
    let rank_room = target_room.as_ref().or(match &origin {
        Origin::Room(room) => Some(room),
        Origin::Pm => None,
    });
    let mut invoker_rank = rank_room
        .and_then(|room| room.member_rank(&user))
        .unwrap_or_default();
    if !spec.ignore_global_rank && let Some(entry) = bot.users.get(&user) {
        invoker_rank = invoker_rank.max(entry.global_rank);
    }
    if invoker_rank < required {
        // Silent in rooms; an explicit denial over PM.
        if is_pm {
            bot.outbound.send_pm(&user, ACCESS_DENIED_REPLY).await;
        }
        return Ok(());
    }

    let target = match &origin {
        Origin::Room(room) => Target::Room(room.id().clone()),
        Origin::Pm => Target::Pm(user.clone()),
    };

    if spec.single_instance && bot.active.is_running(&target, spec.name) {
        debug!(command = spec.name, "instance already active for target; dropping");
        return Ok(());
    }

    let (input_tx, input_rx) = if spec.consumes_input {
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    let entry_id = bot.active.insert(target.clone(), spec.name, input_tx);

    let ctx = CommandContext {
        target: target.clone(),
        room: match &origin {
            Origin::Room(room) => Some(Arc::clone(room)),
            Origin::Pm => None,
        },
        target_room,
        user: user.clone(),
        user_name: display_name(raw_user),
        arg,
        input: input_rx,
        outbound: bot.outbound.clone(),
    };

    let task_bot = Arc::clone(bot);
    bot.conn_tasks().spawn(async move {
        let _guard = ActiveGuard {
            bot: Arc::clone(&task_bot),
            target,
            id: entry_id,
        };
        if let Err(e) = command.run(Arc::clone(&task_bot), ctx).await {
            warn!(command = command.spec().name, error = %e, "command failed");
        }
    });

    Ok(())
}

/// Removes the active-command entry when the task ends, on the
/// cancellation path exactly as on normal completion.
struct ActiveGuard {
    bot: Arc<Bot>,
    target: Target,
    id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.bot.active.remove(&self.target, self.id);
    }
}

fn split_first_arg(arg: &str) -> (Option<&str>, String) {
    let mut parts = arg.splitn(2, ',');
    let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let rest = parts.next().map(str::trim).unwrap_or("").to_string();
    (first, rest)
}

fn display_name(raw: &str) -> String {
    let (_, name) = Rank::split(raw.trim());
    name.split('@').next().unwrap_or(name).to_string()
}

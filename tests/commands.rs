//! Integration tests for command dispatch and permission resolution.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ps_proto::{Rank, RoomId};
use psbot::bot::Bot;
use psbot::commands::{
    self, Command, CommandContext, CommandRegistry, CommandSpec, PmPolicy, Target,
};
use psbot::error::CommandResult;
use psbot::handlers::HandlerRegistry;

type Log = Arc<Mutex<Vec<String>>>;

/// Records each run as `target_room_or_pm/arg`.
struct Probe {
    spec: CommandSpec,
    runs: Log,
}

impl Probe {
    fn new(spec: CommandSpec) -> (Arc<Probe>, Log) {
        let runs: Log = Arc::default();
        (Arc::new(Probe { spec, runs: Arc::clone(&runs) }), runs)
    }
}

#[async_trait]
impl Command for Probe {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, _bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let place = match ctx.target_room.as_ref() {
            Some(room) => room.id().to_string(),
            None => "pm".to_string(),
        };
        self.runs.lock().push(format!("{place}/{}", ctx.arg));
        Ok(())
    }
}

fn probe_spec() -> CommandSpec {
    let mut spec = CommandSpec::new("probe", "test");
    spec.default_rank = Rank::Driver;
    spec.rank_key = Some("probe");
    spec.room_scoped = true;
    spec
}

async fn bot_with(command: Arc<dyn Command>) -> (Arc<Bot>, tokio::sync::mpsc::Receiver<psbot::client::OutboundLine>) {
    let mut registry = CommandRegistry::new();
    registry.register(command).unwrap();
    common::spawn_bot(HandlerRegistry::new(), registry).await
}

#[tokio::test]
async fn default_rank_gates_room_invocations() {
    let (probe, runs) = Probe::new(probe_spec());
    let (bot, _rx) = bot_with(probe).await;

    let room = bot.room(&RoomId::new("bot-dev"));
    room.upsert_member("+Voice User", bot.own_id());
    room.upsert_member("%Driver Dude", bot.own_id());

    // Below the required rank: a silent no-op.
    commands::handle_chat(&bot, &room, "+Voice User", ".probe nope").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(runs.lock().is_empty());

    commands::handle_chat(&bot, &room, "%Driver Dude", ".probe yes").await.unwrap();
    common::wait_until(|| runs.lock().len() == 1).await;
    assert_eq!(runs.lock()[0], "bot-dev/yes");
}

#[tokio::test]
async fn room_override_applies_to_that_room_only() {
    let (probe, runs) = Probe::new(probe_spec());
    let (bot, _rx) = bot_with(probe).await;

    let here = bot.room(&RoomId::new("here"));
    let there = bot.room(&RoomId::new("there"));
    here.upsert_member("+Voice User", bot.own_id());
    there.upsert_member("+Voice User", bot.own_id());

    bot.db.ranks().set(here.id(), "probe", Rank::Voice).await.unwrap();

    commands::handle_chat(&bot, &here, "+Voice User", ".probe lowered").await.unwrap();
    common::wait_until(|| runs.lock().len() == 1).await;
    assert_eq!(runs.lock()[0], "here/lowered");

    // The same user in the other room still hits the default rank.
    commands::handle_chat(&bot, &there, "+Voice User", ".probe still-denied").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.lock().len(), 1);
}

#[tokio::test]
async fn pm_rank_replaces_the_room_resolved_rank() {
    let mut spec = probe_spec();
    spec.room_scoped = false;
    spec.pm = PmPolicy::Rank(Rank::Owner);
    let (probe, runs) = Probe::new(spec);
    let (bot, mut rx) = bot_with(probe).await;

    // Global voice is enough for nothing here: PM invocations require
    // the PM-specific rank, overrides notwithstanding.
    bot.note_global_rank("+Voice User");
    commands::handle_pm(&bot, "+Voice User", ".probe denied").await.unwrap();
    let denial = common::recv_line(&mut rx).await;
    assert!(denial.starts_with("|/pm voiceuser,"));
    assert!(runs.lock().is_empty());

    bot.note_global_rank("#Big Boss");
    commands::handle_pm(&bot, "#Big Boss", ".probe granted").await.unwrap();
    common::wait_until(|| runs.lock().len() == 1).await;
    assert_eq!(runs.lock()[0], "pm/granted");
}

#[tokio::test]
async fn pm_room_parametrized_resolution_and_uniform_denial() {
    let mut spec = probe_spec();
    spec.default_rank = Rank::Normal;
    let (probe, runs) = Probe::new(spec);
    let (bot, mut rx) = bot_with(probe).await;

    let room = bot.room(&RoomId::new("bot-dev"));
    room.upsert_member(" Insider", bot.own_id());

    // Inside the named room: the room becomes the command's target and
    // the room argument is consumed.
    commands::handle_pm(&bot, " Insider", ".probe bot-dev, tail").await.unwrap();
    common::wait_until(|| runs.lock().len() == 1).await;
    assert_eq!(runs.lock()[0], "bot-dev/tail");

    // Not in the room vs. no such room: byte-identical denials.
    commands::handle_pm(&bot, " Outsider", ".probe bot-dev, tail").await.unwrap();
    let denial_member = common::recv_line(&mut rx).await;
    commands::handle_pm(&bot, " Outsider", ".probe no-such-room, tail").await.unwrap();
    let denial_room = common::recv_line(&mut rx).await;
    let strip = |line: &str| line.split_once(',').map(|(_, tail)| tail.to_string()).unwrap();
    assert_eq!(strip(&denial_member), strip(&denial_room));
    assert_eq!(runs.lock().len(), 1);
}

/// Counts starts, then blocks long enough to overlap a second invocation.
struct SlowStarter {
    spec: CommandSpec,
    starts: Arc<Mutex<u32>>,
}

#[async_trait]
impl Command for SlowStarter {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, _bot: Arc<Bot>, _ctx: CommandContext) -> CommandResult {
        *self.starts.lock() += 1;
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test]
async fn single_instance_commands_drop_concurrent_reentry() {
    let starts = Arc::new(Mutex::new(0u32));
    let mut spec = CommandSpec::new("once", "test");
    spec.single_instance = true;
    let mut registry = CommandRegistry::new();
    registry
        .register(Arc::new(SlowStarter { spec, starts: Arc::clone(&starts) }))
        .unwrap();
    let (bot, _rx) = common::spawn_bot(HandlerRegistry::new(), registry).await;

    let room = bot.room(&RoomId::new("bot-dev"));
    room.upsert_member(" Someone", bot.own_id());

    commands::handle_chat(&bot, &room, " Someone", ".once").await.unwrap();
    commands::handle_chat(&bot, &room, " Someone", ".once").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*starts.lock(), 1);

    // Once the first instance finishes, the command is invokable again.
    common::wait_until(|| bot.active.count(&Target::Room(RoomId::new("bot-dev"))) == 0).await;
    commands::handle_chat(&bot, &room, " Someone", ".once").await.unwrap();
    common::wait_until(|| *starts.lock() == 2).await;
}

/// Collects the follow-up lines routed to it.
struct LineCollector {
    spec: CommandSpec,
    lines: Log,
}

#[async_trait]
impl Command for LineCollector {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, _bot: Arc<Bot>, mut ctx: CommandContext) -> CommandResult {
        let mut input = ctx.input.take().expect("consumes_input command gets a receiver");
        while let Some(line) = input.recv().await {
            if line == "done" {
                break;
            }
            self.lines.lock().push(line);
        }
        Ok(())
    }
}

#[tokio::test]
async fn long_running_commands_consume_follow_up_lines() {
    let lines: Log = Arc::default();
    let mut spec = CommandSpec::new("collect", "test");
    spec.consumes_input = true;
    spec.single_instance = true;
    let mut registry = CommandRegistry::new();
    registry
        .register(Arc::new(LineCollector { spec, lines: Arc::clone(&lines) }))
        .unwrap();
    let (bot, _rx) = common::spawn_bot(HandlerRegistry::new(), registry).await;

    let room = bot.room(&RoomId::new("bot-dev"));
    room.upsert_member(" Someone", bot.own_id());
    let target = Target::Room(RoomId::new("bot-dev"));

    commands::handle_chat(&bot, &room, " Someone", ".collect").await.unwrap();
    common::wait_until(|| bot.active.count(&target) == 1).await;

    bot.active.route_line(&target, "first");
    bot.active.route_line(&target, "second");
    common::wait_until(|| lines.lock().len() == 2).await;

    bot.active.route_line(&target, "done");
    common::wait_until(|| bot.active.count(&target) == 0).await;
    assert_eq!(lines.lock().clone(), ["first", "second"]);
}

#[tokio::test]
async fn pm_replies_for_unknown_and_non_command_lines() {
    let (bot, mut rx) = common::spawn_default_bot().await;

    commands::handle_pm(&bot, " Someone", ".nosuchcommand").await.unwrap();
    assert_eq!(common::recv_line(&mut rx).await, "|/pm someone,Invalid command.");

    // Plain chatter gets pointed at the command table...
    commands::handle_pm(&bot, " Someone", "hello there").await.unwrap();
    let info = common::recv_line(&mut rx).await;
    assert!(info.contains("help"));

    // ...while raw protocol commands are ignored outright.
    commands::handle_pm(&bot, " Someone", "/me waves").await.unwrap();
    commands::handle_pm(&bot, " Someone", ".uptime").await.unwrap();
    let next = common::recv_line(&mut rx).await;
    assert!(next.starts_with("|/pm someone,Up for"));
}

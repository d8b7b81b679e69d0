//! Integration tests for the per-room dispatch queue.
//!
//! Ordering within a room, independence across rooms, concurrent handler
//! fan-out, and cancellation-safe bookkeeping.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ps_proto::{RoomId, ServerMessage};
use psbot::bot::Bot;
use psbot::commands::CommandRegistry;
use psbot::error::HandlerResult;
use psbot::handlers::{Handler, HandlerRegistry};
use psbot::state::{self, RoomState};

type Log = Arc<Mutex<Vec<String>>>;

/// Records `room:label`, optionally sleeping first (param 1, millis).
struct SleepyRecorder {
    log: Log,
}

#[async_trait]
impl Handler for SleepyRecorder {
    fn message_types(&self) -> &'static [&'static str] {
        &["note"]
    }

    async fn handle(
        &self,
        _bot: &Arc<Bot>,
        room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        if let Some(ms) = msg.param(1).and_then(|s| s.parse::<u64>().ok()) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.log
            .lock()
            .push(format!("{}:{}", room.id(), msg.param(0).unwrap_or("")));
        Ok(())
    }
}

/// Never returns: simulates a wedged handler.
struct StallHandler;

#[async_trait]
impl Handler for StallHandler {
    fn message_types(&self) -> &'static [&'static str] {
        &["stall"]
    }

    async fn handle(
        &self,
        _bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        _msg: &ServerMessage,
    ) -> HandlerResult {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn note(label: &str, delay_ms: u64) -> ServerMessage {
    ServerMessage::new("note", vec![label.to_string(), delay_ms.to_string()])
}

#[tokio::test]
async fn messages_in_one_room_are_handled_in_arrival_order() {
    let log: Log = Arc::default();
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(SleepyRecorder { log: Arc::clone(&log) }));
    let (bot, _rx) = common::spawn_bot(handlers, CommandRegistry::new()).await;

    let room = bot.room(&RoomId::new("alpha"));
    // Decreasing delays: out-of-order handling would reverse the log.
    for (i, delay) in [50u64, 40, 30, 20, 10].into_iter().enumerate() {
        state::enqueue(&bot, &room, note(&i.to_string(), delay));
    }

    common::wait_until(|| log.lock().len() == 5).await;
    let entries = log.lock().clone();
    assert_eq!(entries, ["alpha:0", "alpha:1", "alpha:2", "alpha:3", "alpha:4"]);
}

#[tokio::test]
async fn a_wedged_room_does_not_delay_other_rooms() {
    let log: Log = Arc::default();
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(SleepyRecorder { log: Arc::clone(&log) }));
    handlers.register(Arc::new(StallHandler));
    let (bot, _rx) = common::spawn_bot(handlers, CommandRegistry::new()).await;

    let stuck = bot.room(&RoomId::new("stuck"));
    let lively = bot.room(&RoomId::new("lively"));

    state::enqueue(&bot, &stuck, ServerMessage::new("stall", vec![]));
    state::enqueue(&bot, &stuck, note("never", 0));
    for i in 0..3 {
        state::enqueue(&bot, &lively, note(&i.to_string(), 0));
    }

    common::wait_until(|| log.lock().len() == 3).await;
    let entries = log.lock().clone();
    assert_eq!(entries, ["lively:0", "lively:1", "lively:2"]);
    // The message behind the wedged one never ran.
    assert!(!entries.iter().any(|e| e.ends_with(":never")));
}

/// Two handlers on one type: a fast one and a slow one.
struct FastRecorder {
    log: Log,
}

#[async_trait]
impl Handler for FastRecorder {
    fn message_types(&self) -> &'static [&'static str] {
        &["both"]
    }

    async fn handle(
        &self,
        _bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        self.log
            .lock()
            .push(format!("fast:{}", msg.param(0).unwrap_or("")));
        Ok(())
    }
}

struct SlowRecorder {
    log: Log,
}

#[async_trait]
impl Handler for SlowRecorder {
    fn message_types(&self) -> &'static [&'static str] {
        &["both"]
    }

    async fn handle(
        &self,
        _bot: &Arc<Bot>,
        _room: &Arc<RoomState>,
        msg: &ServerMessage,
    ) -> HandlerResult {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.log
            .lock()
            .push(format!("slow:{}", msg.param(0).unwrap_or("")));
        Ok(())
    }
}

#[tokio::test]
async fn handlers_for_one_message_run_concurrently_but_gate_the_next() {
    let log: Log = Arc::default();
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(SlowRecorder { log: Arc::clone(&log) }));
    handlers.register(Arc::new(FastRecorder { log: Arc::clone(&log) }));
    let (bot, _rx) = common::spawn_bot(handlers, CommandRegistry::new()).await;

    let room = bot.room(&RoomId::new("alpha"));
    state::enqueue(&bot, &room, ServerMessage::new("both", vec!["1".to_string()]));
    state::enqueue(&bot, &room, ServerMessage::new("both", vec!["2".to_string()]));

    common::wait_until(|| log.lock().len() == 4).await;
    let entries = log.lock().clone();
    // Within a message the fast handler finishes before the slow one (they
    // run concurrently); the second message starts only after the first
    // message's full handler set finished.
    assert_eq!(entries, ["fast:1", "slow:1", "fast:2", "slow:2"]);
}

#[tokio::test]
async fn cancellation_does_not_wedge_the_queue() {
    let log: Log = Arc::default();
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(SleepyRecorder { log: Arc::clone(&log) }));
    handlers.register(Arc::new(StallHandler));
    let (bot, _rx) = common::spawn_bot(handlers, CommandRegistry::new()).await;

    let room = bot.room(&RoomId::new("alpha"));
    state::enqueue(&bot, &room, ServerMessage::new("stall", vec![]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Socket loss: the consumer is cancelled mid-handler. The queue's
    // bookkeeping must recover so a fresh consumer can be spawned.
    bot.reset_conn_scope().await;

    state::enqueue(&bot, &room, note("after", 0));
    common::wait_until(|| log.lock().len() == 1).await;
    assert_eq!(log.lock().clone(), ["alpha:after"]);
}

//! Per-room dispatch queue.
//!
//! Each room processes its messages strictly one at a time, in arrival
//! order, while different rooms progress independently. The consumer task
//! is created lazily on the first enqueue and tears itself down once the
//! queue drains; a later enqueue re-creates it.

use std::sync::Arc;

use futures_util::future::join_all;
use ps_proto::ServerMessage;
use tracing::{debug, error};

use crate::bot::Bot;
use crate::state::room::RoomState;

/// Append a message to the room's queue, spawning the consumer if the
/// room does not have one running.
pub fn enqueue(bot: &Arc<Bot>, room: &Arc<RoomState>, msg: ServerMessage) {
    let spawn_consumer = {
        let mut queue = room.queue.lock();
        queue.items.push_back(msg);
        if queue.running {
            false
        } else {
            queue.running = true;
            true
        }
    };

    if spawn_consumer {
        debug!(room = %room.id(), "starting room consumer");
        let bot = Arc::clone(bot);
        let room = Arc::clone(room);
        bot.conn_tasks().spawn(consume(bot.clone(), room));
    }
}

/// Clears the room's `running` flag when the consumer ends for any reason.
///
/// The normal exit path clears the flag under the queue lock itself; this
/// guard exists for the cancellation path, where the consumer future is
/// dropped mid-message and would otherwise strand the flag set.
struct ConsumerGuard {
    room: Arc<RoomState>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.room.queue.lock().running = false;
    }
}

async fn consume(bot: Arc<Bot>, room: Arc<RoomState>) {
    let _guard = ConsumerGuard { room: Arc::clone(&room) };

    loop {
        let msg = {
            let mut queue = room.queue.lock();
            match queue.items.pop_front() {
                Some(msg) => msg,
                None => {
                    // Exit decision and flag clear must be one atomic step,
                    // or a concurrent enqueue would see a live consumer that
                    // is about to die.
                    queue.running = false;
                    break;
                }
            }
        };

        dispatch_one(&bot, &room, &msg).await;
    }
}

/// Fan one message out to every handler registered for its type.
///
/// Handlers for the same message run concurrently; the consumer waits for
/// the full set before dequeuing the next message. A failing handler is
/// logged and never takes the others down with it.
async fn dispatch_one(bot: &Arc<Bot>, room: &Arc<RoomState>, msg: &ServerMessage) {
    let handlers = bot.handlers.get(msg.command());
    if handlers.is_empty() {
        return;
    }

    let invocations = handlers.iter().filter_map(|handler| {
        if msg.params().len() < handler.min_params() {
            debug!(room = %room.id(), command = msg.command(), "dropping underfilled message");
            return None;
        }
        let handler = Arc::clone(handler);
        Some(async move {
            if let Err(e) = handler.handle(bot, room, msg).await {
                error!(room = %room.id(), command = msg.command(), error = %e, "handler failed");
            }
        })
    });

    join_all(invocations).await;
}

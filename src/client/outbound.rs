//! Outbound send path.
//!
//! Everything the bot says goes through one channel drained by the
//! connection's event loop, which enforces the upstream flood limit
//! (one send per [`MIN_SEND_INTERVAL`], per connection). Senders are
//! cheap clones handed to handlers, commands, and the repeat scheduler.

use std::time::Duration;

use ps_proto::{RoomId, UserId};
use tokio::sync::mpsc;
use tracing::warn;

/// Minimum spacing between outbound sends.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// One raw line destined for the server, in `room|text` wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine(pub String);

/// Cloneable handle to the outbound channel.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<OutboundLine>,
}

impl Outbound {
    /// Create the channel; the receiver goes to the connection event loop.
    pub fn channel(capacity: usize) -> (Outbound, mpsc::Receiver<OutboundLine>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Outbound { tx }, rx)
    }

    /// Send chat text (or a `/command`) into a room.
    pub async fn send_room(&self, room: &RoomId, text: &str) {
        self.send_raw(format!("{room}|{text}")).await;
    }

    /// Send a command in the global context.
    pub async fn send_global(&self, text: &str) {
        self.send_raw(format!("|{text}")).await;
    }

    /// Send a private message to a user.
    pub async fn send_pm(&self, user: &UserId, text: &str) {
        self.send_global(&format!("/pm {user},{text}")).await;
    }

    /// Queue one raw line. Lines queued while the process is shutting
    /// down have nowhere to go and are dropped.
    pub async fn send_raw(&self, line: String) {
        if self.tx.send(OutboundLine(line)).await.is_err() {
            warn!("outbound channel closed; dropping line");
        }
    }
}

//! Connection lifecycle: dialing, the event loop, and reconnect backoff.
//!
//! The manager owns the websocket. Startup runs the init tiers once and
//! spawns the background tasks; after that it dials in a loop, runs one
//! event loop per connection, and on socket loss cancels the connection
//! scope and retries with exponential backoff. A process termination
//! signal closes the socket gracefully and winds everything down.

mod init;
pub(crate) mod login;
mod outbound;

pub use login::LoginError;
pub use outbound::{MIN_SEND_INTERVAL, Outbound, OutboundLine};

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::bot::Bot;

/// A connection must stay live this long before the backoff resets; only
/// rapid repeated failures escalate the delay.
const LIVE_RESET_THRESHOLD: Duration = Duration::from_secs(60);

/// Exponential reconnect backoff: 2^n seconds, capped at 2^12 (~68 min).
#[derive(Debug, Default)]
pub struct Backoff {
    failures: u32,
}

impl Backoff {
    const MAX_EXPONENT: u32 = 12;

    /// Delay before the next attempt after one more consecutive failure.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = (self.failures + 1).min(Self::MAX_EXPONENT);
        Duration::from_secs(1 << self.failures)
    }

    /// Called once a connection has proven itself live.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// How one connection attempt ended.
enum SessionEnd {
    /// Socket failed or the server closed it; retry after backoff.
    Lost,
    /// The process is shutting down.
    Shutdown,
}

/// The connection lifecycle manager.
pub struct Connection {
    bot: Arc<Bot>,
    outbound_rx: mpsc::Receiver<OutboundLine>,
    backoff: Backoff,
}

impl Connection {
    pub fn new(bot: Arc<Bot>, outbound_rx: mpsc::Receiver<OutboundLine>) -> Self {
        Self { bot, outbound_rx, backoff: Backoff::default() }
    }

    /// Run until the process shutdown signal fires. Init-task failures
    /// propagate and abort startup.
    pub async fn run(mut self) -> anyhow::Result<()> {
        init::run_init_tasks(init::init_tasks(&self.bot)).await?;
        init::spawn_recurring(&self.bot);

        loop {
            if self.bot.shutdown.is_cancelled() {
                break;
            }
            match self.connect_once().await {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost => {
                    // Everything spawned through the connection scope dies
                    // with the socket; queued room messages are picked up
                    // again by fresh consumers on the next connection.
                    self.bot.reset_conn_scope().await;
                    let delay = self.backoff.next_delay();
                    warn!(delay_secs = delay.as_secs(), "connection lost; retrying");
                    tokio::select! {
                        _ = self.bot.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // Graceful teardown: connection tasks first, then background work.
        self.bot.shutdown.cancel();
        self.bot.reset_conn_scope().await;
        self.bot.lifetime.close();
        self.bot.lifetime.wait().await;
        info!("shutdown complete");
        Ok(())
    }

    async fn connect_once(&mut self) -> SessionEnd {
        let url = self.bot.config.server.url.clone();
        info!(url = %url, "dialing server");

        let (ws, _response) = match connect_async(url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "failed to connect");
                return SessionEnd::Lost;
            }
        };
        info!("connected");
        let connected_at = Instant::now();
        let (mut sink, mut stream) = ws.split();
        let mut last_send: Option<Instant> = None;

        let end = loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(frame))) => {
                        self.bot.ingest_frame(&frame);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("server closed the connection");
                        break SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {
                        // Binary and ping/pong frames; the transport
                        // answers pings itself.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break SessionEnd::Lost;
                    }
                },

                line = self.outbound_rx.recv() => match line {
                    Some(OutboundLine(line)) => {
                        // Flood limit: space sends at least MIN_SEND_INTERVAL
                        // apart, per connection.
                        if let Some(previous) = last_send {
                            let next_allowed = previous + MIN_SEND_INTERVAL;
                            tokio::time::sleep_until(next_allowed).await;
                        }
                        debug!(line = %line, "send");
                        if let Err(e) = sink.send(WsMessage::Text(line)).await {
                            warn!(error = %e, "websocket write error");
                            break SessionEnd::Lost;
                        }
                        last_send = Some(Instant::now());
                    }
                    // All senders gone; nothing left to do but stop.
                    None => break SessionEnd::Shutdown,
                },

                _ = self.bot.shutdown.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
            }
        };

        if connected_at.elapsed() > LIVE_RESET_THRESHOLD {
            self.backoff.reset();
        }
        end
    }
}

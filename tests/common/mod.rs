//! Integration test common infrastructure.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use psbot::bot::Bot;
use psbot::client::OutboundLine;
use psbot::commands::{self, CommandRegistry};
use psbot::config::Config;
use psbot::db::Database;
use psbot::handlers::{self, HandlerRegistry};
use tokio::sync::mpsc;

/// A config pointing nowhere; the tests never dial out.
pub fn test_config() -> Config {
    toml::from_str(
        r#"
        [server]
        url = "wss://chat.example.net/websocket"

        [login]
        username = "TestBot"
        password = "hunter2"

        [[rooms]]
        name = "bot-dev"
        "#,
    )
    .expect("test config parses")
}

/// Build a bot over an in-memory database with the given registries.
/// Returns the outbound receiver so tests can assert on sent lines.
pub async fn spawn_bot(
    handlers: HandlerRegistry,
    commands: CommandRegistry,
) -> (Arc<Bot>, mpsc::Receiver<OutboundLine>) {
    let db = Database::new(":memory:").await.expect("in-memory database");
    Bot::new(test_config(), db, handlers, commands)
}

/// A bot wired with the builtin handlers and commands.
pub async fn spawn_default_bot() -> (Arc<Bot>, mpsc::Receiver<OutboundLine>) {
    let mut handler_registry = HandlerRegistry::new();
    handlers::register_builtin(&mut handler_registry);
    let mut command_registry = CommandRegistry::new();
    commands::builtin::register_all(&mut command_registry).expect("builtins register");
    spawn_bot(handler_registry, command_registry).await
}

/// Poll until `condition` holds or the timeout elapses.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within timeout"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receive the next outbound line, failing the test if none arrives.
pub async fn recv_line(rx: &mut mpsc::Receiver<OutboundLine>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an outbound line")
        .expect("outbound channel closed")
        .0
}

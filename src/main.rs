//! psbot - persistent room bot.

use std::sync::Arc;

use psbot::bot::Bot;
use psbot::client::Connection;
use psbot::commands::{self, CommandRegistry};
use psbot::config::Config;
use psbot::db::Database;
use psbot::handlers::{self, HandlerRegistry};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Single-threaded scheduler: the dispatch path relies on task
// interleaving, never on parallelism.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.url,
        user = %config.login.username,
        rooms = config.rooms.len(),
        "Starting psbot"
    );

    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.as_str())
        .unwrap_or("psbot.db");
    let db = Database::new(db_path).await?;

    // Every handler and command is registered here, explicitly, before
    // the bot exists; nothing discovers itself at runtime.
    let mut handler_registry = HandlerRegistry::new();
    handlers::register_builtin(&mut handler_registry);

    let mut command_registry = CommandRegistry::new();
    commands::builtin::register_all(&mut command_registry)?;

    let (bot, outbound_rx) = Bot::new(config, db, handler_registry, command_registry);

    // Propagate the termination signal as a cancellation so every tracked
    // task winds down before exit.
    {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                bot.shutdown.cancel();
            }
        });
    }

    Connection::new(bot, outbound_rx).run().await
}

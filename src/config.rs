//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream server endpoints.
    pub server: ServerConfig,
    /// Login identity.
    pub login: LoginConfig,
    /// Chat command settings.
    #[serde(default)]
    pub commands: CommandConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Room blocks: which rooms to join and their per-room settings.
    #[serde(default)]
    pub rooms: Vec<RoomBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Room blocks to join once logged in.
    pub fn autojoin_rooms(&self) -> impl Iterator<Item = &RoomBlock> {
        self.rooms.iter().filter(|r| r.autojoin)
    }
}

/// Upstream endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Websocket endpoint (e.g. "wss://chat.example.net/websocket").
    pub url: String,
    /// Login assertion endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
}

/// Login identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    pub username: String,
    pub password: String,
    /// Avatar selected after login, if any.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Chat command settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Prefix character that marks chat text as a command.
    #[serde(default = "default_prefix")]
    pub prefix: char,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { prefix: default_prefix() }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path.
    pub path: String,
}

/// Per-room configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomBlock {
    /// Room name as typed by the operator; normalized before use.
    pub name: String,
    /// Whether to join the room at login (default: yes).
    #[serde(default = "default_autojoin")]
    pub autojoin: bool,
    /// Webhook endpoint associated with the room, if any.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_auth_url() -> String {
    "https://play.pokemonshowdown.com/action.php".to_string()
}

fn default_prefix() -> char {
    '.'
}

fn default_autojoin() -> bool {
    true
}

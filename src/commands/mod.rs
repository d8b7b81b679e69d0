//! Chat commands: the table, permission metadata, and dispatch.
//!
//! Commands are registered once at startup by each module's `register`
//! call (see [`builtin::register_all`]) and injected into the bot. The
//! descriptor on each command carries everything the resolver needs:
//! required rank, per-room editability, PM policy, concurrency class.

pub mod builtin;
mod context;
mod dispatch;

pub use context::{CommandContext, Target};
pub use dispatch::{handle_chat, handle_pm};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use ps_proto::Rank;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::bot::Bot;
use crate::error::CommandResult;

/// How a command behaves when invoked over a private message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmPolicy {
    /// Refused in PMs.
    Never,
    /// Allowed, at whatever rank room invocation would require.
    DefaultRank,
    /// Allowed, at this rank (replaces the room-resolved rank).
    Rank(Rank),
}

/// Static descriptor for one registered command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Primary name; also the lookup token.
    pub name: &'static str,
    /// Alternative tokens resolving to the same command.
    pub aliases: &'static [&'static str],
    /// Rank required unless overridden.
    pub default_rank: Rank,
    /// `Some(key)` when the required rank is editable per room. The key
    /// groups related commands under one override row.
    pub rank_key: Option<&'static str>,
    /// Private-message policy.
    pub pm: PmPolicy,
    /// Operates on room-scoped data; invokable from PM by naming the room
    /// as the first argument.
    pub room_scoped: bool,
    /// Only the invoker's room rank counts; a higher global rank does not.
    pub ignore_global_rank: bool,
    /// At most one instance may run per target context.
    pub single_instance: bool,
    /// Receives every subsequent chat line in its context while running.
    pub consumes_input: bool,
    /// Module the command came from, for introspection.
    pub module: &'static str,
}

impl CommandSpec {
    /// A descriptor with permissive defaults; adjust fields as needed.
    pub const fn new(name: &'static str, module: &'static str) -> Self {
        Self {
            name,
            module,
            aliases: &[],
            default_rank: Rank::Normal,
            rank_key: None,
            pm: PmPolicy::DefaultRank,
            room_scoped: false,
            ignore_global_rank: false,
            single_instance: false,
            consumes_input: false,
        }
    }
}

/// A user-invokable action triggered by prefixed chat text.
#[async_trait]
pub trait Command: Send + Sync {
    fn spec(&self) -> &CommandSpec;

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult;
}

/// Command registration errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate command name or alias: {0}")]
    Duplicate(&'static str),
}

/// Registry of commands, keyed by name and every alias.
#[derive(Default)]
pub struct CommandRegistry {
    by_token: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its name and aliases. Token collisions are
    /// a wiring bug and fail registration outright.
    pub fn register(&mut self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        let spec = command.spec();
        for token in std::iter::once(spec.name).chain(spec.aliases.iter().copied()) {
            if self.by_token.contains_key(token) {
                return Err(RegistryError::Duplicate(token));
            }
            self.by_token.insert(token, Arc::clone(&command));
        }
        Ok(())
    }

    /// Resolve a lowercased token (name or alias).
    pub fn get(&self, token: &str) -> Option<Arc<dyn Command>> {
        self.by_token.get(token).cloned()
    }

    /// All registered commands, once each (aliases deduplicated).
    pub fn commands(&self) -> impl Iterator<Item = &Arc<dyn Command>> {
        self.by_token
            .iter()
            .filter(|(token, command)| **token == command.spec().name)
            .map(|(_, command)| command)
    }
}

struct ActiveEntry {
    id: u64,
    command: &'static str,
    input: Option<mpsc::Sender<String>>,
}

/// In-flight commands, keyed by target context. Lets the resolver enforce
/// single-instance commands and route follow-up chat lines to commands
/// that consume them.
#[derive(Default)]
pub struct ActiveCommands {
    entries: DashMap<Target, Vec<ActiveEntry>>,
    ids: AtomicU64,
}

impl ActiveCommands {
    /// Whether this command is already running for this target.
    pub fn is_running(&self, target: &Target, command: &str) -> bool {
        self.entries
            .get(target)
            .is_some_and(|entries| entries.iter().any(|e| e.command == command))
    }

    /// Number of in-flight commands for this target.
    pub fn count(&self, target: &Target) -> usize {
        self.entries.get(target).map_or(0, |entries| entries.len())
    }

    /// Deliver a chat line to every running command in this context that
    /// consumes follow-up input. Slow consumers drop lines rather than
    /// stall the dispatch path.
    pub fn route_line(&self, target: &Target, line: &str) {
        if let Some(entries) = self.entries.get(target) {
            for entry in entries.iter() {
                if let Some(input) = &entry.input {
                    let _ = input.try_send(line.to_string());
                }
            }
        }
    }

    pub(crate) fn insert(
        &self,
        target: Target,
        command: &'static str,
        input: Option<mpsc::Sender<String>>,
    ) -> u64 {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        self.entries
            .entry(target)
            .or_default()
            .push(ActiveEntry { id, command, input });
        id
    }

    pub(crate) fn remove(&self, target: &Target, id: u64) {
        let now_empty = match self.entries.get_mut(target) {
            Some(mut entries) => {
                entries.retain(|e| e.id != id);
                entries.is_empty()
            }
            None => false,
        };
        // The shard lock from get_mut is released above; remove_if would
        // deadlock against it otherwise.
        if now_empty {
            self.entries.remove_if(target, |_, entries| entries.is_empty());
        }
    }
}

//! Built-in commands: the management surface the engine itself needs.

mod access;
mod info;
mod repeat;

use std::sync::Arc;

use crate::commands::{CommandRegistry, RegistryError};

/// Register every built-in command. Plugin modules contribute to the same
/// registry with their own `register` calls before the bot is built.
pub fn register_all(registry: &mut CommandRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(repeat::RepeatCommand))?;
    registry.register(Arc::new(repeat::StopRepeatCommand))?;
    registry.register(Arc::new(repeat::ListRepeatsCommand))?;
    registry.register(Arc::new(access::SetRankCommand))?;
    registry.register(Arc::new(access::ResetRankCommand))?;
    registry.register(Arc::new(info::HelpCommand))?;
    registry.register(Arc::new(info::UptimeCommand))?;
    Ok(())
}

//! Introspection commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bot::Bot;
use crate::commands::{Command, CommandContext, CommandSpec, PmPolicy};
use crate::error::CommandResult;

/// Describe the command table, or one command in detail.
pub struct HelpCommand;

const HELP_SPEC: CommandSpec = {
    let mut spec = CommandSpec::new("help", "info");
    spec.aliases = &["commands"];
    spec
};

#[async_trait]
impl Command for HelpCommand {
    fn spec(&self) -> &CommandSpec {
        &HELP_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let token = ctx.arg.trim().to_lowercase();
        if token.is_empty() {
            // Group by module of origin.
            let mut modules: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for command in bot.commands.commands() {
                let spec = command.spec();
                modules.entry(spec.module).or_default().push(spec.name);
            }
            let listing: Vec<String> = modules
                .into_iter()
                .map(|(module, mut names)| {
                    names.sort_unstable();
                    format!("{module}: {}", names.join(", "))
                })
                .collect();
            ctx.reply(&listing.join(" | ")).await;
            return Ok(());
        }

        let Some(command) = bot.commands.get(&token) else {
            ctx.reply("No such command.").await;
            return Ok(());
        };
        let spec = command.spec();
        let mut details = format!("{} (module {})", spec.name, spec.module);
        if spec.default_rank > ps_proto::Rank::Normal {
            details.push_str(&format!(": requires rank {} or higher", spec.default_rank));
        }
        if spec.rank_key.is_some() {
            details.push_str(", editable per room");
        }
        if let PmPolicy::Never = spec.pm {
            details.push_str(", rooms only");
        }
        if !spec.aliases.is_empty() {
            details.push_str(&format!("; aliases: {}", spec.aliases.join(", ")));
        }
        ctx.reply(&details).await;
        Ok(())
    }
}

/// Report how long the process has been up.
pub struct UptimeCommand;

const UPTIME_SPEC: CommandSpec = CommandSpec::new("uptime", "info");

#[async_trait]
impl Command for UptimeCommand {
    fn spec(&self) -> &CommandSpec {
        &UPTIME_SPEC
    }

    async fn run(&self, bot: Arc<Bot>, ctx: CommandContext) -> CommandResult {
        let total = bot.uptime().as_secs();
        let (days, rest) = (total / 86_400, total % 86_400);
        let (hours, rest) = (rest / 3_600, rest % 3_600);
        let (minutes, seconds) = (rest / 60, rest % 60);
        let text = if days > 0 {
            format!("Up for {days}d {hours}h {minutes}m {seconds}s.")
        } else if hours > 0 {
            format!("Up for {hours}h {minutes}m {seconds}s.")
        } else {
            format!("Up for {minutes}m {seconds}s.")
        };
        ctx.reply(&text).await;
        Ok(())
    }
}

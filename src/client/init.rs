//! Startup task tiers and background recurring tasks.
//!
//! Initialization work is grouped into five ascending priority tiers:
//! everything within a tier runs concurrently, the next tier starts only
//! once the previous one has fully completed, and any failure aborts
//! startup. Recurring tasks are spawned afterwards, un-awaited, and live
//! until process shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use futures_util::future::{BoxFuture, join_all};
use tracing::{debug, info, warn};

use crate::bot::Bot;
use crate::repeats;

/// Interval of the persisted-repeat sweeper.
const REPEAT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// One startup task. Tiers run in ascending order, 1 through 5.
pub struct InitTask {
    pub name: &'static str,
    pub tier: u8,
    pub fut: BoxFuture<'static, anyhow::Result<()>>,
}

/// The engine's own startup tasks.
pub fn init_tasks(bot: &Arc<Bot>) -> Vec<InitTask> {
    let mut tasks = Vec::new();

    {
        let bot = Arc::clone(bot);
        tasks.push(InitTask {
            name: "database-ping",
            tier: 1,
            fut: Box::pin(async move {
                sqlx::query("SELECT 1").execute(bot.db.pool()).await?;
                Ok(())
            }),
        });
    }

    {
        let bot = Arc::clone(bot);
        tasks.push(InitTask {
            name: "sweep-expired-repeats",
            tier: 2,
            fut: Box::pin(async move {
                let removed = bot.db.repeats().delete_expired(Utc::now().timestamp()).await?;
                if removed > 0 {
                    info!(removed, "expired repeat rows swept");
                }
                Ok(())
            }),
        });
    }

    {
        let bot = Arc::clone(bot);
        tasks.push(InitTask {
            name: "restore-repeats",
            tier: 3,
            fut: Box::pin(async move {
                repeats::restore_all(&bot).await?;
                Ok(())
            }),
        });
    }

    tasks
}

/// Run init tasks tier by tier. A failing task propagates and aborts
/// startup; nothing here is worth running degraded over.
pub async fn run_init_tasks(tasks: Vec<InitTask>) -> anyhow::Result<()> {
    let mut tiers: BTreeMap<u8, Vec<InitTask>> = BTreeMap::new();
    for task in tasks {
        tiers.entry(task.tier).or_default().push(task);
    }

    for (tier, batch) in tiers {
        debug!(tier, count = batch.len(), "running init tier");
        let results = join_all(batch.into_iter().map(|task| async move {
            task.fut
                .await
                .with_context(|| format!("init task '{}' failed", task.name))
        }))
        .await;
        for result in results {
            result?;
        }
    }
    Ok(())
}

/// Spawn the background recurring tasks. These run for the life of the
/// process and are not awaited by startup.
pub fn spawn_recurring(bot: &Arc<Bot>) {
    // Periodic sweep of persisted repeat rows whose expiry passed while
    // their cleanup could not run (e.g. the process died mid-window).
    {
        let bot = Arc::clone(bot);
        bot.lifetime.clone().spawn(async move {
            let mut interval = tokio::time::interval(REPEAT_SWEEP_INTERVAL);
            // The immediate first tick duplicates the init-tier sweep.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = bot.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        match bot.db.repeats().delete_expired(Utc::now().timestamp()).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "expired repeat rows swept");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "repeat sweep failed"),
                        }
                    }
                }
            }
        });
    }
    info!("recurring tasks started");
}

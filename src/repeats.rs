//! Persisted recurring broadcasts ("repeat" jobs).
//!
//! Each job is an independent timer task sending a fixed text to a fixed
//! room. Jobs are persisted on creation and reloaded at startup; a
//! restored job realigns to the schedule it would have followed had the
//! process never stopped, never firing once per missed interval. Job
//! tasks run on the process-lifetime tracker, so they survive reconnects
//! and end only on expiry, explicit cancellation, supersession, or
//! process shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ps_proto::RoomId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::Bot;
use crate::db::{DbError, RepeatRecord};

/// Tolerance for scheduling jitter when deciding expiry.
pub const EXPIRY_GRACE: Duration = Duration::from_secs(1);

/// One recurring broadcast. `(room, message)` is the natural key; only one
/// job may exist per pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repeat {
    pub room: RoomId,
    pub message: String,
    pub interval: Duration,
    /// Instant the job was first created; the anchor of its schedule.
    pub created_at: DateTime<Utc>,
    /// Instant past which the job stops firing, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Repeat {
    /// Whether the job is past its expiry (with the jitter grace).
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires) => {
                now.signed_duration_since(expires).to_std().unwrap_or(Duration::ZERO) > EXPIRY_GRACE
            }
            None => false,
        }
    }

    /// Time until the next fire on the job's original schedule: advance by
    /// however many whole intervals elapsed since creation and wait only
    /// the remainder. Zero for a job created just now.
    pub fn offset(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = now
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let interval = self.interval.as_secs().max(1);
        let into_cycle = elapsed.as_secs() % interval;
        if into_cycle == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(interval - into_cycle)
        }
    }

    fn record(&self) -> RepeatRecord {
        RepeatRecord {
            room_id: self.room.as_str().to_string(),
            message: self.message.clone(),
            interval_mins: (self.interval.as_secs() / 60) as i64,
            created_at: self.created_at.timestamp(),
            expires_at: self.expires_at.map(|e| e.timestamp()),
        }
    }

    fn from_record(record: &RepeatRecord) -> Option<Repeat> {
        if record.interval_mins <= 0 {
            return None;
        }
        Some(Repeat {
            room: RoomId::new(&record.room_id),
            message: record.message.clone(),
            interval: Duration::from_secs(record.interval_mins as u64 * 60),
            created_at: DateTime::from_timestamp(record.created_at, 0)?,
            expires_at: match record.expires_at {
                Some(ts) => Some(DateTime::from_timestamp(ts, 0)?),
                None => None,
            },
        })
    }
}

/// Expiry instant for a job limited to `iterations` sends: the scheduled
/// time of the last allowed fire (the first fire happens at creation).
pub fn expiry_for_iterations(
    created_at: DateTime<Utc>,
    interval: Duration,
    iterations: u32,
) -> DateTime<Utc> {
    created_at + interval * iterations.saturating_sub(1)
}

type RepeatKey = (RoomId, String);

struct JobHandle {
    id: u64,
    stop: CancellationToken,
    repeat: Repeat,
}

/// Live registry of running repeat jobs.
#[derive(Default)]
pub struct RepeatScheduler {
    jobs: DashMap<RepeatKey, JobHandle>,
    ids: AtomicU64,
}

impl RepeatScheduler {
    /// Running jobs for one room.
    pub fn list(&self, room: &RoomId) -> Vec<Repeat> {
        let mut jobs: Vec<Repeat> = self
            .jobs
            .iter()
            .filter(|entry| entry.key().0 == *room)
            .map(|entry| entry.value().repeat.clone())
            .collect();
        jobs.sort_by(|a, b| a.message.cmp(&b.message));
        jobs
    }

    pub fn is_running(&self, room: &RoomId, message: &str) -> bool {
        self.jobs
            .contains_key(&(room.clone(), message.to_string()))
    }
}

/// Create (or redefine) a job: persist the definition, supersede any
/// running job with the same key, and start the timer task.
pub async fn start(bot: &Arc<Bot>, repeat: Repeat) -> Result<(), DbError> {
    bot.db.repeats().upsert(&repeat.record()).await?;
    launch(bot, repeat);
    Ok(())
}

/// Reload every persisted job at startup, realigning each to its original
/// schedule. Rows already expired are cleaned up instead of started.
pub async fn restore_all(bot: &Arc<Bot>) -> Result<(), DbError> {
    let now = Utc::now();
    let records = bot.db.repeats().load_all().await?;
    let mut restored = 0usize;
    for record in &records {
        match Repeat::from_record(record) {
            Some(repeat) if !repeat.expired(now) => {
                launch(bot, repeat);
                restored += 1;
            }
            _ => {
                let room = RoomId::new(&record.room_id);
                bot.db.repeats().delete(&room, &record.message).await?;
            }
        }
    }
    info!(restored, total = records.len(), "repeat jobs restored");
    Ok(())
}

/// Explicitly stop a job: cancel its timer and delete its persisted row.
/// Returns whether a job was running. The key is reusable immediately.
pub async fn cancel(bot: &Arc<Bot>, room: &RoomId, message: &str) -> Result<bool, DbError> {
    let key = (room.clone(), message.to_string());
    let Some((_, handle)) = bot.repeats.jobs.remove(&key) else {
        return Ok(false);
    };
    handle.stop.cancel();
    bot.db.repeats().delete(room, message).await?;
    Ok(true)
}

fn launch(bot: &Arc<Bot>, repeat: Repeat) {
    let key: RepeatKey = (repeat.room.clone(), repeat.message.clone());
    let id = bot.repeats.ids.fetch_add(1, Ordering::Relaxed);
    let stop = CancellationToken::new();

    let handle = JobHandle { id, stop: stop.clone(), repeat: repeat.clone() };
    if let Some(old) = bot.repeats.jobs.insert(key.clone(), handle) {
        // Superseded by a same-key job: the old timer dies, the persisted
        // row has already been rewritten and must stay.
        old.stop.cancel();
    }

    let bot = Arc::clone(bot);
    bot.lifetime.clone().spawn(async move {
        let expired_naturally = tokio::select! {
            _ = bot.shutdown.cancelled() => false,
            _ = stop.cancelled() => false,
            _ = run_job(&bot, &repeat) => true,
        };

        if expired_naturally {
            debug!(room = %repeat.room, "repeat expired");
            if let Err(e) = bot.db.repeats().delete(&repeat.room, &repeat.message).await {
                warn!(room = %repeat.room, error = %e, "failed to delete expired repeat");
            }
            bot.repeats.jobs.remove_if(&key, |_, handle| handle.id == id);
        }
    });
}

async fn run_job(bot: &Arc<Bot>, repeat: &Repeat) {
    let now = Utc::now();
    // Expiry is tracked on the monotonic clock from here on; the wall
    // clock only anchors the schedule at (re)start.
    let deadline = repeat.expires_at.map(|expires| {
        let until = expires
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Instant::now() + until + EXPIRY_GRACE
    });

    tokio::time::sleep(repeat.offset(now)).await;

    loop {
        if deadline.is_some_and(|d| Instant::now() > d) {
            break;
        }

        let already_posted = bot
            .get_room(&repeat.room)
            .is_some_and(|room| room.buffer_contains(&repeat.message));
        if already_posted {
            // Anti-duplicate throttle: hold this cycle but stay on schedule.
            tokio::time::sleep(repeat.interval).await;
        } else {
            let started = Instant::now();
            bot.outbound.send_room(&repeat.room, &repeat.message).await;
            tokio::time::sleep(repeat.interval.saturating_sub(started.elapsed())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    fn repeat_created_at(ts: DateTime<Utc>, interval: Duration) -> Repeat {
        Repeat {
            room: RoomId::new("lobby"),
            message: "hello".to_string(),
            interval,
            created_at: ts,
            expires_at: None,
        }
    }

    #[test]
    fn offset_realigns_to_original_schedule() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let repeat = repeat_created_at(t0, minutes(10));

        // Created just now: fire immediately.
        assert_eq!(repeat.offset(t0), Duration::ZERO);
        // Restarted mid-cycle: wait only the remainder.
        assert_eq!(repeat.offset(t0 + minutes(15)), minutes(5));
        // Restarted exactly on a boundary: that boundary is the schedule.
        assert_eq!(repeat.offset(t0 + minutes(20)), Duration::ZERO);
        // Next fire lands at t0 + 2 cycles, not at restart + cycle.
        assert_eq!(repeat.offset(t0 + minutes(15)) + minutes(15), minutes(20));
    }

    #[test]
    fn expiry_applies_grace() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut repeat = repeat_created_at(t0, minutes(10));
        repeat.expires_at = Some(t0 + minutes(30));

        assert!(!repeat.expired(t0 + minutes(30)));
        assert!(!repeat.expired(t0 + minutes(30) + chrono::Duration::seconds(1)));
        assert!(repeat.expired(t0 + minutes(30) + chrono::Duration::seconds(2)));
        assert!(!repeat_created_at(t0, minutes(10)).expired(t0 + minutes(600)));
    }

    #[test]
    fn iteration_expiry_covers_exactly_n_fires() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let interval = minutes(10);

        // Fires land at t0, t0+10m, t0+20m; the third is the last.
        let expires = expiry_for_iterations(t0, interval, 3);
        assert_eq!(expires, t0 + minutes(20));

        let mut repeat = repeat_created_at(t0, interval);
        repeat.expires_at = Some(expires);
        assert!(!repeat.expired(t0 + minutes(20)));
        assert!(repeat.expired(t0 + minutes(30)));

        // A single-shot job expires at its creation instant.
        assert_eq!(expiry_for_iterations(t0, interval, 1), t0);
    }

    #[test]
    fn record_round_trip() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let mut repeat = repeat_created_at(t0, minutes(45));
        repeat.expires_at = Some(t0 + minutes(90));

        let restored = Repeat::from_record(&repeat.record()).unwrap();
        assert_eq!(restored, repeat);

        let bad = RepeatRecord {
            room_id: "lobby".to_string(),
            message: "x".to_string(),
            interval_mins: 0,
            created_at: t0.timestamp(),
            expires_at: None,
        };
        assert!(Repeat::from_record(&bad).is_none());
    }
}

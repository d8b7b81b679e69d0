//! Persisted repeat jobs.

use crate::db::DbError;
use ps_proto::RoomId;
use sqlx::SqlitePool;

/// One persisted repeat job row. Instants are unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RepeatRecord {
    pub room_id: String,
    pub message: String,
    pub interval_mins: i64,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

/// Repository for repeat jobs. One row per `(room, message)`; a conflicting
/// key overwrites the job definition.
pub struct RepeatRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RepeatRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a job definition.
    pub async fn upsert(&self, record: &RepeatRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO repeats (room_id, message, interval_mins, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (room_id, message) DO UPDATE SET
                interval_mins = excluded.interval_mins,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&record.room_id)
        .bind(&record.message)
        .bind(record.interval_mins)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete a job row. Returns whether a row existed.
    pub async fn delete(&self, room: &RoomId, message: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM repeats WHERE room_id = ? AND message = ?")
            .bind(room.as_str())
            .bind(message)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load every persisted job (startup restore path).
    pub async fn load_all(&self) -> Result<Vec<RepeatRecord>, DbError> {
        let rows = sqlx::query_as::<_, RepeatRecord>(
            "SELECT room_id, message, interval_mins, created_at, expires_at FROM repeats",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete rows whose expiry instant already passed. Covers rows left
    /// behind when the process dies between a job expiring and its cleanup.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM repeats WHERE expires_at IS NOT NULL AND expires_at < ?")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Per-room command rank overrides.

use crate::db::DbError;
use ps_proto::{Rank, RoomId};
use sqlx::SqlitePool;

/// Repository for required-rank overrides. One row per
/// `(room, command-or-group-key)`; absence means "use the default".
pub struct RankOverrideRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RankOverrideRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the override for a command (or its grouping key) in a room.
    pub async fn get(&self, room: &RoomId, key: &str) -> Result<Option<Rank>, DbError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT required_rank FROM command_ranks WHERE room_id = ? AND command = ?",
        )
        .bind(room.as_str())
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some((symbol,)) => {
                let rank = symbol
                    .parse::<Rank>()
                    .map_err(|e| DbError::Internal(format!("corrupt rank override: {e}")))?;
                Ok(Some(rank))
            }
            None => Ok(None),
        }
    }

    /// Set (or replace) the override for a command in a room.
    pub async fn set(&self, room: &RoomId, key: &str, rank: Rank) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO command_ranks (room_id, command, required_rank)
            VALUES (?, ?, ?)
            ON CONFLICT (room_id, command) DO UPDATE SET required_rank = excluded.required_rank
            "#,
        )
        .bind(room.as_str())
        .bind(key)
        .bind(rank.symbol().to_string())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove the override, restoring the command's default rank.
    /// Returns whether a row existed.
    pub async fn clear(&self, room: &RoomId, key: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM command_ranks WHERE room_id = ? AND command = ?")
            .bind(room.as_str())
            .bind(key)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All overrides configured for a room.
    pub async fn list_for_room(&self, room: &RoomId) -> Result<Vec<(String, Rank)>, DbError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT command, required_rank FROM command_ranks WHERE room_id = ? ORDER BY command",
        )
        .bind(room.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(command, symbol)| {
                let rank = symbol
                    .parse::<Rank>()
                    .map_err(|e| DbError::Internal(format!("corrupt rank override: {e}")))?;
                Ok((command, rank))
            })
            .collect()
    }
}

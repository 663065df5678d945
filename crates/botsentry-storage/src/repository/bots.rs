//! Bot repository

use crate::db::DatabasePool;
use crate::models::{Bot, NewBotCounts, StatusCount};
use async_trait::async_trait;
use botsentry_common::types::{BotId, BotStatus, UserId};
use botsentry_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

const BOT_COLUMNS: &str = "id, name, sender_name, email, registration_ip, verified, status, \
     flag_count, owner_user_id, claimed_at, created_at";

/// Bot repository trait
#[async_trait]
pub trait BotRepository: Send + Sync {
    /// Get a bot by ID
    async fn get(&self, id: BotId) -> Result<Option<Bot>>;

    /// Get all bots with the given IDs
    async fn find_by_ids(&self, ids: &[BotId]) -> Result<Vec<Bot>>;

    /// Bots registered in `[start, end)`, oldest first
    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bot>>;

    /// Count bots registered in `[start, end)` and how many of them are claimed
    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NewBotCounts>;

    /// Bots whose status is one of `statuses`, most flagged first
    async fn list_by_statuses(
        &self,
        statuses: &[BotStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bot>>;

    /// Count bots whose status is one of `statuses`
    async fn count_by_statuses(&self, statuses: &[BotStatus]) -> Result<i64>;

    /// Count bots per status
    async fn count_by_status(&self) -> Result<Vec<StatusCount>>;

    /// Persist a new status together with the flag counter
    async fn update_status(&self, id: BotId, status: BotStatus, flag_count: i32) -> Result<()>;

    /// Email address of the user owning a bot
    async fn owner_email(&self, user_id: UserId) -> Result<Option<String>>;
}

/// Database bot repository
pub struct DbBotRepository {
    pool: DatabasePool,
}

impl DbBotRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn status_strings(statuses: &[BotStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl BotRepository for DbBotRepository {
    async fn get(&self, id: BotId) -> Result<Option<Bot>> {
        sqlx::query_as::<_, Bot>(&format!("SELECT {} FROM bots WHERE id = $1", BOT_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_ids(&self, ids: &[BotId]) -> Result<Vec<Bot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Bot>(&format!(
            "SELECT {} FROM bots WHERE id = ANY($1) ORDER BY created_at ASC",
            BOT_COLUMNS
        ))
        .bind(ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bot>> {
        sqlx::query_as::<_, Bot>(&format!(
            r#"
            SELECT {}
            FROM bots
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at ASC, id ASC
            "#,
            BOT_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NewBotCounts> {
        sqlx::query_as::<_, NewBotCounts>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE owner_user_id IS NOT NULL) AS claimed
            FROM bots
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_statuses(
        &self,
        statuses: &[BotStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bot>> {
        sqlx::query_as::<_, Bot>(&format!(
            r#"
            SELECT {}
            FROM bots
            WHERE status = ANY($1)
            ORDER BY flag_count DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BOT_COLUMNS
        ))
        .bind(status_strings(statuses))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_by_statuses(&self, statuses: &[BotStatus]) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM bots WHERE status = ANY($1)")
            .bind(status_strings(statuses))
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.try_get::<i64, _>("count")
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_by_status(&self) -> Result<Vec<StatusCount>> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM bots GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(&self, id: BotId, status: BotStatus, flag_count: i32) -> Result<()> {
        let result = sqlx::query("UPDATE bots SET status = $2, flag_count = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(flag_count)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Bot {} not found", id)));
        }
        Ok(())
    }

    async fn owner_email(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|r| r.try_get::<String, _>("email"))
            .transpose()
            .map_err(|e| Error::Database(e.to_string()))
    }
}

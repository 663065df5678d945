//! Email flag repository

use crate::db::DatabasePool;
use crate::models::{CreateEmailFlag, EmailFlag};
use async_trait::async_trait;
use botsentry_common::types::{BotId, MessageId};
use botsentry_common::{Error, Result};
use sqlx::Row;
use uuid::Uuid;

/// Email flag repository trait
#[async_trait]
pub trait EmailFlagRepository: Send + Sync {
    /// Whether a flag already exists for a message
    async fn exists_for_message(&self, message_id: MessageId) -> Result<bool>;

    /// Insert a flag. Returns `None` when the message was already flagged.
    async fn create(&self, input: CreateEmailFlag) -> Result<Option<EmailFlag>>;

    /// Flags attached to any of the given messages
    async fn list_for_messages(&self, message_ids: &[MessageId]) -> Result<Vec<EmailFlag>>;

    /// Flags for one bot, newest first
    async fn list_for_bot(&self, bot_id: BotId, limit: i64) -> Result<Vec<EmailFlag>>;

    /// Total number of flags
    async fn count(&self) -> Result<i64>;
}

/// Database email flag repository
pub struct DbEmailFlagRepository {
    pool: DatabasePool,
}

impl DbEmailFlagRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailFlagRepository for DbEmailFlagRepository {
    async fn exists_for_message(&self, message_id: MessageId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM email_flags WHERE message_id = $1) AS found")
            .bind(message_id)
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.try_get::<bool, _>("found")
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create(&self, input: CreateEmailFlag) -> Result<Option<EmailFlag>> {
        sqlx::query_as::<_, EmailFlag>(
            r#"
            INSERT INTO email_flags (id, message_id, bot_id, suggested_status, reason)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (message_id) DO NOTHING
            RETURNING id, message_id, bot_id, suggested_status, reason, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.message_id)
        .bind(input.bot_id)
        .bind(input.suggested_status.as_str())
        .bind(&input.reason)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_messages(&self, message_ids: &[MessageId]) -> Result<Vec<EmailFlag>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, EmailFlag>(
            r#"
            SELECT id, message_id, bot_id, suggested_status, reason, created_at
            FROM email_flags
            WHERE message_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(message_ids)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_for_bot(&self, bot_id: BotId, limit: i64) -> Result<Vec<EmailFlag>> {
        sqlx::query_as::<_, EmailFlag>(
            r#"
            SELECT id, message_id, bot_id, suggested_status, reason, created_at
            FROM email_flags
            WHERE bot_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(bot_id)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM email_flags")
            .fetch_one(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.try_get::<i64, _>("count")
            .map_err(|e| Error::Database(e.to_string()))
    }
}

//! Bot message repository
//!
//! Messages are written by the mail pipeline; this subsystem only reads them.

use crate::db::DatabasePool;
use crate::models::BotMessage;
use async_trait::async_trait;
use botsentry_common::types::MessageDirection;
use botsentry_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Outbound messages created in `[start, end)`, oldest first
    async fn list_outbound_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BotMessage>>;

    /// Count messages of one direction created in `[start, end)`
    async fn count_between(
        &self,
        direction: MessageDirection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn list_outbound_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BotMessage>> {
        sqlx::query_as::<_, BotMessage>(
            r#"
            SELECT id, bot_id, direction, recipient, subject, body, created_at
            FROM bot_messages
            WHERE direction = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(MessageDirection::Outbound.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_between(
        &self,
        direction: MessageDirection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM bot_messages
            WHERE direction = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(direction.as_str())
        .bind(start)
        .bind(end)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.try_get::<i64, _>("count")
            .map_err(|e| Error::Database(e.to_string()))
    }
}

//! Security event log

use crate::db::DatabasePool;
use crate::models::{NewSecurityEvent, SecurityEvent};
use async_trait::async_trait;
use botsentry_common::{Error, Result};
use uuid::Uuid;

/// Security event repository trait
#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    /// Append an event
    async fn log_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent>;

    /// Most recent events, optionally of one type
    async fn list_recent(&self, event_type: Option<&str>, limit: i64) -> Result<Vec<SecurityEvent>>;
}

/// Database security event repository
pub struct DbSecurityEventRepository {
    pool: DatabasePool,
}

impl DbSecurityEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityEventRepository for DbSecurityEventRepository {
    async fn log_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            INSERT INTO security_events (id, event_type, actor_id, target_type, target_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, event_type, actor_id, target_type, target_id, metadata, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&event.event_type)
        .bind(&event.actor_id)
        .bind(&event.target_type)
        .bind(&event.target_id)
        .bind(&event.metadata)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_recent(&self, event_type: Option<&str>, limit: i64) -> Result<Vec<SecurityEvent>> {
        sqlx::query_as::<_, SecurityEvent>(
            r#"
            SELECT id, event_type, actor_id, target_type, target_id, metadata, created_at
            FROM security_events
            WHERE ($1::TEXT IS NULL OR event_type = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(event_type)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

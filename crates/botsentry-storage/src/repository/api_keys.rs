//! Admin API key repository

use crate::db::DatabasePool;
use crate::models::AdminApiKey;
use async_trait::async_trait;
use botsentry_common::{Error, Result};
use chrono::Utc;
use uuid::Uuid;

/// Admin API key repository trait
#[async_trait]
pub trait AdminKeyRepository: Send + Sync {
    /// Find unexpired keys by their prefix (for initial lookup)
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<AdminApiKey>>;

    /// Update last_used_at timestamp
    async fn update_last_used(&self, id: Uuid) -> Result<()>;
}

/// Database admin API key repository
pub struct DbAdminKeyRepository {
    pool: DatabasePool,
}

impl DbAdminKeyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminKeyRepository for DbAdminKeyRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<AdminApiKey>> {
        sqlx::query_as::<_, AdminApiKey>(
            r#"
            SELECT id, name, key_hash, key_prefix, scopes, expires_at, last_used_at, created_at
            FROM admin_api_keys
            WHERE key_prefix = $1
              AND (expires_at IS NULL OR expires_at > NOW())
            LIMIT 10
            "#,
        )
        .bind(prefix)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE admin_api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

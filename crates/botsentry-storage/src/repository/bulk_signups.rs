//! Bulk signup alert and IP block repository

use crate::db::DatabasePool;
use crate::models::{
    ApprovalPlan, ApprovalSummary, BulkSignupAlert, CreateBulkSignupAlert, IpBlock,
    ResolveOutcome,
};
use async_trait::async_trait;
use botsentry_common::types::{AlertId, AlertStatus, BotStatus};
use botsentry_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

const ALERT_COLUMNS: &str = "id, signature, status, name_prefix, sender_prefix, bot_ids, ip_list, \
     bot_count, claimed_count, window_start, window_end, approval_token, created_at, resolved_at";

/// Bulk signup repository trait
#[async_trait]
pub trait BulkSignupRepository: Send + Sync {
    /// Whether an alert with this signature was already recorded
    async fn exists_by_signature(&self, signature: &str) -> Result<bool>;

    /// Insert a pending alert. Returns `None` if the signature already exists.
    async fn create(&self, input: CreateBulkSignupAlert) -> Result<Option<BulkSignupAlert>>;

    /// Get an alert by ID
    async fn get(&self, id: AlertId) -> Result<Option<BulkSignupAlert>>;

    /// List alerts, newest first, optionally filtered by status
    async fn list(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BulkSignupAlert>>;

    /// Count alerts, optionally filtered by status
    async fn count(&self, status: Option<AlertStatus>) -> Result<i64>;

    /// Atomically suspend the alert's bots, delete their handles, block their
    /// IPs and mark the alert approved. Only pending alerts are resolved.
    async fn approve(
        &self,
        id: AlertId,
        plan: ApprovalPlan,
    ) -> Result<ResolveOutcome<ApprovalSummary>>;

    /// Mark a pending alert ignored without side effects
    async fn ignore(&self, id: AlertId, resolved_at: DateTime<Utc>) -> Result<ResolveOutcome<()>>;

    /// All blocks recorded for the given IPs
    async fn ip_blocks_for(&self, ips: &[String]) -> Result<Vec<IpBlock>>;

    /// The block currently in force for an IP, if any
    async fn active_block(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<IpBlock>>;
}

/// Database bulk signup repository
pub struct DbBulkSignupRepository {
    pool: DatabasePool,
}

impl DbBulkSignupRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// Distinct, non-empty IPs in stable order
pub(crate) fn distinct_ips(ips: &[String]) -> Vec<String> {
    ips.iter()
        .map(|ip| ip.trim())
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn parse_status(raw: &str) -> Result<AlertStatus> {
    raw.parse()
}

#[async_trait]
impl BulkSignupRepository for DbBulkSignupRepository {
    async fn exists_by_signature(&self, signature: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM bulk_signup_alerts WHERE signature = $1) AS found",
        )
        .bind(signature)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)?;

        row.try_get::<bool, _>("found").map_err(db_error)
    }

    async fn create(&self, input: CreateBulkSignupAlert) -> Result<Option<BulkSignupAlert>> {
        let bot_count = i32::try_from(input.bot_ids.len())
            .map_err(|_| Error::Validation("Too many bots in one alert".to_string()))?;

        sqlx::query_as::<_, BulkSignupAlert>(&format!(
            r#"
            INSERT INTO bulk_signup_alerts (
                id, signature, status, name_prefix, sender_prefix, bot_ids, ip_list,
                bot_count, claimed_count, window_start, window_end, approval_token
            )
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (signature) DO NOTHING
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(Uuid::now_v7())
        .bind(&input.signature)
        .bind(&input.name_prefix)
        .bind(&input.sender_prefix)
        .bind(&input.bot_ids)
        .bind(&input.ip_list)
        .bind(bot_count)
        .bind(input.claimed_count)
        .bind(input.window_start)
        .bind(input.window_end)
        .bind(&input.approval_token)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn get(&self, id: AlertId) -> Result<Option<BulkSignupAlert>> {
        sqlx::query_as::<_, BulkSignupAlert>(&format!(
            "SELECT {} FROM bulk_signup_alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn list(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BulkSignupAlert>> {
        sqlx::query_as::<_, BulkSignupAlert>(&format!(
            r#"
            SELECT {}
            FROM bulk_signup_alerts
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            ALERT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn count(&self, status: Option<AlertStatus>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM bulk_signup_alerts WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_error)?;

        row.try_get::<i64, _>("count").map_err(db_error)
    }

    async fn approve(
        &self,
        id: AlertId,
        plan: ApprovalPlan,
    ) -> Result<ResolveOutcome<ApprovalSummary>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let alert = sqlx::query_as::<_, BulkSignupAlert>(&format!(
            "SELECT {} FROM bulk_signup_alerts WHERE id = $1 FOR UPDATE",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let alert = match alert {
            Some(alert) => alert,
            None => return Ok(ResolveOutcome::NotFound),
        };

        let status = parse_status(&alert.status)?;
        if status != AlertStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(status));
        }

        let mut summary = ApprovalSummary {
            blocked_until: Some(plan.blocked_until),
            ..Default::default()
        };

        if !alert.bot_ids.is_empty() {
            summary.bots_suspended = sqlx::query(
                "UPDATE bots SET status = $2, verified = false WHERE id = ANY($1)",
            )
            .bind(&alert.bot_ids)
            .bind(BotStatus::Suspended.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

            summary.handles_deleted = sqlx::query("DELETE FROM bot_handles WHERE bot_id = ANY($1)")
                .bind(&alert.bot_ids)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?
                .rows_affected();
        }

        for ip in distinct_ips(&alert.ip_list) {
            let extended = sqlx::query(
                r#"
                UPDATE ip_blocks SET
                    blocked_until = GREATEST(blocked_until, $2),
                    reason = $4,
                    alert_id = $5,
                    updated_at = $3
                WHERE ip_address = $1 AND blocked_until > $3
                "#,
            )
            .bind(&ip)
            .bind(plan.blocked_until)
            .bind(plan.resolved_at)
            .bind(&plan.reason)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

            if extended > 0 {
                summary.ip_blocks_extended += 1;
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO ip_blocks (id, ip_address, blocked_until, reason, alert_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(&ip)
            .bind(plan.blocked_until)
            .bind(&plan.reason)
            .bind(id)
            .bind(plan.resolved_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
            summary.ip_blocks_created += 1;
        }

        sqlx::query("UPDATE bulk_signup_alerts SET status = $2, resolved_at = $3 WHERE id = $1")
            .bind(id)
            .bind(AlertStatus::Approved.as_str())
            .bind(plan.resolved_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        debug!(
            alert_id = %id,
            bots_suspended = summary.bots_suspended,
            ip_blocks_created = summary.ip_blocks_created,
            ip_blocks_extended = summary.ip_blocks_extended,
            "Approval transaction committed"
        );
        Ok(ResolveOutcome::Resolved(summary))
    }

    async fn ignore(&self, id: AlertId, resolved_at: DateTime<Utc>) -> Result<ResolveOutcome<()>> {
        let updated = sqlx::query(
            r#"
            UPDATE bulk_signup_alerts SET status = $2, resolved_at = $3
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(AlertStatus::Ignored.as_str())
        .bind(resolved_at)
        .bind(AlertStatus::Pending.as_str())
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?
        .rows_affected();

        if updated > 0 {
            return Ok(ResolveOutcome::Resolved(()));
        }

        match self.get(id).await? {
            Some(alert) => Ok(ResolveOutcome::AlreadyResolved(parse_status(&alert.status)?)),
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn ip_blocks_for(&self, ips: &[String]) -> Result<Vec<IpBlock>> {
        if ips.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, IpBlock>(
            r#"
            SELECT id, ip_address, blocked_until, reason, alert_id, created_at, updated_at
            FROM ip_blocks
            WHERE ip_address = ANY($1)
            ORDER BY ip_address ASC, blocked_until DESC
            "#,
        )
        .bind(ips)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)
    }

    async fn active_block(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<IpBlock>> {
        sqlx::query_as::<_, IpBlock>(
            r#"
            SELECT id, ip_address, blocked_until, reason, alert_id, created_at, updated_at
            FROM ip_blocks
            WHERE ip_address = $1 AND blocked_until > $2
            ORDER BY blocked_until DESC
            LIMIT 1
            "#,
        )
        .bind(ip)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_ips() {
        let ips = vec![
            "10.0.0.2".to_string(),
            " 10.0.0.1".to_string(),
            "".to_string(),
            "10.0.0.2".to_string(),
        ];
        assert_eq!(distinct_ips(&ips), vec!["10.0.0.1", "10.0.0.2"]);
    }
}

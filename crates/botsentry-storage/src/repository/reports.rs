//! Security report repository

use crate::db::DatabasePool;
use crate::models::{SecurityReport, UpsertSecurityReport};
use async_trait::async_trait;
use botsentry_common::{Error, Result};
use chrono::NaiveDate;

/// Security report repository trait
#[async_trait]
pub trait SecurityReportRepository: Send + Sync {
    /// Insert or replace the report for a date. `sent_to_admin` is preserved.
    async fn upsert(&self, input: UpsertSecurityReport) -> Result<SecurityReport>;

    /// Record a successful admin delivery. Never resets an earlier `true`.
    async fn mark_sent_to_admin(&self, report_date: NaiveDate) -> Result<()>;

    /// Get the report for a date
    async fn get(&self, report_date: NaiveDate) -> Result<Option<SecurityReport>>;

    /// Most recent reports, newest first
    async fn list_recent(&self, limit: i64) -> Result<Vec<SecurityReport>>;
}

/// Database security report repository
pub struct DbSecurityReportRepository {
    pool: DatabasePool,
}

impl DbSecurityReportRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityReportRepository for DbSecurityReportRepository {
    async fn upsert(&self, input: UpsertSecurityReport) -> Result<SecurityReport> {
        let stats = serde_json::to_value(input.stats)
            .map_err(|e| Error::Internal(format!("Failed to encode stats: {}", e)))?;
        let flagged = serde_json::to_value(&input.flagged_emails)
            .map_err(|e| Error::Internal(format!("Failed to encode flagged emails: {}", e)))?;
        let subjects = serde_json::to_value(&input.subjects)
            .map_err(|e| Error::Internal(format!("Failed to encode subjects: {}", e)))?;

        sqlx::query_as::<_, SecurityReport>(
            r#"
            INSERT INTO security_reports (report_date, stats, flagged_emails, subjects)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (report_date) DO UPDATE SET
                stats = EXCLUDED.stats,
                flagged_emails = EXCLUDED.flagged_emails,
                subjects = EXCLUDED.subjects,
                updated_at = NOW()
            RETURNING report_date, stats, flagged_emails, subjects, sent_to_admin,
                      created_at, updated_at
            "#,
        )
        .bind(input.report_date)
        .bind(&stats)
        .bind(&flagged)
        .bind(&subjects)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_sent_to_admin(&self, report_date: NaiveDate) -> Result<()> {
        sqlx::query(
            "UPDATE security_reports SET sent_to_admin = true, updated_at = NOW() WHERE report_date = $1",
        )
        .bind(report_date)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, report_date: NaiveDate) -> Result<Option<SecurityReport>> {
        sqlx::query_as::<_, SecurityReport>(
            r#"
            SELECT report_date, stats, flagged_emails, subjects, sent_to_admin,
                   created_at, updated_at
            FROM security_reports
            WHERE report_date = $1
            "#,
        )
        .bind(report_date)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<SecurityReport>> {
        sqlx::query_as::<_, SecurityReport>(
            r#"
            SELECT report_date, stats, flagged_emails, subjects, sent_to_admin,
                   created_at, updated_at
            FROM security_reports
            ORDER BY report_date DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

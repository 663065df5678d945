//! Approve or ignore bulk signup alerts

use crate::clock::Clock;
use crate::metrics::SecurityMetrics;
use botsentry_common::types::{AlertId, AlertStatus};
use botsentry_storage::models::{
    ApprovalPlan, ApprovalSummary, BulkSignupAlert, NewSecurityEvent, ResolveOutcome,
};
use botsentry_storage::repository::Repositories;
use chrono::Duration;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

/// Actor recorded for approvals made through the emailed link
pub const TOKEN_ACTOR: &str = "approval-token";

/// How an approval was authorized
#[derive(Debug, Clone)]
pub enum ApprovalAuth {
    /// Authenticated admin, identified by API key name or id
    Admin(String),
    /// One-time token from the alert email
    Token(String),
}

impl ApprovalAuth {
    fn actor(&self) -> String {
        match self {
            ApprovalAuth::Admin(actor) => actor.clone(),
            ApprovalAuth::Token(_) => TOKEN_ACTOR.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("Bulk signup alert not found")]
    NotFound,

    #[error("Invalid approval token")]
    InvalidToken,

    #[error("Alert already {0}")]
    AlreadyResolved(AlertStatus),

    #[error(transparent)]
    Storage(#[from] botsentry_common::Error),
}

impl RemediationError {
    pub fn status_code(&self) -> u16 {
        match self {
            RemediationError::NotFound => 404,
            RemediationError::InvalidToken => 403,
            RemediationError::AlreadyResolved(_) => 409,
            RemediationError::Storage(e) => e.status_code(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RemediationError::NotFound => "NOT_FOUND",
            RemediationError::InvalidToken => "INVALID_TOKEN",
            RemediationError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            RemediationError::Storage(e) => e.code(),
        }
    }
}

/// Constant-time token check; an alert without a token never matches
fn token_matches(given: &str, expected: &str) -> bool {
    !expected.is_empty() && given.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Bulk signup remediation service
pub struct BulkSignupRemediation {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    ip_block_days: i64,
    metrics: SecurityMetrics,
}

impl BulkSignupRemediation {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        ip_block_days: i64,
        metrics: SecurityMetrics,
    ) -> Self {
        Self {
            repos,
            clock,
            ip_block_days,
            metrics,
        }
    }

    async fn load_pending(&self, alert_id: AlertId) -> Result<BulkSignupAlert, RemediationError> {
        let alert = self
            .repos
            .bulk_signups
            .get(alert_id)
            .await?
            .ok_or(RemediationError::NotFound)?;
        Ok(alert)
    }

    fn check_pending(alert: &BulkSignupAlert) -> Result<(), RemediationError> {
        match alert.alert_status() {
            Some(AlertStatus::Pending) => Ok(()),
            Some(status) => Err(RemediationError::AlreadyResolved(status)),
            None => Err(RemediationError::Storage(botsentry_common::Error::Internal(
                format!("Alert {} has unknown status {}", alert.id, alert.status),
            ))),
        }
    }

    /// Suspend every bot in the cluster and block its registration IPs
    pub async fn approve(
        &self,
        alert_id: AlertId,
        auth: ApprovalAuth,
    ) -> Result<ApprovalSummary, RemediationError> {
        let alert = self.load_pending(alert_id).await?;

        if let ApprovalAuth::Token(token) = &auth {
            if !token_matches(token, &alert.approval_token) {
                warn!(alert_id = %alert_id, "Rejected bulk signup approval with invalid token");
                return Err(RemediationError::InvalidToken);
            }
        }
        Self::check_pending(&alert)?;

        let now = self.clock.now();
        let plan = ApprovalPlan {
            resolved_at: now,
            blocked_until: now + Duration::days(self.ip_block_days),
            reason: format!(
                "Bulk signup cluster \"{}\" ({} bots)",
                alert.name_prefix, alert.bot_count
            ),
        };

        let summary = match self.repos.bulk_signups.approve(alert_id, plan).await? {
            ResolveOutcome::Resolved(summary) => summary,
            ResolveOutcome::NotFound => return Err(RemediationError::NotFound),
            ResolveOutcome::AlreadyResolved(status) => {
                return Err(RemediationError::AlreadyResolved(status))
            }
        };

        let actor = auth.actor();
        self.metrics
            .bulk_alerts_resolved
            .with_label_values(&["approved"])
            .inc();
        info!(
            alert_id = %alert_id,
            actor = %actor,
            bots_suspended = summary.bots_suspended,
            handles_deleted = summary.handles_deleted,
            ip_blocks_created = summary.ip_blocks_created,
            ip_blocks_extended = summary.ip_blocks_extended,
            "Bulk signup alert approved"
        );

        let event = NewSecurityEvent::new("bulk_signup_approved")
            .actor(Some(actor))
            .target("bulk_signup_alert", alert_id)
            .metadata(serde_json::json!({
                "namePrefix": alert.name_prefix,
                "botIds": alert.bot_ids,
                "ipList": alert.ip_list,
                "summary": summary,
            }));
        if let Err(e) = self.repos.events.log_event(event).await {
            warn!(alert_id = %alert_id, "Failed to log security event: {}", e);
        }

        Ok(summary)
    }

    /// Close the alert without touching bots or IPs
    pub async fn ignore(&self, alert_id: AlertId, actor: &str) -> Result<(), RemediationError> {
        let alert = self.load_pending(alert_id).await?;
        Self::check_pending(&alert)?;

        match self
            .repos
            .bulk_signups
            .ignore(alert_id, self.clock.now())
            .await?
        {
            ResolveOutcome::Resolved(()) => {}
            ResolveOutcome::NotFound => return Err(RemediationError::NotFound),
            ResolveOutcome::AlreadyResolved(status) => {
                return Err(RemediationError::AlreadyResolved(status))
            }
        }

        self.metrics
            .bulk_alerts_resolved
            .with_label_values(&["ignored"])
            .inc();
        info!(alert_id = %alert_id, actor = %actor, "Bulk signup alert ignored");

        let event = NewSecurityEvent::new("bulk_signup_ignored")
            .actor(Some(actor.to_string()))
            .target("bulk_signup_alert", alert_id)
            .metadata(serde_json::json!({ "namePrefix": alert.name_prefix }));
        if let Err(e) = self.repos.events.log_event(event).await {
            warn!(alert_id = %alert_id, "Failed to log security event: {}", e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches("abc", "abc"));
        assert!(!token_matches("abc", "abd"));
        assert!(!token_matches("abc", "abcd"));
        assert!(!token_matches("", ""));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RemediationError::AlreadyResolved(AlertStatus::Approved).to_string(),
            "Alert already approved"
        );
        assert_eq!(
            RemediationError::AlreadyResolved(AlertStatus::Ignored).to_string(),
            "Alert already ignored"
        );
        assert_eq!(RemediationError::InvalidToken.status_code(), 403);
        assert_eq!(
            RemediationError::AlreadyResolved(AlertStatus::Ignored).status_code(),
            409
        );
    }
}

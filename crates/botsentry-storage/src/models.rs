//! Database models

use botsentry_common::types::{
    AlertId, AlertStatus, BotId, BotStatus, MessageId, SuggestedStatus, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum length of the body preview stored in a report
pub const REPORT_BODY_PREVIEW_CHARS: usize = 500;

/// Maximum number of subject lines stored in a report
pub const REPORT_MAX_SUBJECTS: usize = 100;

/// Bot model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: BotId,
    pub name: String,
    pub sender_name: String,
    pub email: String,
    pub registration_ip: Option<String>,
    pub verified: bool,
    pub status: String,
    pub flag_count: i32,
    pub owner_user_id: Option<UserId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// Parsed status, `None` if the column holds an unknown value
    pub fn bot_status(&self) -> Option<BotStatus> {
        self.status.parse().ok()
    }

    /// Whether a human user has claimed this bot
    pub fn is_claimed(&self) -> bool {
        self.owner_user_id.is_some()
    }
}

/// Per-status bot count
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Bots registered in a window
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize, Deserialize)]
pub struct NewBotCounts {
    pub total: i64,
    pub claimed: i64,
}

/// Message sent or received by a bot
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMessage {
    pub id: MessageId,
    pub bot_id: BotId,
    pub direction: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Classifier verdict attached to exactly one message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailFlag {
    pub id: Uuid,
    pub message_id: MessageId,
    pub bot_id: BotId,
    pub suggested_status: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an email flag
#[derive(Debug, Clone)]
pub struct CreateEmailFlag {
    pub message_id: MessageId,
    pub bot_id: BotId,
    pub suggested_status: SuggestedStatus,
    pub reason: String,
}

/// Message counts and registrations for one reviewed day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub emails_inbound: i64,
    pub emails_outbound: i64,
    pub new_bots: i64,
    pub claimed_bots: i64,
}

/// Denormalized snapshot of a flagged email stored in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedEmailReport {
    pub message_id: MessageId,
    pub bot_id: BotId,
    pub bot_name: String,
    pub bot_address: String,
    pub recipient: String,
    pub subject: String,
    pub body_preview: String,
    pub suggested_status: String,
    pub reason: String,
}

/// Daily security report, keyed by date
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub report_date: NaiveDate,
    pub stats: serde_json::Value,
    pub flagged_emails: serde_json::Value,
    pub subjects: serde_json::Value,
    pub sent_to_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityReport {
    /// Get stats as a typed value
    pub fn daily_stats(&self) -> DailyStats {
        serde_json::from_value(self.stats.clone()).unwrap_or_default()
    }

    /// Get flagged emails as a vector
    pub fn flagged_emails_vec(&self) -> Vec<FlaggedEmailReport> {
        serde_json::from_value(self.flagged_emails.clone()).unwrap_or_default()
    }

    /// Get subject lines as a vector
    pub fn subjects_vec(&self) -> Vec<String> {
        serde_json::from_value(self.subjects.clone()).unwrap_or_default()
    }
}

/// Input for upserting a report
#[derive(Debug, Clone)]
pub struct UpsertSecurityReport {
    pub report_date: NaiveDate,
    pub stats: DailyStats,
    pub flagged_emails: Vec<FlaggedEmailReport>,
    pub subjects: Vec<String>,
}

/// Detected cluster of suspicious registrations
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSignupAlert {
    pub id: AlertId,
    pub signature: String,
    pub status: String,
    pub name_prefix: String,
    pub sender_prefix: String,
    pub bot_ids: Vec<BotId>,
    pub ip_list: Vec<String>,
    pub bot_count: i32,
    pub claimed_count: i32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub approval_token: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BulkSignupAlert {
    /// Parsed status, `None` if the column holds an unknown value
    pub fn alert_status(&self) -> Option<AlertStatus> {
        self.status.parse().ok()
    }

    pub fn is_pending(&self) -> bool {
        self.alert_status() == Some(AlertStatus::Pending)
    }
}

/// Input for creating a bulk signup alert
#[derive(Debug, Clone)]
pub struct CreateBulkSignupAlert {
    pub signature: String,
    pub name_prefix: String,
    pub sender_prefix: String,
    pub bot_ids: Vec<BotId>,
    pub ip_list: Vec<String>,
    pub claimed_count: i32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub approval_token: String,
}

/// Temporary deny-list entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpBlock {
    pub id: Uuid,
    pub ip_address: String,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
    pub alert_id: Option<AlertId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IpBlock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until > now
    }
}

/// Side effects to apply when an alert is approved
#[derive(Debug, Clone)]
pub struct ApprovalPlan {
    pub resolved_at: DateTime<Utc>,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
}

/// What an approval changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSummary {
    pub bots_suspended: u64,
    pub handles_deleted: u64,
    pub ip_blocks_created: u64,
    pub ip_blocks_extended: u64,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Result of resolving (approving or ignoring) an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome<T> {
    Resolved(T),
    NotFound,
    AlreadyResolved(AlertStatus),
}

/// Structured security event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: String,
    pub actor_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a security event
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: String,
    pub actor_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewSecurityEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            actor_id: None,
            target_type: None,
            target_id: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn actor(mut self, actor_id: Option<String>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Admin API key model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminApiKey {
    /// Check if the API key has expired
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            expires_at < Utc::now()
        } else {
            false
        }
    }

    /// Get scopes as a vector
    pub fn scopes_vec(&self) -> Vec<String> {
        serde_json::from_value(self.scopes.clone()).unwrap_or_default()
    }
}

/// Truncate to at most `max` characters, never splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

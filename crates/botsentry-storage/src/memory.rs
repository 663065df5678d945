//! In-memory repositories
//!
//! A single [`MemoryStore`] implements every repository trait so that
//! engine and API tests can run without PostgreSQL. Seeding helpers cover
//! the tables owned by the main application (users, bots, handles, messages).

use crate::models::{
    AdminApiKey, ApprovalPlan, ApprovalSummary, Bot, BotMessage, BulkSignupAlert,
    CreateBulkSignupAlert, CreateEmailFlag, EmailFlag, IpBlock, NewBotCounts, NewSecurityEvent,
    ResolveOutcome, SecurityEvent, SecurityReport, StatusCount, UpsertSecurityReport,
};
use crate::repository::bulk_signups::distinct_ips;
use crate::repository::{
    AdminKeyRepository, BotRepository, BulkSignupRepository, EmailFlagRepository,
    MessageRepository, Repositories, SecurityEventRepository, SecurityReportRepository,
};
use async_trait::async_trait;
use botsentry_common::types::{AlertId, AlertStatus, BotId, BotStatus, MessageDirection, MessageId, UserId};
use botsentry_common::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<UserId, String>,
    bots: Vec<Bot>,
    handles: Vec<(String, BotId)>,
    messages: Vec<BotMessage>,
    flags: Vec<EmailFlag>,
    reports: BTreeMap<NaiveDate, SecurityReport>,
    alerts: Vec<BulkSignupAlert>,
    ip_blocks: Vec<IpBlock>,
    events: Vec<SecurityEvent>,
    api_keys: Vec<AdminApiKey>,
}

/// In-memory store backing all repositories
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_user(&self, id: UserId, email: &str) {
        self.state.lock().await.users.insert(id, email.to_string());
    }

    pub async fn insert_bot(&self, bot: Bot) {
        self.state.lock().await.bots.push(bot);
    }

    pub async fn insert_handle(&self, handle: &str, bot_id: BotId) {
        self.state
            .lock()
            .await
            .handles
            .push((handle.to_string(), bot_id));
    }

    pub async fn insert_message(&self, message: BotMessage) {
        self.state.lock().await.messages.push(message);
    }

    pub async fn insert_api_key(&self, key: AdminApiKey) {
        self.state.lock().await.api_keys.push(key);
    }

    pub async fn insert_ip_block(&self, block: IpBlock) {
        self.state.lock().await.ip_blocks.push(block);
    }

    pub async fn bot(&self, id: BotId) -> Option<Bot> {
        self.state.lock().await.bots.iter().find(|b| b.id == id).cloned()
    }

    pub async fn handles_for(&self, bot_id: BotId) -> Vec<String> {
        self.state
            .lock()
            .await
            .handles
            .iter()
            .filter(|(_, id)| *id == bot_id)
            .map(|(h, _)| h.clone())
            .collect()
    }

    pub async fn flags(&self) -> Vec<EmailFlag> {
        self.state.lock().await.flags.clone()
    }

    pub async fn alerts(&self) -> Vec<BulkSignupAlert> {
        self.state.lock().await.alerts.clone()
    }

    pub async fn ip_blocks(&self) -> Vec<IpBlock> {
        self.state.lock().await.ip_blocks.clone()
    }

    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.state.lock().await.events.clone()
    }
}

impl Repositories {
    /// Build repositories that all share one in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            bots: store.clone(),
            messages: store.clone(),
            flags: store.clone(),
            reports: store.clone(),
            bulk_signups: store.clone(),
            events: store.clone(),
            api_keys: store,
        }
    }
}

fn in_window(ts: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    ts >= start && ts < end
}

fn page<T: Clone>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl BotRepository for MemoryStore {
    async fn get(&self, id: BotId) -> Result<Option<Bot>> {
        Ok(self.bot(id).await)
    }

    async fn find_by_ids(&self, ids: &[BotId]) -> Result<Vec<Bot>> {
        let state = self.state.lock().await;
        let mut bots: Vec<Bot> = state
            .bots
            .iter()
            .filter(|b| ids.contains(&b.id))
            .cloned()
            .collect();
        bots.sort_by_key(|b| b.created_at);
        Ok(bots)
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bot>> {
        let state = self.state.lock().await;
        let mut bots: Vec<Bot> = state
            .bots
            .iter()
            .filter(|b| in_window(b.created_at, start, end))
            .cloned()
            .collect();
        bots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(bots)
    }

    async fn count_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<NewBotCounts> {
        let state = self.state.lock().await;
        let window: Vec<&Bot> = state
            .bots
            .iter()
            .filter(|b| in_window(b.created_at, start, end))
            .collect();
        Ok(NewBotCounts {
            total: window.len() as i64,
            claimed: window.iter().filter(|b| b.is_claimed()).count() as i64,
        })
    }

    async fn list_by_statuses(
        &self,
        statuses: &[BotStatus],
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bot>> {
        let state = self.state.lock().await;
        let mut bots: Vec<Bot> = state
            .bots
            .iter()
            .filter(|b| b.bot_status().is_some_and(|s| statuses.contains(&s)))
            .cloned()
            .collect();
        bots.sort_by(|a, b| {
            b.flag_count
                .cmp(&a.flag_count)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(page(bots, limit, offset))
    }

    async fn count_by_statuses(&self, statuses: &[BotStatus]) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .bots
            .iter()
            .filter(|b| b.bot_status().is_some_and(|s| statuses.contains(&s)))
            .count() as i64)
    }

    async fn count_by_status(&self) -> Result<Vec<StatusCount>> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for bot in &state.bots {
            *counts.entry(bot.status.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    async fn update_status(&self, id: BotId, status: BotStatus, flag_count: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        let bot = state
            .bots
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| Error::NotFound(format!("Bot {} not found", id)))?;
        bot.status = status.as_str().to_string();
        bot.flag_count = flag_count;
        Ok(())
    }

    async fn owner_email(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn list_outbound_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BotMessage>> {
        let state = self.state.lock().await;
        let mut messages: Vec<BotMessage> = state
            .messages
            .iter()
            .filter(|m| m.direction == MessageDirection::Outbound.as_str())
            .filter(|m| in_window(m.created_at, start, end))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn count_between(
        &self,
        direction: MessageDirection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.direction == direction.as_str() && in_window(m.created_at, start, end))
            .count() as i64)
    }
}

#[async_trait]
impl EmailFlagRepository for MemoryStore {
    async fn exists_for_message(&self, message_id: MessageId) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.flags.iter().any(|f| f.message_id == message_id))
    }

    async fn create(&self, input: CreateEmailFlag) -> Result<Option<EmailFlag>> {
        let mut state = self.state.lock().await;
        if state.flags.iter().any(|f| f.message_id == input.message_id) {
            return Ok(None);
        }
        let flag = EmailFlag {
            id: Uuid::now_v7(),
            message_id: input.message_id,
            bot_id: input.bot_id,
            suggested_status: input.suggested_status.as_str().to_string(),
            reason: input.reason,
            created_at: Utc::now(),
        };
        state.flags.push(flag.clone());
        Ok(Some(flag))
    }

    async fn list_for_messages(&self, message_ids: &[MessageId]) -> Result<Vec<EmailFlag>> {
        let state = self.state.lock().await;
        Ok(state
            .flags
            .iter()
            .filter(|f| message_ids.contains(&f.message_id))
            .cloned()
            .collect())
    }

    async fn list_for_bot(&self, bot_id: BotId, limit: i64) -> Result<Vec<EmailFlag>> {
        let state = self.state.lock().await;
        let flags: Vec<EmailFlag> = state
            .flags
            .iter()
            .rev()
            .filter(|f| f.bot_id == bot_id)
            .cloned()
            .collect();
        Ok(page(flags, limit, 0))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state.lock().await.flags.len() as i64)
    }
}

#[async_trait]
impl SecurityReportRepository for MemoryStore {
    async fn upsert(&self, input: UpsertSecurityReport) -> Result<SecurityReport> {
        let stats = serde_json::to_value(input.stats)
            .map_err(|e| Error::Internal(format!("Failed to encode stats: {}", e)))?;
        let flagged = serde_json::to_value(&input.flagged_emails)
            .map_err(|e| Error::Internal(format!("Failed to encode flagged emails: {}", e)))?;
        let subjects = serde_json::to_value(&input.subjects)
            .map_err(|e| Error::Internal(format!("Failed to encode subjects: {}", e)))?;

        let now = Utc::now();
        let mut state = self.state.lock().await;
        let report = state
            .reports
            .entry(input.report_date)
            .and_modify(|r| {
                r.stats = stats.clone();
                r.flagged_emails = flagged.clone();
                r.subjects = subjects.clone();
                r.updated_at = now;
            })
            .or_insert_with(|| SecurityReport {
                report_date: input.report_date,
                stats: stats.clone(),
                flagged_emails: flagged.clone(),
                subjects: subjects.clone(),
                sent_to_admin: false,
                created_at: now,
                updated_at: now,
            });
        Ok(report.clone())
    }

    async fn mark_sent_to_admin(&self, report_date: NaiveDate) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(report) = state.reports.get_mut(&report_date) {
            report.sent_to_admin = true;
            report.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get(&self, report_date: NaiveDate) -> Result<Option<SecurityReport>> {
        Ok(self.state.lock().await.reports.get(&report_date).cloned())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<SecurityReport>> {
        let state = self.state.lock().await;
        let reports: Vec<SecurityReport> = state.reports.values().rev().cloned().collect();
        Ok(page(reports, limit, 0))
    }
}

#[async_trait]
impl BulkSignupRepository for MemoryStore {
    async fn exists_by_signature(&self, signature: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.alerts.iter().any(|a| a.signature == signature))
    }

    async fn create(&self, input: CreateBulkSignupAlert) -> Result<Option<BulkSignupAlert>> {
        let mut state = self.state.lock().await;
        if state.alerts.iter().any(|a| a.signature == input.signature) {
            return Ok(None);
        }
        let alert = BulkSignupAlert {
            id: Uuid::now_v7(),
            signature: input.signature,
            status: AlertStatus::Pending.as_str().to_string(),
            name_prefix: input.name_prefix,
            sender_prefix: input.sender_prefix,
            bot_count: input.bot_ids.len() as i32,
            bot_ids: input.bot_ids,
            ip_list: input.ip_list,
            claimed_count: input.claimed_count,
            window_start: input.window_start,
            window_end: input.window_end,
            approval_token: input.approval_token,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.alerts.push(alert.clone());
        Ok(Some(alert))
    }

    async fn get(&self, id: AlertId) -> Result<Option<BulkSignupAlert>> {
        let state = self.state.lock().await;
        Ok(state.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BulkSignupAlert>> {
        let state = self.state.lock().await;
        let alerts: Vec<BulkSignupAlert> = state
            .alerts
            .iter()
            .rev()
            .filter(|a| status.map_or(true, |s| a.status == s.as_str()))
            .cloned()
            .collect();
        Ok(page(alerts, limit, offset))
    }

    async fn count(&self, status: Option<AlertStatus>) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .alerts
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s.as_str()))
            .count() as i64)
    }

    async fn approve(
        &self,
        id: AlertId,
        plan: ApprovalPlan,
    ) -> Result<ResolveOutcome<ApprovalSummary>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(idx) = state.alerts.iter().position(|a| a.id == id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        let status: AlertStatus = state.alerts[idx].status.parse()?;
        if status != AlertStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(status));
        }

        let bot_ids = state.alerts[idx].bot_ids.clone();
        let ips = distinct_ips(&state.alerts[idx].ip_list);
        let mut summary = ApprovalSummary {
            blocked_until: Some(plan.blocked_until),
            ..Default::default()
        };

        for bot in state.bots.iter_mut().filter(|b| bot_ids.contains(&b.id)) {
            bot.status = BotStatus::Suspended.as_str().to_string();
            bot.verified = false;
            summary.bots_suspended += 1;
        }

        let before = state.handles.len();
        state.handles.retain(|(_, bot_id)| !bot_ids.contains(bot_id));
        summary.handles_deleted = (before - state.handles.len()) as u64;

        for ip in ips {
            let active = state
                .ip_blocks
                .iter_mut()
                .filter(|b| b.ip_address == ip && b.is_active(plan.resolved_at))
                .collect::<Vec<_>>();
            if active.is_empty() {
                state.ip_blocks.push(IpBlock {
                    id: Uuid::now_v7(),
                    ip_address: ip,
                    blocked_until: plan.blocked_until,
                    reason: plan.reason.clone(),
                    alert_id: Some(id),
                    created_at: plan.resolved_at,
                    updated_at: plan.resolved_at,
                });
                summary.ip_blocks_created += 1;
            } else {
                for block in active {
                    block.blocked_until = block.blocked_until.max(plan.blocked_until);
                    block.reason = plan.reason.clone();
                    block.alert_id = Some(id);
                    block.updated_at = plan.resolved_at;
                }
                summary.ip_blocks_extended += 1;
            }
        }

        let alert = &mut state.alerts[idx];
        alert.status = AlertStatus::Approved.as_str().to_string();
        alert.resolved_at = Some(plan.resolved_at);

        Ok(ResolveOutcome::Resolved(summary))
    }

    async fn ignore(&self, id: AlertId, resolved_at: DateTime<Utc>) -> Result<ResolveOutcome<()>> {
        let mut state = self.state.lock().await;
        let Some(alert) = state.alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        let status: AlertStatus = alert.status.parse()?;
        if status != AlertStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(status));
        }
        alert.status = AlertStatus::Ignored.as_str().to_string();
        alert.resolved_at = Some(resolved_at);
        Ok(ResolveOutcome::Resolved(()))
    }

    async fn ip_blocks_for(&self, ips: &[String]) -> Result<Vec<IpBlock>> {
        let state = self.state.lock().await;
        Ok(state
            .ip_blocks
            .iter()
            .filter(|b| ips.contains(&b.ip_address))
            .cloned()
            .collect())
    }

    async fn active_block(&self, ip: &str, now: DateTime<Utc>) -> Result<Option<IpBlock>> {
        let state = self.state.lock().await;
        Ok(state
            .ip_blocks
            .iter()
            .filter(|b| b.ip_address == ip && b.is_active(now))
            .max_by_key(|b| b.blocked_until)
            .cloned())
    }
}

#[async_trait]
impl SecurityEventRepository for MemoryStore {
    async fn log_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent> {
        let event = SecurityEvent {
            id: Uuid::now_v7(),
            event_type: event.event_type,
            actor_id: event.actor_id,
            target_type: event.target_type,
            target_id: event.target_id,
            metadata: event.metadata,
            created_at: Utc::now(),
        };
        self.state.lock().await.events.push(event.clone());
        Ok(event)
    }

    async fn list_recent(&self, event_type: Option<&str>, limit: i64) -> Result<Vec<SecurityEvent>> {
        let state = self.state.lock().await;
        let events: Vec<SecurityEvent> = state
            .events
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect();
        Ok(page(events, limit, 0))
    }
}

#[async_trait]
impl AdminKeyRepository for MemoryStore {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<AdminApiKey>> {
        let state = self.state.lock().await;
        Ok(state
            .api_keys
            .iter()
            .filter(|k| k.key_prefix == prefix && !k.is_expired())
            .cloned()
            .collect())
    }

    async fn update_last_used(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(key) = state.api_keys.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}
